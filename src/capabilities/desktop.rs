//! Desktop capabilities: application launch and pointer control.

use serde_json::Value;
use std::time::Duration;

use crate::actions;
use crate::capability::{Capability, CapabilityError, CapabilityResult};
use crate::command_runner;
use crate::commands::ProgramArgs;
use crate::commands::desktop::XdotoolArgs;
use crate::models::{Context, ExecutionResult, Parameters, PlanStep, int_param, text_param};
use crate::planner::low_level;
use crate::types::PointerOperation;

/// Launches the requested application detached from the orchestrator
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationLauncher;

/// Requested argv from `command` (list or string) or `target`, plus `args`
pub fn requested_argv(params: &Parameters) -> Vec<String> {
    let mut argv = match params.get("command") {
        Some(command @ Value::Array(_)) => low_level::arg_list(Some(command)),
        Some(Value::String(s)) if !s.trim().is_empty() => {
            s.split_whitespace().map(str::to_string).collect()
        }
        _ => text_param(params, "target")
            .map(|t| t.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    };
    argv.extend(low_level::arg_list(params.get("args")));
    argv
}

/// `PATH` lookup first, then the well-known application table
pub fn resolve_application(name: &str) -> Option<String> {
    low_level::resolve_executable(&[name]).or_else(|| {
        low_level::infer_target(name)
            .and_then(|target| low_level::resolve_executable(&[target.executable.as_str()]))
    })
}

impl Capability for ApplicationLauncher {
    fn name(&self) -> &str {
        actions::LAUNCH_APPLICATION
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let argv = requested_argv(&step.parameters);
        let Some((requested, rest)) = argv.split_first() else {
            return Err(CapabilityError::missing("target"));
        };
        let Some(executable) = resolve_application(requested) else {
            return Ok(ExecutionResult::error(
                &step.id,
                format!("Command '{}' not found", requested),
            ));
        };

        let args = ProgramArgs::new(executable.clone(), rest.iter().cloned());
        let pid = command_runner::spawn_detached(&args)?;
        Ok(ExecutionResult::success(
            &step.id,
            format!("Launched {} (pid {})", executable, pid),
        ))
    }
}

/// Relative moves, clicks and location queries through `xdotool`
#[derive(Debug, Clone, Copy)]
pub struct PointerControl {
    timeout: Duration,
}

impl PointerControl {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Commands for the step, in execution order
    pub fn commands(params: &Parameters) -> Result<Vec<XdotoolArgs>, CapabilityError> {
        let operation = parse_operation(params, "operation")?.unwrap_or_default();
        match operation {
            PointerOperation::Locate => Ok(vec![XdotoolArgs::Locate]),
            PointerOperation::Move => {
                let dx = int_param(params, "dx").unwrap_or(0);
                let dy = int_param(params, "dy").unwrap_or(0);
                if dx == 0 && dy == 0 {
                    return Err(CapabilityError::missing("pointer offset (dx/dy)"));
                }
                let mut commands = vec![XdotoolArgs::MoveRelative { dx, dy }];
                let click_after = params
                    .get("click_after")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if click_after {
                    let click = parse_operation(params, "click_operation")?
                        .unwrap_or(PointerOperation::Click);
                    commands.extend(XdotoolArgs::for_click(click));
                }
                Ok(commands)
            }
            click => Ok(XdotoolArgs::for_click(click).into_iter().collect()),
        }
    }
}

fn parse_operation(params: &Parameters, key: &str) -> Result<Option<PointerOperation>, CapabilityError> {
    text_param(params, key)
        .map(|op| {
            op.parse::<PointerOperation>()
                .map_err(|_| CapabilityError::invalid(key, format!("unknown pointer operation '{}'", op)))
        })
        .transpose()
}

impl Capability for PointerControl {
    fn name(&self) -> &str {
        actions::CONTROL_POINTER
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let mut outputs = Vec::new();
        for command in Self::commands(&step.parameters)? {
            let result = super::run_for_step(&step.id, &command, self.timeout);
            if result.is_failure() {
                return Ok(result);
            }
            outputs.extend(result.output);
        }
        let mut result = ExecutionResult::new(&step.id, crate::types::ExecutionStatus::Success);
        if !outputs.is_empty() {
            result.output = Some(outputs.join("\n"));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_argv_from_command_or_target() {
        assert_eq!(requested_argv(&params(json!({"command": "firefox --new-window"}))), ["firefox", "--new-window"]);
        assert_eq!(requested_argv(&params(json!({"target": "gedit", "args": ["a.txt"]}))), ["gedit", "a.txt"]);
        assert!(requested_argv(&params(json!({"verb": "open"}))).is_empty());
    }

    #[test]
    fn test_launcher_requires_target() {
        let step = PlanStep::new("launch_application", actions::LAUNCH_APPLICATION, "");
        let err = ApplicationLauncher.execute(&step, &Context::new()).unwrap_err();
        assert_eq!(err.to_string(), "Missing target");
    }

    #[test]
    fn test_unknown_application_is_not_found() {
        let step = PlanStep::new("launch_application", actions::LAUNCH_APPLICATION, "")
            .with_parameters(params(json!({"target": "ainux-missing-app"})));
        let result = ApplicationLauncher.execute(&step, &Context::new()).unwrap();
        assert!(result.is_failure());
        assert!(result.error.unwrap().contains("not found"));
    }

    #[test]
    fn test_move_then_click() {
        let commands = PointerControl::commands(&params(json!({
            "operation": "move", "dx": -25, "dy": 0,
            "click_after": true, "click_operation": "double_click"
        })))
        .unwrap();
        assert_eq!(
            commands,
            [
                XdotoolArgs::MoveRelative { dx: -25, dy: 0 },
                XdotoolArgs::Click { button: 1, repeat: 2 },
            ]
        );
    }

    #[test]
    fn test_plain_click_and_locate() {
        assert_eq!(
            PointerControl::commands(&params(json!({"operation": "right_click"}))).unwrap(),
            [XdotoolArgs::Click { button: 3, repeat: 1 }]
        );
        assert_eq!(
            PointerControl::commands(&params(json!({"operation": "locate"}))).unwrap(),
            [XdotoolArgs::Locate]
        );
    }

    #[test]
    fn test_move_without_offset_is_rejected() {
        assert!(PointerControl::commands(&params(json!({"operation": "move"}))).is_err());
        assert!(PointerControl::commands(&params(json!({"operation": "wiggle"}))).is_err());
    }
}
