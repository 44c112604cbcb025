//! Allow-listed command execution.

use serde_json::Value;
use std::time::Duration;

use crate::actions;
use crate::capability::{Capability, CapabilityError, CapabilityResult};
use crate::commands::ProgramArgs;
use crate::models::{Context, ExecutionResult, PlanStep};

/// Runs `command` when its executable starts with an allowed prefix
#[derive(Debug, Clone)]
pub struct ShellCommandCapability {
    allowed_prefixes: Vec<String>,
    timeout: Duration,
}

impl ShellCommandCapability {
    pub fn new(allowed_prefixes: Vec<String>, timeout: Duration) -> Self {
        Self {
            allowed_prefixes,
            timeout,
        }
    }

    pub fn is_allowed(&self, executable: &str) -> bool {
        self.allowed_prefixes
            .iter()
            .any(|prefix| executable.starts_with(prefix.as_str()))
    }
}

/// `command` as an argv: lists are taken as-is, strings split on whitespace
pub fn command_argv(value: Option<&Value>) -> Result<Vec<String>, CapabilityError> {
    match value {
        None | Some(Value::Null) => Err(CapabilityError::missing("command")),
        Some(Value::String(s)) if s.trim().is_empty() => Err(CapabilityError::missing("command")),
        Some(Value::String(s)) => Ok(s.split_whitespace().map(str::to_string).collect()),
        Some(Value::Array(items)) if items.is_empty() => Err(CapabilityError::missing("command")),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()),
        Some(_) => Err(CapabilityError::invalid("command", "Command must be string or list")),
    }
}

impl Capability for ShellCommandCapability {
    fn name(&self) -> &str {
        actions::RUN_COMMAND
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let argv = command_argv(step.parameters.get("command"))?;
        let Some(args) = ProgramArgs::from_argv(&argv).filter(|a| !a.program.trim().is_empty())
        else {
            return Ok(ExecutionResult::error(&step.id, "Command is empty"));
        };

        if !self.is_allowed(&args.program) {
            tracing::warn!(step = %step.id, executable = %args.program, "executable not in allow list");
            return Ok(ExecutionResult::blocked(
                &step.id,
                format!("Executable '{}' not in allow list", args.program),
            ));
        }
        Ok(super::run_for_step(&step.id, &args, self.timeout))
    }
}
