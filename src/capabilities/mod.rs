//! Concrete capabilities and the default registry
//!
//! Every capability that starts a program goes through
//! [`crate::command_runner`], so commands share one timeout policy and one
//! failure vocabulary: a missing program is `Command 'x' not found`, an
//! expired timeout is `timed out after Ns`, a non-zero exit carries stderr.
//! Those texts are what the planner's repair table matches on.

pub mod blueprint;
pub mod desktop;
pub mod dry_run;
pub mod low_level;
pub mod process;
pub mod python;
pub mod resources;
pub mod shell;

use serde_json::Value;
use std::time::Duration;

use crate::actions;
use crate::capability::CapabilityRegistry;
use crate::command_args::CommandArgs;
use crate::command_runner::{self, CommandOutput};
use crate::config_file::OrchestratorConfig;
use crate::models::ExecutionResult;

pub use blueprint::BlueprintCapability;
pub use desktop::{ApplicationLauncher, PointerControl};
pub use dry_run::DryRunCapability;
pub use low_level::LowLevelExecution;
pub use process::{ProcessEvaluation, ProcessListing, ProcessManagement};
pub use python::PythonPackageCapability;
pub use resources::{HotspotAnalysis, ResourceMetrics, ResourceTuning};
pub use shell::ShellCommandCapability;

/// Actions that only record what would have happened
pub const DRY_RUN_ACTIONS: &[&str] = &[
    actions::COLLECT_USER_CONTEXT,
    actions::PRESENT_WALKTHROUGH,
    actions::QUEUE_ACTIONS,
    actions::COLLECT_TASK_REQUIREMENTS,
    actions::CREATE_TASK_SCHEDULE,
    actions::PUBLISH_USER_GUIDANCE,
    actions::REVIEW_REQUEST,
    actions::INSPECT_LOW_LEVEL_TARGET,
];

/// Registry with every capability shipped in this crate
pub fn default_registry(config: &OrchestratorConfig) -> CapabilityRegistry {
    let timeout = Duration::from_secs(config.command_timeout_secs.max(1));
    let mut registry = CapabilityRegistry::new();

    for action in DRY_RUN_ACTIONS {
        registry.register(DryRunCapability::new(*action));
    }
    registry.register(ResourceMetrics);
    registry.register(HotspotAnalysis::default());
    registry.register(ResourceTuning::new(timeout));
    registry.register(ProcessListing);
    registry.register(ProcessEvaluation);
    registry.register(ProcessManagement);
    registry.register(ApplicationLauncher);
    registry.register(PointerControl::new(timeout));
    registry.register(LowLevelExecution::new(timeout));
    registry.register(PythonPackageCapability::new(timeout));
    registry.register(ShellCommandCapability::new(
        config.shell_allowed_prefixes.clone(),
        timeout,
    ));
    registry.register(BlueprintCapability::new(config.blueprint_dir()));
    registry
}

/// Run `args` and translate the outcome into a step result.
pub(crate) fn run_for_step<T: CommandArgs + ?Sized>(
    step_id: &str,
    args: &T,
    timeout: Duration,
) -> ExecutionResult {
    match command_runner::run_command_safe(args, timeout) {
        Ok(output) => command_result(step_id, &output, timeout),
        Err(err) if command_runner::is_not_found(&err) => {
            ExecutionResult::error(step_id, format!("Command '{}' not found", args.program()))
        }
        Err(err) => ExecutionResult::error(step_id, format!("{:#}", err)),
    }
}

/// Success on exit 0; otherwise `error` with stderr (stdout kept as output)
pub(crate) fn command_result(step_id: &str, output: &CommandOutput, timeout: Duration) -> ExecutionResult {
    let stdout = output.stdout.trim();
    let stderr = output.stderr.trim();

    let mut result = if output.success {
        ExecutionResult::new(step_id, crate::types::ExecutionStatus::Success)
    } else if output.timed_out {
        ExecutionResult::error(step_id, format!("timed out after {}s", timeout.as_secs()))
    } else {
        ExecutionResult::error(step_id, output.failure_text())
    };
    if !stdout.is_empty() {
        result.output = Some(stdout.to_string());
    }
    if output.success && !stderr.is_empty() {
        result.error = Some(stderr.to_string());
    }
    result
}

pub(crate) fn json_text(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionStatus;

    #[test]
    fn test_default_registry_covers_plan_actions() {
        let registry = default_registry(&OrchestratorConfig::default());
        for action in [
            actions::COLLECT_RESOURCE_METRICS,
            actions::ANALYZE_RESOURCE_HOTSPOTS,
            actions::APPLY_RESOURCE_TUNING,
            actions::ENUMERATE_PROCESSES,
            actions::EVALUATE_PROCESS_ACTIONS,
            actions::APPLY_PROCESS_MANAGEMENT,
            actions::LAUNCH_APPLICATION,
            actions::CONTROL_POINTER,
            actions::EXECUTE_LOW_LEVEL,
            actions::ENSURE_PYTHON_PACKAGE,
            actions::RUN_COMMAND,
            actions::WRITE_BLUEPRINT,
            actions::REVIEW_REQUEST,
        ] {
            assert!(registry.contains(action), "missing {}", action);
        }
        assert!(!registry.contains("system.shutdown"));
    }

    #[test]
    fn test_command_result_mapping() {
        let timeout = Duration::from_secs(7);
        let ok = CommandOutput {
            stdout: "done\n".into(),
            success: true,
            exit_code: Some(0),
            ..CommandOutput::default()
        };
        let result = command_result("s", &ok, timeout);
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output.as_deref(), Some("done"));
        assert!(result.error.is_none());

        let slow = CommandOutput {
            timed_out: true,
            ..CommandOutput::default()
        };
        assert_eq!(
            command_result("s", &slow, timeout).error.as_deref(),
            Some("timed out after 7s")
        );

        let failed = CommandOutput {
            stderr: "E: boom\n".into(),
            exit_code: Some(100),
            ..CommandOutput::default()
        };
        let result = command_result("s", &failed, timeout);
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("E: boom"));
    }
}
