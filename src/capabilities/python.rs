//! Python package remediation.

use std::time::Duration;

use crate::actions;
use crate::capability::{Capability, CapabilityError, CapabilityResult};
use crate::command_runner;
use crate::commands::python::{ImportCheckArgs, PipInstallArgs};
use crate::models::{Context, ExecutionResult, PlanStep, text_param};

/// Try the import, install with pip only when it fails
#[derive(Debug, Clone, Copy)]
pub struct PythonPackageCapability {
    timeout: Duration,
}

impl PythonPackageCapability {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Capability for PythonPackageCapability {
    fn name(&self) -> &str {
        actions::ENSURE_PYTHON_PACKAGE
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let package = text_param(&step.parameters, "package")
            .ok_or_else(|| CapabilityError::missing("package"))?;
        let module = text_param(&step.parameters, "module").unwrap_or(package);

        let check = ImportCheckArgs {
            module: module.to_string(),
        };
        match command_runner::run_command_safe(&check, self.timeout) {
            Ok(output) if output.success => {
                return Ok(ExecutionResult::success(
                    &step.id,
                    format!("Python module '{}' already available", module),
                ));
            }
            Ok(_) => {}
            Err(err) if command_runner::is_not_found(&err) => {
                return Ok(ExecutionResult::error(
                    &step.id,
                    format!("Command '{}' not found", crate::commands::python::PYTHON),
                ));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(package, module, "installing python package");
        let install = PipInstallArgs {
            package: package.to_string(),
            user: step
                .parameters
                .get("user")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
        };
        let mut result = super::run_for_step(&step.id, &install, self.timeout);
        if !result.is_failure() {
            result.output = Some(format!("Installed Python package '{}'", package));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_is_required() {
        let step = PlanStep::new("ensure", actions::ENSURE_PYTHON_PACKAGE, "");
        let err = PythonPackageCapability::new(Duration::from_secs(5))
            .execute(&step, &Context::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing package");
    }
}
