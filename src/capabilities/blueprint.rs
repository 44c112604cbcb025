//! Blueprint files for later automation runs.

use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use crate::actions;
use crate::capability::{Capability, CapabilityError, CapabilityResult};
use crate::models::{Context, ExecutionResult, PlanStep, text_param};

#[derive(Debug, Clone)]
pub struct BlueprintCapability {
    output_dir: PathBuf,
}

impl BlueprintCapability {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

impl Capability for BlueprintCapability {
    fn name(&self) -> &str {
        actions::WRITE_BLUEPRINT
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let name = text_param(&step.parameters, "name").unwrap_or(&step.id);
        if name.contains('/') || name == "." || name == ".." {
            return Err(CapabilityError::invalid("name", "must be a plain file name"));
        }
        let serialized = match step.parameters.get("contents") {
            None | Some(Value::Null) => {
                return Ok(ExecutionResult::error(&step.id, "No blueprint contents supplied"));
            }
            Some(Value::String(s)) => s.clone(),
            Some(value @ (Value::Object(_) | Value::Array(_))) => serde_json::to_string_pretty(value)
                .map_err(|e| CapabilityError::invalid("contents", e.to_string()))?,
            Some(other) => other.to_string(),
        };

        fs::create_dir_all(&self.output_dir)?;
        let target = self.output_dir.join(format!("{}.yaml", name));
        fs::write(&target, serialized)?;
        tracing::info!(path = %target.display(), "blueprint written");
        Ok(ExecutionResult::success(&step.id, target.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Parameters;
    use crate::types::ExecutionStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn step(params: Value) -> PlanStep {
        PlanStep::new("write_bp", actions::WRITE_BLUEPRINT, "")
            .with_parameters(params.as_object().cloned().unwrap_or_else(Parameters::new))
    }

    #[test]
    fn test_structured_contents_written_as_json() {
        let dir = TempDir::new().unwrap();
        let cap = BlueprintCapability::new(dir.path().join("nested"));
        let result = cap
            .execute(&step(json!({"name": "nightly", "contents": {"hosts": "all"}})), &Context::new())
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        let path = dir.path().join("nested").join("nightly.yaml");
        assert_eq!(result.output.as_deref(), Some(path.display().to_string().as_str()));
        let written: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["hosts"], "all");
    }

    #[test]
    fn test_name_defaults_to_step_id() {
        let dir = TempDir::new().unwrap();
        let cap = BlueprintCapability::new(dir.path().to_path_buf());
        cap.execute(&step(json!({"contents": "- hosts: all"})), &Context::new())
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("write_bp.yaml")).unwrap(),
            "- hosts: all"
        );
    }

    #[test]
    fn test_missing_contents() {
        let dir = TempDir::new().unwrap();
        let result = BlueprintCapability::new(dir.path().to_path_buf())
            .execute(&step(json!({"name": "x"})), &Context::new())
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("No blueprint contents supplied"));
    }
}
