//! Record-only capability.

use serde_json::json;

use crate::capability::{Capability, CapabilityResult};
use crate::models::{Context, ExecutionResult, PlanStep};

/// Records the intended action without side effects
#[derive(Debug, Clone)]
pub struct DryRunCapability {
    action: String,
}

impl DryRunCapability {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }
}

impl Capability for DryRunCapability {
    fn name(&self) -> &str {
        &self.action
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let description = if step.description.trim().is_empty() {
            format!("Execute {}", step.action)
        } else {
            step.description.clone()
        };
        let payload = json!({
            "description": description,
            "parameters": step.parameters,
        });
        Ok(ExecutionResult::dry_run(&step.id, super::json_text(&payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionStatus;
    use serde_json::Value;

    #[test]
    fn test_records_description_and_parameters() {
        let mut params = crate::models::Parameters::new();
        params.insert("focus".into(), json!("pointer"));
        let step = PlanStep::new("capture", "ui.collect_user_context", "").with_parameters(params);

        let result = DryRunCapability::new("ui.collect_user_context")
            .execute(&step, &Context::new())
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::DryRun);
        let payload: Value = serde_json::from_str(result.output.as_deref().unwrap()).unwrap();
        assert_eq!(payload["description"], "Execute ui.collect_user_context");
        assert_eq!(payload["parameters"]["focus"], "pointer");
    }
}
