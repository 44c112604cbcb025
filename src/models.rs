//! Data model for one orchestration call
//!
//! Every entity here is created inside a single `orchestrate` call and
//! returned to the caller as part of [`OrchestrationResult`]. All of them
//! serialize to JSON with the field names used on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{OrchestratorError, Result};
use crate::types::ExecutionStatus;

/// String-keyed parameter map carried by intents and steps
pub type Parameters = serde_json::Map<String, Value>;

/// Ambient context threaded through every component call
pub type Context = serde_json::Map<String, Value>;

/// Returns a trimmed, non-empty string parameter
pub fn text_param<'a>(params: &'a Parameters, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Returns an integer parameter, accepting numeric strings
pub fn int_param(params: &Parameters, key: &str) -> Option<i64> {
    match params.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Normalized interpretation of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub raw_input: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Parameters,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub context_snapshot: Option<Context>,
}

impl Intent {
    /// Build an intent; confidence is clamped into [0, 1]
    pub fn new(
        raw_input: impl Into<String>,
        action: impl Into<String>,
        parameters: Parameters,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            raw_input: raw_input.into(),
            action: action.into(),
            parameters,
            confidence,
            reasoning: None,
            context_snapshot: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// One named action inside a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PlanStep {
    pub fn new(
        id: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            description: description.into(),
            parameters: Parameters::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn after(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }
}

/// Ordered, dependency-annotated plan
///
/// `revision` identifies the plan value: planner reviews that replace the
/// plan hand back a value with a higher revision, so the orchestrator can
/// tell a replacement from the plan it already holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub intent: Intent,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub revision: u32,
}

impl ActionPlan {
    pub fn new(intent: Intent, steps: Vec<PlanStep>, notes: Option<String>) -> Self {
        Self {
            intent,
            steps,
            notes,
            revision: 0,
        }
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// First step id that occurs more than once
    pub fn duplicate_id(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .find(|step| !seen.insert(step.id.as_str()))
            .map(|step| step.id.as_str())
    }

    /// Reject plans whose step ids collide
    pub fn ensure_unique_ids(&self) -> Result<()> {
        match self.duplicate_id() {
            Some(id) => Err(OrchestratorError::duplicate_step(id)),
            None => Ok(()),
        }
    }

    /// Copy of this plan marked as a replacement
    pub fn next_revision(&self) -> Self {
        let mut next = self.clone();
        next.revision = self.revision + 1;
        next
    }
}

/// Safety classification of a plan's steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub approved_steps: Vec<PlanStep>,
    pub blocked_steps: Vec<PlanStep>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl SafetyReport {
    pub fn is_approved(&self, step_id: &str) -> bool {
        self.approved_steps.iter().any(|step| step.id == step_id)
    }

    pub fn approved_ids(&self) -> Vec<&str> {
        self.approved_steps.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn blocked_ids(&self) -> Vec<&str> {
        self.blocked_steps.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Result of one step attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn new(step_id: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            output: None,
            error: None,
        }
    }

    pub fn success(step_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::new(step_id, ExecutionStatus::Success).with_output(output)
    }

    pub fn dry_run(step_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::new(step_id, ExecutionStatus::DryRun).with_output(output)
    }

    pub fn error(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(step_id, ExecutionStatus::Error).with_error(error)
    }

    pub fn blocked(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(step_id, ExecutionStatus::Blocked).with_error(error)
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

/// Planner decision taken after a step attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReview {
    pub plan: ActionPlan,
    pub next_steps: Vec<PlanStep>,
    pub complete: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Full audit trail of one orchestration call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub intent: Intent,
    pub plan: ActionPlan,
    pub safety: SafetyReport,
    pub execution: Vec<ExecutionResult>,
    pub reviews: Vec<PlanReview>,
}
