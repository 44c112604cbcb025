//! Safety review of plans before execution
//!
//! The baseline policy is a deny-list of actions. When a model client is
//! configured its verdict is merged on top: a step blocked by either side
//! stays blocked.

use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;

use crate::actions;
use crate::model::{self, ChatClient, ModelError};
use crate::models::{ActionPlan, Context, SafetyReport};

const SAFETY_SYSTEM_PROMPT: &str = "You are the safety reviewer for the Ainux automation engine.\n\
Given a plan of actions decide which steps are allowed to execute under standard security policy. \
Return JSON with approved and blocked steps.\n\n\
Respond as JSON: {\"blocked_steps\": [step ids], \"warnings\": [string], \"rationale\": string}";

const BASELINE_RATIONALE: &str = "Baseline policy";

/// Model verdict reduced to the fields the merge needs
#[derive(Debug, Default)]
struct ModelVerdict {
    blocked_ids: HashSet<String>,
    warnings: Vec<String>,
    rationale: Option<String>,
}

#[derive(Clone)]
pub struct SafetyChecker {
    client: Option<Arc<dyn ChatClient>>,
    disallowed_actions: HashSet<String>,
}

impl Default for SafetyChecker {
    fn default() -> Self {
        Self::new(None, actions::DEFAULT_DISALLOWED.iter().map(|a| a.to_string()))
    }
}

impl SafetyChecker {
    pub fn new(
        client: Option<Arc<dyn ChatClient>>,
        disallowed_actions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            client,
            disallowed_actions: disallowed_actions.into_iter().collect(),
        }
    }

    pub fn is_disallowed(&self, action: &str) -> bool {
        self.disallowed_actions.contains(action)
    }

    /// Partition `plan` into approved and blocked steps, in plan order.
    pub fn review(&self, plan: &ActionPlan, context: &Context) -> SafetyReport {
        let baseline = self.baseline(plan);
        let verdict = model::with_model_fallback(
            self.client.as_deref(),
            "safety.review",
            |client| verdict_from_model(client, plan, context).map(Some),
            || None,
        );
        match verdict {
            Some(verdict) => merge(plan, baseline, verdict),
            None => baseline,
        }
    }

    /// Deny-list check alone
    pub fn baseline(&self, plan: &ActionPlan) -> SafetyReport {
        let mut report = SafetyReport {
            rationale: Some(BASELINE_RATIONALE.to_string()),
            ..SafetyReport::default()
        };
        for step in &plan.steps {
            if self.is_disallowed(&step.action) {
                report
                    .warnings
                    .push(format!("Step {} uses disallowed action {}.", step.id, step.action));
                report.blocked_steps.push(step.clone());
            } else {
                report.approved_steps.push(step.clone());
            }
        }
        report
    }
}

fn verdict_from_model(
    client: &dyn ChatClient,
    plan: &ActionPlan,
    context: &Context,
) -> Result<ModelVerdict, ModelError> {
    let payload = json!({
        "plan": plan.steps,
        "notes": plan.notes,
        "context": context,
    });
    let reply =
        model::request_json_object(client, SAFETY_SYSTEM_PROMPT, &payload, model::SAFETY_SEED)?;

    let blocked_ids = match reply.get("blocked_steps") {
        None | Some(Value::Null) => HashSet::new(),
        Some(Value::Array(items)) => items.iter().filter_map(step_ref).collect(),
        Some(_) => return Err(ModelError::invalid_payload("blocked_steps must be a list")),
    };
    let warnings = match reply.get("warnings") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    let rationale = reply
        .get("rationale")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    Ok(ModelVerdict {
        blocked_ids,
        warnings,
        rationale,
    })
}

/// Blocked entries may be bare ids or step objects
fn step_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(obj) => obj.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn merge(plan: &ActionPlan, baseline: SafetyReport, verdict: ModelVerdict) -> SafetyReport {
    let baseline_blocked: HashSet<&str> = baseline.blocked_ids().into_iter().collect();
    let mut report = SafetyReport::default();
    for step in &plan.steps {
        if baseline_blocked.contains(step.id.as_str()) || verdict.blocked_ids.contains(&step.id) {
            report.blocked_steps.push(step.clone());
        } else {
            report.approved_steps.push(step.clone());
        }
    }

    for warning in baseline.warnings.into_iter().chain(verdict.warnings) {
        if !report.warnings.contains(&warning) {
            report.warnings.push(warning);
        }
    }
    report.rationale = verdict.rationale.or(baseline.rationale);
    report
}
