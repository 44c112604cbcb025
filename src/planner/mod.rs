//! Planning and replanning
//!
//! [`Planner::create_plan`] turns an intent into an ordered plan, and
//! [`Planner::review_execution`] looks at the execution history after each
//! step to decide what runs next. Both consult the model client when one is
//! configured and fall back to the heuristic templates and repair tables
//! otherwise.
//!
//! Reviews never mutate the plan they are given. A review that changes the
//! plan returns a new value with a higher `revision`; the orchestrator uses
//! that to decide whether safety has to run again.

pub mod low_level;
pub mod repair;
pub mod templates;

use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Arc;

use crate::actions;
use crate::model::{self, ChatClient, ModelError};
use crate::models::{ActionPlan, Context, ExecutionResult, Intent, PlanReview, PlanStep};

pub use repair::{DEFAULT_MAX_ATTEMPTS, FailureSignature};
pub use templates::heuristic_plan;

const PLANNER_SYSTEM_PROMPT: &str = "You are the orchestration planner for the Ainux operating system.\n\
Given a normalized intent you must create a deterministic plan of actions \
the automation engine can execute.\n\n\
Respond as JSON with the following structure:\n\
{\n\
  \"steps\": [\n\
    {\n\
      \"id\": string,\n\
      \"action\": string,\n\
      \"description\": string,\n\
      \"parameters\": object,\n\
      \"depends_on\": [string]\n\
    }\n\
  ],\n\
  \"notes\": string\n\
}\n\n\
Step ids must be unique. Choose deterministic actions that map to Ainux capabilities \
such as `system.collect_resource_metrics`, `process.apply_management`, \
`ui.present_walkthrough`, `system.run_command`, or `automation.write_blueprint`.";

const REVIEW_SYSTEM_PROMPT: &str = "You are the orchestration planner for the Ainux operating system.\n\
You receive execution feedback after each step.\n\
Update the plan and decide the next deterministic actions.\n\n\
Respond as JSON with optional updated plan ({\"steps\": [...], \"notes\": string}), \
remaining next_steps, a boolean complete flag, and an operator-facing message.";

/// Transform intents into ordered execution plans.
#[derive(Clone)]
pub struct Planner {
    client: Option<Arc<dyn ChatClient>>,
    max_attempts: u32,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Planner {
    pub fn new(client: Option<Arc<dyn ChatClient>>) -> Self {
        Self {
            client,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Failures of one step id before it is skipped (minimum 1)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn create_plan(&self, intent: &Intent, context: &Context) -> ActionPlan {
        model::with_model_fallback(
            self.client.as_deref(),
            "planner.create_plan",
            |client| plan_with_model(client, intent, context),
            || heuristic_plan(intent),
        )
    }

    pub fn review_execution(
        &self,
        intent: &Intent,
        plan: &ActionPlan,
        history: &[ExecutionResult],
        context: &Context,
    ) -> PlanReview {
        let review = model::with_model_fallback(
            self.client.as_deref(),
            "planner.review_execution",
            |client| review_with_model(client, intent, plan, history, context),
            || self.heuristic_review(plan, history),
        );
        enforce_retry_limit(review, history, self.max_attempts)
    }

    /// Completion tracking plus dependency repair for the latest failure
    pub fn heuristic_review(&self, plan: &ActionPlan, history: &[ExecutionResult]) -> PlanReview {
        let mut message = history
            .last()
            .and_then(|last| last.output.clone().or_else(|| last.error.clone()));
        let mut updated = plan.clone();

        if let Some(last) = history.last().filter(|r| r.is_failure()) {
            let failures = repair::failure_counts(history)
                .get(last.step_id.as_str())
                .copied()
                .unwrap_or(0);
            let signature = repair::detect_in_result(last)
                .filter(|sig| failures < self.max_attempts && !repair::has_remediation(plan, sig));
            if let Some(signature) = signature {
                let step = repair::remediation_step(plan, &signature, &last.step_id);
                let step_id = step.id.clone();
                if let Some(repaired) = repair::insert_remediation(plan, &last.step_id, step) {
                    tracing::info!(
                        remediation = %step_id,
                        failing = %last.step_id,
                        "inserted remediation step"
                    );
                    message = Some(format!(
                        "Inserted remediation step '{}' before '{}'",
                        step_id, last.step_id
                    ));
                    updated = repaired;
                }
            }
        }

        let completed = completed_ids(history);
        let next_steps: Vec<PlanStep> = updated
            .steps
            .iter()
            .filter(|step| !completed.contains(step.id.as_str()))
            .cloned()
            .collect();
        PlanReview {
            complete: next_steps.is_empty(),
            plan: updated,
            next_steps,
            message,
        }
    }
}

/// Ids with at least one attempt that was not `error`/`blocked`
pub fn completed_ids(history: &[ExecutionResult]) -> HashSet<&str> {
    history
        .iter()
        .filter(|r| !r.is_failure())
        .map(|r| r.step_id.as_str())
        .collect()
}

/// Skip steps that failed `max_attempts` times and end the run.
pub fn enforce_retry_limit(
    mut review: PlanReview,
    history: &[ExecutionResult],
    max_attempts: u32,
) -> PlanReview {
    let completed = completed_ids(history);
    let counts = repair::failure_counts(history);
    let exhausted: Vec<(String, u32)> = review
        .plan
        .steps
        .iter()
        .filter(|step| !completed.contains(step.id.as_str()))
        .filter_map(|step| {
            let count = counts.get(step.id.as_str()).copied().unwrap_or(0);
            (count >= max_attempts).then(|| (step.id.clone(), count))
        })
        .collect();
    if exhausted.is_empty() {
        return review;
    }

    review
        .next_steps
        .retain(|step| !exhausted.iter().any(|(id, _)| *id == step.id));
    review.complete = true;

    let mut notes: Vec<String> = review.message.take().into_iter().collect();
    for (id, count) in &exhausted {
        tracing::warn!(step = %id, attempts = count, "retry limit reached, skipping step");
        notes.push(format!(
            "step '{}' failed {} times; skipping after {} attempts",
            id, count, max_attempts
        ));
    }
    review.message = Some(notes.join("; "));
    review
}

fn intent_payload(intent: &Intent) -> Value {
    json!({
        "action": intent.action,
        "parameters": intent.parameters,
        "confidence": intent.confidence,
    })
}

fn plan_with_model(
    client: &dyn ChatClient,
    intent: &Intent,
    context: &Context,
) -> Result<ActionPlan, ModelError> {
    let payload = json!({"intent": intent_payload(intent), "context": context});
    let reply = model::request_json_object(client, PLANNER_SYSTEM_PROMPT, &payload, model::PLAN_SEED)?;

    let steps = parse_steps(intent, reply.get("steps").unwrap_or(&Value::Null))?;
    if steps.is_empty() {
        return Err(ModelError::invalid_payload("plan has no steps"));
    }
    Ok(ActionPlan::new(intent.clone(), steps, note_text(reply.get("notes"))))
}

fn review_with_model(
    client: &dyn ChatClient,
    intent: &Intent,
    plan: &ActionPlan,
    history: &[ExecutionResult],
    context: &Context,
) -> Result<PlanReview, ModelError> {
    let payload = json!({
        "intent": intent_payload(intent),
        "plan": plan.steps,
        "history": history,
        "context": context,
    });
    let reply = model::request_json_object(client, REVIEW_SYSTEM_PROMPT, &payload, model::REVIEW_SEED)?;

    let updated = match reply.get("plan") {
        Some(Value::Object(plan_payload)) => {
            let steps = parse_steps(intent, plan_payload.get("steps").unwrap_or(&Value::Null))?;
            let mut replacement = plan.next_revision();
            replacement.steps = steps;
            replacement.notes = note_text(plan_payload.get("notes")).or_else(|| plan.notes.clone());
            replacement
        }
        None | Some(Value::Null) => plan.clone(),
        Some(_) => return Err(ModelError::invalid_payload("plan must be an object")),
    };

    let next_steps = match reply.get("next_steps") {
        Some(Value::Array(items)) if !items.is_empty() => {
            parse_steps(intent, &Value::Array(items.clone()))?
        }
        _ => {
            let completed = completed_ids(history);
            updated
                .steps
                .iter()
                .filter(|step| !completed.contains(step.id.as_str()))
                .cloned()
                .collect()
        }
    };

    Ok(PlanReview {
        plan: updated,
        next_steps,
        complete: reply.get("complete").and_then(Value::as_bool).unwrap_or(false),
        message: note_text(reply.get("message")),
    })
}

fn note_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse model-provided steps; ids default to `step_{n}` and must be unique.
fn parse_steps(intent: &Intent, payload: &Value) -> Result<Vec<PlanStep>, ModelError> {
    let items = match payload {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(ModelError::invalid_payload("steps must be an array")),
    };

    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let object = item
            .as_object()
            .ok_or_else(|| ModelError::invalid_payload("each step must be an object"))?;
        let step = parse_step(intent, object, index + 1);
        if !seen.insert(step.id.clone()) {
            return Err(ModelError::invalid_payload(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
        steps.push(step);
    }
    Ok(steps)
}

fn parse_step(intent: &Intent, object: &Map<String, Value>, position: usize) -> PlanStep {
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let id = text("id").unwrap_or_else(|| format!("step_{}", position));
    let action = text("action").unwrap_or_else(|| {
        if intent.action.is_empty() {
            actions::REVIEW_REQUEST.to_string()
        } else {
            intent.action.clone()
        }
    });
    let parameters = object
        .get("parameters")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let depends_on = object
        .get("depends_on")
        .and_then(Value::as_array)
        .map(|deps| {
            deps.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // model plans get the same launcher synthesis as heuristic ones
    let parameters = if action == actions::EXECUTE_LOW_LEVEL {
        low_level::prepare_parameters(&parameters, &intent.raw_input)
    } else {
        parameters
    };

    PlanStep {
        id,
        action,
        description: text("description").unwrap_or_default(),
        parameters,
        depends_on,
    }
}
