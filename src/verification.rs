//! Post-run check of whether an orchestration satisfied its request.
//!
//! Purely advisory: the verdict is reported to the operator and never feeds
//! back into the orchestration result.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::model::{self, ChatClient, ModelError};
use crate::models::{ActionPlan, Context, ExecutionResult, Intent};

const VERIFIER_SYSTEM_PROMPT: &str = "You are the execution verifier for the Ainux operating system.\n\
Given the operator request, the executed plan and the step results, decide whether \
the request has been satisfied.\n\n\
Respond as JSON: {\"satisfied\": boolean, \"confidence\": number between 0 and 1, \"reason\": string}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub satisfied: bool,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Clone, Default)]
pub struct ResultVerifier {
    client: Option<Arc<dyn ChatClient>>,
}

impl ResultVerifier {
    pub fn new(client: Option<Arc<dyn ChatClient>>) -> Self {
        Self { client }
    }

    pub fn verify(
        &self,
        intent: &Intent,
        plan: &ActionPlan,
        history: &[ExecutionResult],
        context: &Context,
    ) -> VerificationResult {
        model::with_model_fallback(
            self.client.as_deref(),
            "verifier",
            |client| verify_with_model(client, intent, plan, history, context),
            || heuristic_verdict(history),
        )
    }
}

pub fn heuristic_verdict(history: &[ExecutionResult]) -> VerificationResult {
    let Some(last) = history.last() else {
        return VerificationResult {
            satisfied: false,
            confidence: 0.0,
            reasoning: "No execution steps have run yet.".to_string(),
        };
    };

    let last_failure = history
        .iter()
        .rev()
        .find(|r| r.is_failure() || r.error.as_deref().is_some_and(|e| !e.trim().is_empty()));
    if let Some(failure) = last_failure {
        return VerificationResult {
            satisfied: false,
            confidence: 0.1,
            reasoning: failure
                .error
                .clone()
                .or_else(|| failure.output.clone())
                .unwrap_or_else(|| failure.status.to_string()),
        };
    }

    VerificationResult {
        satisfied: true,
        confidence: 0.8,
        reasoning: last.output.clone().unwrap_or_else(|| last.status.to_string()),
    }
}

fn verify_with_model(
    client: &dyn ChatClient,
    intent: &Intent,
    plan: &ActionPlan,
    history: &[ExecutionResult],
    context: &Context,
) -> Result<VerificationResult, ModelError> {
    let payload = json!({
        "request": intent.raw_input,
        "intent": {"action": intent.action, "parameters": intent.parameters},
        "plan": plan.steps,
        "history": history,
        "context": context,
    });
    let reply =
        model::request_json_object(client, VERIFIER_SYSTEM_PROMPT, &payload, model::VERIFY_SEED)?;

    let satisfied = reply
        .get("satisfied")
        .and_then(Value::as_bool)
        .ok_or_else(|| ModelError::invalid_payload("satisfied must be a boolean"))?;
    let confidence = reply
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(if satisfied { 1.0 } else { 0.0 });
    let reasoning = ["reason", "message", "notes"]
        .iter()
        .find_map(|key| reply.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    Ok(VerificationResult {
        satisfied,
        confidence,
        reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::ScriptedClient;
    use crate::models::Parameters;

    fn plan() -> ActionPlan {
        ActionPlan::new(Intent::new("x", "a", Parameters::new(), 0.5), Vec::new(), None)
    }

    #[test]
    fn test_no_history_is_unsatisfied() {
        let verdict = heuristic_verdict(&[]);
        assert!(!verdict.satisfied);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn test_failure_reported() {
        let verdict = heuristic_verdict(&[
            ExecutionResult::error("a", "permission denied"),
            ExecutionResult::success("b", "ok"),
        ]);
        assert!(!verdict.satisfied);
        assert_eq!(verdict.confidence, 0.1);
        assert_eq!(verdict.reasoning, "permission denied");
    }

    #[test]
    fn test_success_uses_last_output() {
        let verdict = heuristic_verdict(&[ExecutionResult::success("a", "launched")]);
        assert!(verdict.satisfied);
        assert_eq!(verdict.confidence, 0.8);
        assert_eq!(verdict.reasoning, "launched");
    }

    #[test]
    fn test_model_confidence_defaults_from_verdict() {
        let client = Arc::new(ScriptedClient::replying(json!({"satisfied": true, "message": "done"})));
        let verdict = ResultVerifier::new(Some(client.clone())).verify(
            &plan().intent,
            &plan(),
            &[],
            &Context::new(),
        );
        assert!(verdict.satisfied);
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(verdict.reasoning, "done");
        assert_eq!(client.seen_seeds.lock().unwrap().as_slice(), &[Some(model::VERIFY_SEED)]);
    }
}
