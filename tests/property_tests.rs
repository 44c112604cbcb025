//! Property-based tests for the orchestrator components
//!
//! These tests verify:
//! - Safety review partitions every plan exactly
//! - Reviews never re-queue steps that already completed
//! - Heuristic planning is deterministic
//! - Confidence values stay inside [0, 1]

use proptest::prelude::*;
use std::collections::HashSet;

use ainux::actions;
use ainux::intent::heuristic_parse;
use ainux::{
    ActionPlan, Context, ExecutionResult, ExecutionStatus, Intent, Parameters, PlanStep, Planner,
    SafetyChecker,
};

// =============================================================================
// Strategies
// =============================================================================

fn action_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(actions::ENUMERATE_PROCESSES),
        Just(actions::APPLY_PROCESS_MANAGEMENT),
        Just(actions::RUN_COMMAND),
        Just(actions::REVIEW_REQUEST),
        Just(actions::LAUNCH_APPLICATION),
        Just("system.shutdown"),
    ]
}

/// Plans with unique step ids `s0..sN`
fn plan_strategy() -> impl Strategy<Value = ActionPlan> {
    prop::collection::vec(action_strategy(), 0..8).prop_map(|actions| {
        let steps = actions
            .into_iter()
            .enumerate()
            .map(|(n, action)| PlanStep::new(format!("s{}", n), action, ""))
            .collect();
        ActionPlan::new(
            Intent::new("generated", actions::REVIEW_REQUEST, Parameters::new(), 0.5),
            steps,
            None,
        )
    })
}

fn status_strategy() -> impl Strategy<Value = ExecutionStatus> {
    prop_oneof![
        Just(ExecutionStatus::Success),
        Just(ExecutionStatus::Error),
        Just(ExecutionStatus::Blocked),
        Just(ExecutionStatus::DryRun),
    ]
}

fn error_text_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("permission denied"),
        Just("No module named 'requests'"),
        Just("bash: htop: command not found"),
        Just(""),
    ]
}

fn request_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{0,40}",
        Just("kill the stuck process".to_string()),
        Just("optimize memory usage".to_string()),
        Just("open firefox".to_string()),
        Just("move the mouse left a little".to_string()),
        Just("run this in assembly".to_string()),
        Just("remind me at 7pm on friday".to_string()),
    ]
}

// =============================================================================
// Safety partition
// =============================================================================

proptest! {
    /// Approved and blocked are disjoint and together cover every step once, in plan order
    #[test]
    fn safety_review_partitions_plan(plan in plan_strategy(), deny_process in any::<bool>()) {
        let mut deny = vec!["system.shutdown".to_string()];
        if deny_process {
            deny.push(actions::APPLY_PROCESS_MANAGEMENT.to_string());
        }
        let report = SafetyChecker::new(None, deny).review(&plan, &Context::new());

        let approved: HashSet<&str> = report.approved_ids().into_iter().collect();
        let blocked: HashSet<&str> = report.blocked_ids().into_iter().collect();
        prop_assert!(approved.is_disjoint(&blocked));
        prop_assert_eq!(approved.len() + blocked.len(), plan.steps.len());

        let approved_order: Vec<&str> = plan
            .steps
            .iter()
            .map(|s| s.id.as_str())
            .filter(|id| approved.contains(id))
            .collect();
        prop_assert_eq!(report.approved_ids(), approved_order);

        for step in &report.blocked_steps {
            prop_assert!(
                step.action == "system.shutdown"
                    || (deny_process && step.action == actions::APPLY_PROCESS_MANAGEMENT)
            );
        }
    }
}

// =============================================================================
// Review never re-queues completed steps
// =============================================================================

proptest! {
    #[test]
    fn completed_steps_never_requeued(
        plan in plan_strategy(),
        attempts in prop::collection::vec((0usize..8, status_strategy(), error_text_strategy()), 0..12),
    ) {
        prop_assume!(!plan.steps.is_empty());
        let history: Vec<ExecutionResult> = attempts
            .into_iter()
            .map(|(n, status, error)| {
                let id = plan.steps[n % plan.steps.len()].id.clone();
                let result = ExecutionResult::new(id, status);
                if status.is_failure() && !error.is_empty() {
                    result.with_error(error)
                } else {
                    result
                }
            })
            .collect();
        let completed: HashSet<&str> = history
            .iter()
            .filter(|r| !r.is_failure())
            .map(|r| r.step_id.as_str())
            .collect();

        let review = Planner::new(None).review_execution(&plan.intent, &plan, &history, &Context::new());
        for step in &review.next_steps {
            prop_assert!(!completed.contains(step.id.as_str()), "requeued {}", step.id);
        }
        prop_assert!(review.plan.duplicate_id().is_none());
    }

    /// A step that failed three times ends the run and leaves the queue
    #[test]
    fn exhausted_step_is_dropped(plan in plan_strategy(), victim in 0usize..8) {
        prop_assume!(!plan.steps.is_empty());
        let id = plan.steps[victim % plan.steps.len()].id.clone();
        let history: Vec<ExecutionResult> = (0..3)
            .map(|_| ExecutionResult::error(id.clone(), "permission denied"))
            .collect();

        let review = Planner::new(None).review_execution(&plan.intent, &plan, &history, &Context::new());
        prop_assert!(review.complete);
        prop_assert!(review.next_steps.iter().all(|s| s.id != id));
    }
}

// =============================================================================
// Determinism and confidence bounds
// =============================================================================

proptest! {
    /// Heuristic plans are identical for identical input
    #[test]
    fn heuristic_plan_is_deterministic(request in request_strategy()) {
        prop_assume!(!request.trim().is_empty());
        let context = Context::new();
        let planner = Planner::new(None);
        let intent = heuristic_parse(request.trim(), &context);

        let first = serde_json::to_string(&planner.create_plan(&intent, &context).steps).unwrap();
        let second = serde_json::to_string(&planner.create_plan(&intent, &context).steps).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn heuristic_confidence_in_range(request in ".{1,60}") {
        let intent = heuristic_parse(&request, &Context::new());
        prop_assert!((0.0..=1.0).contains(&intent.confidence));
        prop_assert!(!intent.action.is_empty());
    }

    #[test]
    fn intent_confidence_is_clamped(confidence in any::<f64>()) {
        let intent = Intent::new("x", actions::REVIEW_REQUEST, Parameters::new(), confidence);
        prop_assert!((0.0..=1.0).contains(&intent.confidence));
    }
}
