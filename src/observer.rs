//! Progress notifications
//!
//! Observers are informational only: every method has an empty default and
//! nothing they do can change the course of an orchestration.

use crate::models::{ExecutionResult, PlanReview, PlanStep};
use crate::stage::OrchestrationStage;

pub trait OrchestrationObserver {
    /// Stage transition with an optional detail line
    fn on_stage(&mut self, _stage: OrchestrationStage, _detail: Option<&str>) {}

    /// Before a step runs; `index` is 1-based and `total` counts pending steps
    fn on_step_start(&mut self, _step: &PlanStep, _index: usize, _total: usize) {}

    fn on_step_result(&mut self, _result: &ExecutionResult) {}

    fn on_review(&mut self, _review: &PlanReview) {}
}

/// Discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl OrchestrationObserver for NoopObserver {}

/// Emits notifications as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl OrchestrationObserver for TracingObserver {
    fn on_stage(&mut self, stage: OrchestrationStage, detail: Option<&str>) {
        tracing::info!(stage = stage.as_str(), detail = detail.unwrap_or(""), "stage");
    }

    fn on_step_start(&mut self, step: &PlanStep, index: usize, total: usize) {
        tracing::info!(step = %step.id, action = %step.action, index, total, "step start");
    }

    fn on_step_result(&mut self, result: &ExecutionResult) {
        tracing::info!(step = %result.step_id, status = %result.status, "step result");
    }

    fn on_review(&mut self, review: &PlanReview) {
        tracing::info!(
            complete = review.complete,
            next = review.next_steps.len(),
            message = review.message.as_deref().unwrap_or(""),
            "review"
        );
    }
}

/// Records notifications as text lines, in order
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub events: Vec<String>,
}

impl OrchestrationObserver for RecordingObserver {
    fn on_stage(&mut self, stage: OrchestrationStage, detail: Option<&str>) {
        self.events.push(match detail {
            Some(detail) => format!("stage:{}:{}", stage.as_str(), detail),
            None => format!("stage:{}", stage.as_str()),
        });
    }

    fn on_step_start(&mut self, step: &PlanStep, index: usize, total: usize) {
        self.events.push(format!("start:{}:{}/{}", step.id, index, total));
    }

    fn on_step_result(&mut self, result: &ExecutionResult) {
        self.events.push(format!("result:{}:{}", result.step_id, result.status));
    }

    fn on_review(&mut self, review: &PlanReview) {
        self.events.push(format!("review:{}", review.complete));
    }
}
