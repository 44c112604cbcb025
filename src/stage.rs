//! Orchestration Stage Machine
//!
//! Tracks where one `orchestrate` call is in its pipeline and rejects
//! transitions the control loop should never make.
//!
//! # Stage Flow
//!
//! ```text
//! Start
//!   ↓
//! Intent
//!   ↓
//! Plan
//!   ↓
//! Safety ──────────────→ ExecutionSkipped
//!   ↓         ↑                 ↓
//! Execution → Replan         Complete
//!   ↓
//! Complete
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Pipeline stages of one orchestration call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OrchestrationStage {
    Start = 0,
    Intent = 1,
    Plan = 2,
    Safety = 3,
    Execution = 4,
    /// The planner handed back a replacement plan
    Replan = 5,
    /// Dry run, or nothing approved in an empty plan
    ExecutionSkipped = 6,
    Complete = 7,
    Failed = 255,
}

impl OrchestrationStage {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Wire name used in observer notifications
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Intent => "intent",
            Self::Plan => "plan",
            Self::Safety => "safety",
            Self::Execution => "execution",
            Self::Replan => "replan",
            Self::ExecutionSkipped => "execution_skipped",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Whether `to` is a legal successor of this stage
    pub const fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(to, Self::Failed) {
            return true;
        }
        matches!(
            (self, to),
            (Self::Start, Self::Intent)
                | (Self::Intent, Self::Plan)
                | (Self::Plan, Self::Safety)
                | (Self::Safety, Self::Execution)
                | (Self::Safety, Self::ExecutionSkipped)
                | (Self::Execution, Self::Replan)
                | (Self::Execution, Self::Complete)
                | (Self::Replan, Self::Safety)
                | (Self::ExecutionSkipped, Self::Complete)
        )
    }
}

impl fmt::Display for OrchestrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("Cannot transition from terminal stage {from}")]
    FromTerminalStage { from: OrchestrationStage },

    #[error("Invalid stage transition from {from} to {to}")]
    Invalid {
        from: OrchestrationStage,
        to: OrchestrationStage,
    },
}

/// Owns the current stage of one call plus a timestamped history
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: OrchestrationStage,
    /// (stage, unix timestamp) for every stage entered, including Start
    history: Vec<(OrchestrationStage, u64)>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: OrchestrationStage::Start,
            history: vec![(OrchestrationStage::Start, unix_now())],
        }
    }

    #[inline]
    pub fn current(&self) -> OrchestrationStage {
        self.current
    }

    pub fn history(&self) -> &[(OrchestrationStage, u64)] {
        &self.history
    }

    /// Stages visited so far, in order
    pub fn visited(&self) -> Vec<OrchestrationStage> {
        self.history.iter().map(|(stage, _)| *stage).collect()
    }

    /// Move to `to`, validating against the transition table
    pub fn transition_to(
        &mut self,
        to: OrchestrationStage,
    ) -> Result<OrchestrationStage, StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalStage { from: self.current });
        }
        if !self.current.can_transition_to(to) {
            return Err(StageTransitionError::Invalid {
                from: self.current,
                to,
            });
        }
        tracing::debug!(from = %self.current, %to, "orchestration stage transition");
        self.current = to;
        self.history.push((to, unix_now()));
        Ok(to)
    }

    /// Mark the call failed; no-op if already terminal
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.current = OrchestrationStage::Failed;
            self.history.push((OrchestrationStage::Failed, unix_now()));
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrchestrationStage::*;

    #[test]
    fn test_full_execution_path() {
        let mut tracker = StageTracker::new();
        for stage in [Intent, Plan, Safety, Execution, Replan, Safety, Execution, Complete] {
            tracker.transition_to(stage).unwrap();
        }
        assert_eq!(tracker.current(), Complete);
        assert_eq!(tracker.history().len(), 9);
    }

    #[test]
    fn test_skipped_path() {
        let mut tracker = StageTracker::new();
        for stage in [Intent, Plan, Safety, ExecutionSkipped, Complete] {
            tracker.transition_to(stage).unwrap();
        }
        assert_eq!(tracker.visited().first(), Some(&Start));
        assert_eq!(tracker.visited().last(), Some(&Complete));
    }

    #[test]
    fn test_cannot_skip_planning() {
        let mut tracker = StageTracker::new();
        tracker.transition_to(Intent).unwrap();
        let err = tracker.transition_to(Safety).unwrap_err();
        assert_eq!(err, StageTransitionError::Invalid { from: Intent, to: Safety });
        assert_eq!(tracker.current(), Intent);
    }

    #[test]
    fn test_replan_must_rerun_safety() {
        let mut tracker = StageTracker::new();
        for stage in [Intent, Plan, Safety, Execution, Replan] {
            tracker.transition_to(stage).unwrap();
        }
        assert!(tracker.transition_to(Execution).is_err());
        assert!(tracker.transition_to(Safety).is_ok());
    }

    #[test]
    fn test_terminal_stages_are_final() {
        let mut tracker = StageTracker::new();
        tracker.fail();
        assert_eq!(tracker.current(), Failed);
        assert_eq!(
            tracker.transition_to(Intent),
            Err(StageTransitionError::FromTerminalStage { from: Failed })
        );
        tracker.fail();
        assert_eq!(tracker.history().len(), 2);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(ExecutionSkipped.to_string(), "execution_skipped");
        assert_eq!(Replan.as_str(), "replan");
    }
}
