//! Error handling module for the orchestrator
//!
//! Provides the crate-level error type using thiserror. Component-local
//! failures (model transport, capability failures, registry misses) have
//! their own enums and are absorbed before they reach this type; only the
//! conditions a caller must see end up here.

use thiserror::Error;

use crate::stage::StageTransitionError;

/// Main error type for orchestration calls
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// IO errors (config, fabric, blueprint files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request could not be accepted (empty text)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Safety review left nothing to run
    #[error("{}", if *after_replan {
        "All plan steps were blocked after planner review"
    } else {
        "All plan steps were blocked by safety checks"
    })]
    AllStepsBlocked { after_replan: bool },

    /// A plan carried two steps with the same id
    #[error("Plan contains duplicate step id '{id}'")]
    DuplicateStepId { id: String },

    /// Internal stage tracking failure
    #[error("Stage transition error: {0}")]
    StageTransition(#[from] StageTransitionError),

    /// Context fabric errors
    #[error("Fabric error: {0}")]
    Fabric(String),
}

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a duplicate step id error
    pub fn duplicate_step(id: impl Into<String>) -> Self {
        Self::DuplicateStepId { id: id.into() }
    }

    /// Create a fabric error
    pub fn fabric(msg: impl Into<String>) -> Self {
        Self::Fabric(msg.into())
    }

    /// True when the error is the zero-approved-steps failure
    pub fn is_all_blocked(&self) -> bool {
        matches!(self, Self::AllStepsBlocked { .. })
    }
}
