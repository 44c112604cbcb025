//! Capability protocol, registry and executor
//!
//! A capability is bound to exactly one action identifier. The registry maps
//! identifiers to capabilities, and the executor runs steps against it. No
//! failure inside a capability (error return or panic) escapes the executor:
//! each one becomes an `error` result for the step.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Context, ExecutionResult, PlanStep};

/// Failure raised by a capability
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Missing {0}")]
    MissingParameter(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

impl CapabilityError {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParameter(name.into())
    }

    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<anyhow::Error> for CapabilityError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{:#}", err))
    }
}

pub type CapabilityResult = Result<ExecutionResult, CapabilityError>;

/// One named unit of work
pub trait Capability: Send + Sync {
    /// Action identifier this capability serves
    fn name(&self) -> &str;

    fn execute(&self, step: &PlanStep, context: &Context) -> CapabilityResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No capability registered for action '{0}'")]
    NotFound(String),
}

/// Action identifier to capability map
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `capability` under its name, replacing any previous binding.
    pub fn register(&mut self, capability: impl Capability + 'static) {
        self.register_shared(Arc::new(capability));
    }

    pub fn register_shared(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        if self.capabilities.insert(name.clone(), capability).is_some() {
            tracing::debug!(action = %name, "capability replaced");
        }
    }

    pub fn resolve(&self, action: &str) -> Result<Arc<dyn Capability>, ResolveError> {
        self.capabilities
            .get(action)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(action.to_string()))
    }

    pub fn contains(&self, action: &str) -> bool {
        self.capabilities.contains_key(action)
    }

    /// Registered action identifiers, sorted
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Runs steps against a registry
#[derive(Clone, Default)]
pub struct ActionExecutor {
    registry: CapabilityRegistry,
}

impl ActionExecutor {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// One result per step, in order
    pub fn execute_plan(&self, steps: &[PlanStep], context: &Context) -> Vec<ExecutionResult> {
        steps
            .iter()
            .map(|step| self.execute_step(step, context))
            .collect()
    }

    pub fn execute_step(&self, step: &PlanStep, context: &Context) -> ExecutionResult {
        let capability = match self.registry.resolve(&step.action) {
            Ok(capability) => capability,
            Err(err) => {
                tracing::warn!(step = %step.id, action = %step.action, "no capability registered");
                return ExecutionResult::blocked(&step.id, err.to_string());
            }
        };

        let span = tracing::info_span!("step", id = %step.id, action = %step.action);
        let _enter = span.enter();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| capability.execute(step, context)));
        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "capability failed");
                ExecutionResult::error(&step.id, err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "capability panicked");
                ExecutionResult::error(&step.id, format!("capability panicked: {}", message))
            }
        };
        // results always carry the id of the step that produced them
        if result.step_id != step.id {
            result.step_id = step.id.clone();
        }
        tracing::info!(status = %result.status, "step finished");
        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
