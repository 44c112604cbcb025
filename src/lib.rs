//! Ainux orchestrator library
//!
//! Turns a natural-language request into an intent, a dependency-ordered
//! plan, a safety review and a supervised, self-repairing execution loop.
//! An optional chat model refines every stage; without one each component
//! runs on deterministic heuristics.

pub mod actions;
pub mod capabilities;
pub mod capability;
pub mod cli;
pub mod command_args;
pub mod command_runner;
pub mod commands;
pub mod config_file;
pub mod error;
pub mod fabric;
pub mod intent;
pub mod model;
pub mod models;
pub mod observer;
pub mod orchestrator;
pub mod planner;
pub mod process_guard;
pub mod safety;
pub mod sanity;
pub mod stage;
pub mod types;
pub mod verification;

// Re-export main types for convenience
pub use capability::{
    ActionExecutor, Capability, CapabilityError, CapabilityRegistry, CapabilityResult,
    ResolveError,
};
pub use command_args::CommandArgs;
pub use command_runner::{CommandOutput, LaunchState, launch_detached, run_command_safe, spawn_detached};
pub use config_file::{ModelSettings, OrchestratorConfig};
pub use error::{OrchestratorError, Result};
pub use fabric::{ContextFabric, FabricSnapshot, JsonFabric};
pub use intent::IntentParser;
pub use model::{ChatClient, ChatCompletion, ChatMessage, CompletionOptions, ModelError};
pub use models::{
    ActionPlan, Context, ExecutionResult, Intent, OrchestrationResult, Parameters, PlanReview,
    PlanStep, SafetyReport,
};
pub use observer::{NoopObserver, OrchestrationObserver, RecordingObserver, TracingObserver};
pub use orchestrator::Orchestrator;
pub use planner::Planner;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use safety::SafetyChecker;
pub use stage::{OrchestrationStage, StageTracker, StageTransitionError};
pub use types::{CodeLanguage, ExecutionStatus, PointerDirection, PointerOperation, ProcessOperation};
pub use verification::{ResultVerifier, VerificationResult};
