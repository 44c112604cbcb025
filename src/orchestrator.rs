//! Orchestration control loop
//!
//! One [`Orchestrator::orchestrate`] call takes a request through intent
//! parsing, planning, safety review and (optionally) supervised execution,
//! returning the full audit trail as an [`OrchestrationResult`].
//!
//! Steps run strictly one at a time. After every attempt the planner reviews
//! the history and may hand back a replacement plan, which is safety-reviewed
//! again before anything else runs.
//!
//! Cancellation is not built in. A caller that aborts mid-step may leave a
//! capability's side effect applied without a recorded result.

use serde_json::{Map, Value, json};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::capabilities;
use crate::capability::ActionExecutor;
use crate::config_file::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::fabric::{self, ContextFabric, JsonFabric};
use crate::intent::IntentParser;
use crate::model::{ChatClient, HttpChatClient};
use crate::models::{
    ActionPlan, Context, ExecutionResult, OrchestrationResult, PlanReview, SafetyReport,
};
use crate::observer::{NoopObserver, OrchestrationObserver};
use crate::planner::Planner;
use crate::safety::SafetyChecker;
use crate::stage::{OrchestrationStage, StageTracker};
use crate::verification::ResultVerifier;

/// Context key under which the fabric snapshot is supplied to components
pub const FABRIC_CONTEXT_KEY: &str = "fabric";

struct FabricHandle {
    fabric: Mutex<Box<dyn ContextFabric>>,
    path: Option<PathBuf>,
}

/// Coordinates parser, planner, safety checker and executor
pub struct Orchestrator {
    client: Option<Arc<dyn ChatClient>>,
    parser: IntentParser,
    planner: Planner,
    safety: SafetyChecker,
    executor: ActionExecutor,
    fabric: Option<FabricHandle>,
    fabric_event_limit: usize,
}

impl Orchestrator {
    /// Build from a validated configuration, wiring the model client and fabric it names.
    pub fn from_config(config: &OrchestratorConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let client: Option<Arc<dyn ChatClient>> = match &config.model {
            Some(settings) => {
                if settings.resolved_api_key().is_none() {
                    tracing::warn!(
                        base_url = %settings.base_url,
                        "no API key configured for model backend, sending unauthenticated requests"
                    );
                }
                Some(Arc::new(HttpChatClient::new(settings.clone())?))
            }
            None => None,
        };

        let mut orchestrator = Self::with_client(client, config);
        if let Some(path) = &config.fabric_path {
            let fabric = JsonFabric::load(path);
            orchestrator = orchestrator.with_fabric(Box::new(fabric), Some(path.clone()));
        }
        Ok(orchestrator)
    }

    /// Components share `client`; `None` runs every component on its heuristics.
    pub fn with_client(client: Option<Arc<dyn ChatClient>>, config: &OrchestratorConfig) -> Self {
        Self {
            parser: IntentParser::new(client.clone()),
            planner: Planner::new(client.clone()).with_max_attempts(config.max_step_attempts),
            safety: SafetyChecker::new(client.clone(), config.disallowed_actions.iter().cloned()),
            executor: ActionExecutor::new(capabilities::default_registry(config)),
            client,
            fabric: None,
            fabric_event_limit: config.fabric_event_limit,
        }
    }

    /// Attach a fabric; it is saved to `path` after every call when one is given.
    pub fn with_fabric(mut self, fabric: Box<dyn ContextFabric>, path: Option<PathBuf>) -> Self {
        self.fabric = Some(FabricHandle {
            fabric: Mutex::new(fabric),
            path,
        });
        self
    }

    pub fn with_executor(mut self, executor: ActionExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Verifier sharing this orchestrator's model client
    pub fn verifier(&self) -> ResultVerifier {
        ResultVerifier::new(self.client.clone())
    }

    /// Snapshot of the attached fabric, if any
    pub fn fabric_snapshot(&self, event_limit: usize) -> Option<fabric::FabricSnapshot> {
        self.fabric.as_ref().map(|handle| {
            handle
                .fabric
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot(event_limit)
        })
    }

    /// Plan and review `request` without executing anything.
    pub fn dry_run(&self, request: &str, context: Option<&Context>) -> Result<OrchestrationResult> {
        self.orchestrate(request, context, false, &mut NoopObserver)
    }

    /// Full orchestration call.
    ///
    /// Fails only for an empty request, a plan with duplicate step ids, or a
    /// safety review that approves nothing in a non-empty plan (initially or
    /// after a replan). Every other failure is recorded in the result.
    pub fn orchestrate(
        &self,
        request: &str,
        context: Option<&Context>,
        execute: bool,
        observer: &mut dyn OrchestrationObserver,
    ) -> Result<OrchestrationResult> {
        let mut tracker = StageTracker::new();
        observer.on_stage(OrchestrationStage::Start, None);

        match self.run(request, context, execute, &mut tracker, observer) {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::error!(stage = %tracker.current(), error = %err, "orchestration failed");
                tracker.fail();
                let detail = err.to_string();
                observer.on_stage(OrchestrationStage::Failed, Some(detail.as_str()));
                Err(err)
            }
        }
    }

    fn run(
        &self,
        request: &str,
        context: Option<&Context>,
        execute: bool,
        tracker: &mut StageTracker,
        observer: &mut dyn OrchestrationObserver,
    ) -> Result<OrchestrationResult> {
        let span = tracing::info_span!("orchestrate", execute);
        let _enter = span.enter();

        let mut context = context.cloned().unwrap_or_default();
        self.fabric_start(request, execute, &mut context);

        let mut intent = self.parser.parse(request, &context)?;
        if intent.context_snapshot.is_none() {
            intent.context_snapshot = Some(context.clone());
        }
        advance(tracker, observer, OrchestrationStage::Intent, Some(intent.action.as_str()))?;
        tracing::info!(action = %intent.action, confidence = intent.confidence, "intent parsed");

        let mut plan = self.planner.create_plan(&intent, &context);
        plan.ensure_unique_ids()?;
        let detail = format!("{} steps", plan.steps.len());
        advance(tracker, observer, OrchestrationStage::Plan, Some(detail.as_str()))?;

        let mut safety = self.safety.review(&plan, &context);
        let detail = safety_detail(&safety);
        advance(tracker, observer, OrchestrationStage::Safety, Some(detail.as_str()))?;
        if safety.approved_steps.is_empty() && !plan.steps.is_empty() {
            return Err(OrchestratorError::AllStepsBlocked {
                after_replan: false,
            });
        }

        let mut execution: Vec<ExecutionResult> = Vec::new();
        let mut reviews: Vec<PlanReview> = Vec::new();

        if execute && !safety.approved_steps.is_empty() {
            let mut pending: VecDeque<_> = safety.approved_steps.iter().cloned().collect();
            let detail = pending.len().to_string();
            advance(tracker, observer, OrchestrationStage::Execution, Some(detail.as_str()))?;

            let mut completed: HashSet<String> = HashSet::new();
            let mut attempt = 0;

            while let Some(step) = pending.pop_front() {
                if completed.contains(&step.id) {
                    continue;
                }
                attempt += 1;
                observer.on_step_start(&step, attempt, attempt + pending.len());

                let result = self.executor.execute_step(&step, &context);
                observer.on_step_result(&result);
                if !result.is_failure() {
                    completed.insert(step.id.clone());
                }
                execution.push(result);

                let review = self
                    .planner
                    .review_execution(&intent, &plan, &execution, &context);
                observer.on_review(&review);

                if is_replacement(&plan, &review) {
                    review.plan.ensure_unique_ids()?;
                    advance(tracker, observer, OrchestrationStage::Replan, review.message.as_deref())?;
                    tracing::info!(
                        revision = review.plan.revision,
                        steps = review.plan.steps.len(),
                        "plan replaced"
                    );
                    plan = review.plan.clone();
                    safety = self.safety.review(&plan, &context);
                    let detail = safety_detail(&safety);
                    advance(tracker, observer, OrchestrationStage::Safety, Some(detail.as_str()))?;
                    if safety.approved_steps.is_empty() && !plan.steps.is_empty() {
                        return Err(OrchestratorError::AllStepsBlocked { after_replan: true });
                    }
                    advance(tracker, observer, OrchestrationStage::Execution, None)?;
                }

                let complete = review.complete;
                if let Some(message) = &review.message {
                    tracing::debug!(complete, message = %message, "plan review");
                }
                reviews.push(review);
                if complete {
                    break;
                }

                pending = plan
                    .steps
                    .iter()
                    .filter(|s| !completed.contains(&s.id) && safety.is_approved(&s.id))
                    .cloned()
                    .collect();
            }
        } else {
            let reason = if execute { "no-approved-steps" } else { "dry-run" };
            advance(tracker, observer, OrchestrationStage::ExecutionSkipped, Some(reason))?;
            if !execute {
                let review = self.planner.review_execution(&intent, &plan, &[], &context);
                observer.on_review(&review);
                reviews.push(review);
            }
        }

        let result = OrchestrationResult {
            intent,
            plan,
            safety,
            execution,
            reviews,
        };
        self.fabric_finish(request, &result, !execute);
        advance(tracker, observer, OrchestrationStage::Complete, None)?;
        tracing::info!(
            executed = result.execution.len(),
            reviews = result.reviews.len(),
            "orchestration complete"
        );
        Ok(result)
    }

    fn fabric_start(&self, request: &str, execute: bool, context: &mut Context) {
        let Some(handle) = &self.fabric else {
            return;
        };
        let mut fabric = handle.fabric.lock().unwrap_or_else(PoisonError::into_inner);

        let mut metadata = Map::new();
        metadata.insert("last_request".into(), json!(request));
        metadata.insert("last_invocation".into(), json!(fabric::unix_now()));
        fabric.merge_metadata(metadata);
        fabric.record_event(
            "orchestrator.request",
            json!({"request": request, "execute": execute}),
        );

        if !context.contains_key(FABRIC_CONTEXT_KEY) {
            match serde_json::to_value(fabric.snapshot(self.fabric_event_limit)) {
                Ok(snapshot) => {
                    context.insert(FABRIC_CONTEXT_KEY.to_string(), snapshot);
                }
                Err(e) => tracing::warn!(error = %e, "could not serialize fabric snapshot"),
            }
        }
    }

    fn fabric_finish(&self, request: &str, result: &OrchestrationResult, dry_run: bool) {
        let Some(handle) = &self.fabric else {
            return;
        };
        let mut fabric = handle.fabric.lock().unwrap_or_else(PoisonError::into_inner);

        let mut metadata = Map::new();
        metadata.insert("last_intent_action".into(), json!(result.intent.action));
        metadata.insert("last_plan_step_count".into(), json!(result.plan.steps.len()));
        metadata.insert(
            "last_safety_approved".into(),
            json!(result.safety.approved_steps.len()),
        );
        metadata.insert(
            "last_safety_blocked".into(),
            json!(result.safety.blocked_steps.len()),
        );
        metadata.insert("last_execution_count".into(), json!(result.execution.len()));
        metadata.insert("dry_run".into(), Value::Bool(dry_run));
        fabric.merge_metadata(metadata);

        let executed: Vec<&str> = result.execution.iter().map(|r| r.step_id.as_str()).collect();
        fabric.record_event(
            "orchestrator.completed",
            json!({
                "request": request,
                "approved_steps": result.safety.approved_ids(),
                "blocked_steps": result.safety.blocked_ids(),
                "executed_steps": executed,
                "dry_run": dry_run,
            }),
        );

        if let Some(path) = &handle.path {
            if let Err(e) = fabric.save(path) {
                tracing::error!(path = %path.display(), error = %e, "failed to save fabric");
            }
        }
    }
}

fn advance(
    tracker: &mut StageTracker,
    observer: &mut dyn OrchestrationObserver,
    stage: OrchestrationStage,
    detail: Option<&str>,
) -> Result<()> {
    tracker.transition_to(stage)?;
    observer.on_stage(stage, detail);
    Ok(())
}

fn safety_detail(report: &SafetyReport) -> String {
    format!(
        "approved={} blocked={}",
        report.approved_steps.len(),
        report.blocked_steps.len()
    )
}

/// A review replaces the plan when it carries a different revision
fn is_replacement(current: &ActionPlan, review: &PlanReview) -> bool {
    review.plan.revision != current.revision
}
