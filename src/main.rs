//! Ainux - Main entry point
//!
//! Parses the command line, sets up logging and child-process cleanup, and
//! hands requests to the orchestrator.

use anyhow::{Context as _, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use ainux::cli::{self, Cli, Commands};
use ainux::models::{Context, ExecutionResult, OrchestrationResult, PlanReview, PlanStep};
use ainux::observer::{OrchestrationObserver, TracingObserver};
use ainux::stage::OrchestrationStage;
use ainux::types::ExecutionStatus;
use ainux::{Orchestrator, OrchestratorConfig, ProcessGuard, process_guard, sanity};

/// Initialize tracing on stderr; RUST_LOG overrides the level
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    info!("Ainux orchestrator starting up");

    // Children still registered when we are signalled get their process group killed
    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();
    debug!("Signal handlers initialized");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { config } => {
            info!("Validating configuration file: {:?}", config);
            let loaded = OrchestratorConfig::load_from_file(&config)
                .context("Failed to load configuration file")?;
            loaded
                .validate()
                .context("Configuration validation failed")?;
            println!("✓ Configuration file is valid: {}", config.display());
        }
        Commands::Capabilities => {
            let config = load_config(cli.config.as_deref())?;
            let orchestrator = Orchestrator::from_config(&config)?;
            for name in orchestrator.executor().registry().names() {
                println!("{}", name);
            }
        }
        Commands::Doctor => {
            let report = sanity::verify_environment();
            for line in sanity::render(&report) {
                println!("{}", line);
            }
            if !report.is_ok() {
                println!("Some capabilities will report errors until the missing tools are installed.");
            }
        }
        Commands::Plan {
            request,
            context,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            orchestrate(&config, &cli::request_text(&request), context.as_deref(), false, json)?;
        }
        Commands::Run {
            request,
            context,
            fabric,
            json,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(fabric) = fabric {
                config.fabric_path = Some(fabric);
            }
            let execute = !cli.dry_run;
            orchestrate(&config, &cli::request_text(&request), context.as_deref(), execute, json)?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => {
            debug!("Loading configuration from {:?}", path);
            OrchestratorConfig::load_from_file(path)
        }
        None => Ok(OrchestratorConfig::default()),
    }
}

fn load_context(path: &Path) -> Result<Context> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read context from {:?}", path))?;
    match serde_json::from_str::<serde_json::Value>(&content).context("Failed to parse context JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Context file {:?} must contain a JSON object", path),
    }
}

fn orchestrate(
    config: &OrchestratorConfig,
    request: &str,
    context_path: Option<&Path>,
    execute: bool,
    json: bool,
) -> Result<()> {
    let context = context_path.map(load_context).transpose()?;
    let orchestrator = Orchestrator::from_config(config)?;

    let result = if json {
        orchestrator.orchestrate(request, context.as_ref(), execute, &mut TracingObserver)?
    } else {
        orchestrator.orchestrate(request, context.as_ref(), execute, &mut ConsoleObserver)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_summary(&result);
    if execute {
        let verdict = orchestrator.verifier().verify(
            &result.intent,
            &result.plan,
            &result.execution,
            context.as_ref().unwrap_or(&Context::new()),
        );
        let mark = if verdict.satisfied { "✓" } else { "✗" };
        println!(
            "{} Verification: {} (confidence {:.2})",
            mark, verdict.reasoning, verdict.confidence
        );
    }
    Ok(())
}

fn print_summary(result: &OrchestrationResult) {
    println!(
        "Intent: {} (confidence {:.2})",
        result.intent.action, result.intent.confidence
    );
    println!("Plan:");
    for step in &result.plan.steps {
        let mark = if result.safety.is_approved(&step.id) { "✓" } else { "✗" };
        println!("  {} {} [{}] {}", mark, step.id, step.action, step.description);
    }
    for warning in &result.safety.warnings {
        println!("  ! {}", warning);
    }
    if result.execution.is_empty() {
        println!("Execution skipped");
    }
    if let Some(message) = result.reviews.last().and_then(|r| r.message.as_deref()) {
        println!("Review: {}", message);
    }
}

/// Prints progress lines as the orchestration advances
struct ConsoleObserver;

impl OrchestrationObserver for ConsoleObserver {
    fn on_stage(&mut self, stage: OrchestrationStage, detail: Option<&str>) {
        match (stage, detail) {
            // reported by main with the full error chain
            (OrchestrationStage::Failed, _) => {}
            (_, Some(detail)) => println!("→ {}: {}", stage, detail),
            (_, None) => println!("→ {}", stage),
        }
    }

    fn on_step_start(&mut self, step: &PlanStep, index: usize, total: usize) {
        println!("  [{}/{}] {} ({})", index, total, step.id, step.action);
    }

    fn on_step_result(&mut self, result: &ExecutionResult) {
        let mark = match result.status {
            ExecutionStatus::Success | ExecutionStatus::DryRun => "✓",
            ExecutionStatus::Error | ExecutionStatus::Blocked => "✗",
        };
        let text = result
            .error
            .as_deref()
            .filter(|_| result.is_failure())
            .or(result.output.as_deref())
            .unwrap_or("");
        println!("  {} {} {}: {}", mark, result.step_id, result.status, first_line(text));
    }

    fn on_review(&mut self, review: &PlanReview) {
        let notable = |m: &&str| m.contains("remediation") || m.contains("skipping");
        if let Some(message) = review.message.as_deref().filter(notable) {
            println!("  ↻ {}", message);
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
