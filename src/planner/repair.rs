//! Dependency repair and bounded retry
//!
//! Failure text from a step is matched against two pattern tables. A missing
//! Python module becomes a `python.ensure_package` step and a missing command
//! becomes an `apt-get install` step; either is inserted right before the
//! failing step, which then depends on it.

use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::actions;
use crate::models::{ActionPlan, ExecutionResult, Parameters, PlanStep, text_param};

/// Failures of one step id before it is skipped
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// "module not found" phrasings; group 1 is the module path
pub static MODULE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"ModuleNotFoundError: No module named ['"]([A-Za-z0-9_.]+)['"]"#,
        r#"ImportError: No module named ['"]?([A-Za-z0-9_.]+)['"]?"#,
        r#"No module named ['"]?([A-Za-z0-9_.]+)['"]?"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid module pattern"))
    .collect()
});

/// "command not found" phrasings; group 1 is the command
pub static COMMAND_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Command '([\w.+-]+)' not found",
        r"sh: \d+: ([\w.+-]+): not found",
        r"command not found: ([\w.+-]+)",
        r"([\w.+-]+): command not found",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid command pattern"))
    .collect()
});

/// Import names whose pip distribution is named differently
const MODULE_PACKAGES: &[(&str, &str)] = &[
    ("cv2", "opencv-python"),
    ("PIL", "pillow"),
    ("yaml", "pyyaml"),
    ("sklearn", "scikit-learn"),
    ("bs4", "beautifulsoup4"),
];

/// A recognized dependency failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSignature {
    MissingModule { module: String, package: String },
    MissingCommand { command: String },
}

/// Scan failure text; module patterns are tried before command patterns
pub fn detect_failure(text: &str) -> Option<FailureSignature> {
    for pattern in MODULE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            let module = caps[1].trim_end_matches('.').to_string();
            let package = package_for_module(&module);
            return Some(FailureSignature::MissingModule { module, package });
        }
    }
    for pattern in COMMAND_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            return Some(FailureSignature::MissingCommand {
                command: caps[1].to_string(),
            });
        }
    }
    None
}

/// Scan a result's error text, then its output
pub fn detect_in_result(result: &ExecutionResult) -> Option<FailureSignature> {
    [result.error.as_deref(), result.output.as_deref()]
        .into_iter()
        .flatten()
        .find_map(detect_failure)
}

/// pip distribution for an import path
pub fn package_for_module(module: &str) -> String {
    let top = module.split('.').next().unwrap_or(module);
    MODULE_PACKAGES
        .iter()
        .find(|(name, _)| *name == top)
        .map(|(_, package)| package.to_string())
        .unwrap_or_else(|| top.to_string())
}

/// `command` parameter as a token list
fn command_tokens(params: &Parameters) -> Vec<String> {
    match params.get("command") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Whether `plan` already carries a remediation for `signature`
pub fn has_remediation(plan: &ActionPlan, signature: &FailureSignature) -> bool {
    plan.steps.iter().any(|step| match signature {
        FailureSignature::MissingModule { module, package } => {
            step.action == actions::ENSURE_PYTHON_PACKAGE
                && (text_param(&step.parameters, "package") == Some(package.as_str())
                    || text_param(&step.parameters, "module").is_some_and(|m| {
                        m == module.as_str() || package_for_module(m) == *package
                    }))
        }
        FailureSignature::MissingCommand { command } => {
            if step.action != actions::RUN_COMMAND {
                return false;
            }
            let tokens = command_tokens(&step.parameters);
            matches!(tokens.first().map(String::as_str), Some("apt" | "apt-get"))
                && tokens.iter().any(|t| t == "install")
                && tokens.iter().skip(1).any(|t| t == command)
        }
    })
}

/// Lowercase id fragment: alphanumerics kept, everything else `_`
fn sanitize(fragment: &str) -> String {
    let cleaned: String = fragment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "dependency".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `base`, or `base_2`, `base_3`... whichever is free in `plan`
pub fn unique_step_id(plan: &ActionPlan, base: &str) -> String {
    if !plan.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !plan.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Build the remediation step for `signature`
pub fn remediation_step(
    plan: &ActionPlan,
    signature: &FailureSignature,
    failing_step: &str,
) -> PlanStep {
    match signature {
        FailureSignature::MissingModule { module, package } => {
            let id = unique_step_id(plan, &format!("ensure_python_{}", sanitize(package)));
            let mut params = Parameters::new();
            params.insert("package".into(), json!(package));
            params.insert("module".into(), json!(module));
            PlanStep::new(
                id,
                actions::ENSURE_PYTHON_PACKAGE,
                format!(
                    "Install Python package '{}' required by step '{}'.",
                    package, failing_step
                ),
            )
            .with_parameters(params)
        }
        FailureSignature::MissingCommand { command } => {
            let id = unique_step_id(plan, &format!("install_{}", sanitize(command)));
            let mut params = Parameters::new();
            params.insert("command".into(), json!(["apt-get", "install", "-y", command]));
            PlanStep::new(
                id,
                actions::RUN_COMMAND,
                format!(
                    "Install the package providing '{}' required by step '{}'.",
                    command, failing_step
                ),
            )
            .with_parameters(params)
        }
    }
}

/// New plan revision with `remediation` placed before `failing_step`.
///
/// Returns `None` when `failing_step` is not part of `plan`.
pub fn insert_remediation(
    plan: &ActionPlan,
    failing_step: &str,
    remediation: PlanStep,
) -> Option<ActionPlan> {
    let position = plan.position(failing_step)?;
    let mut updated = plan.next_revision();
    let remediation_id = remediation.id.clone();
    updated.steps.insert(position, remediation);
    let failing = &mut updated.steps[position + 1];
    if !failing.depends_on.contains(&remediation_id) {
        failing.depends_on.push(remediation_id);
    }
    Some(updated)
}

/// Failure counts per step id across the whole history
pub fn failure_counts(history: &[ExecutionResult]) -> HashMap<&str, u32> {
    let mut counts = HashMap::new();
    for result in history.iter().filter(|r| r.is_failure()) {
        *counts.entry(result.step_id.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Step ids that reached `max_attempts` failures, in plan order
pub fn exhausted_steps(plan: &ActionPlan, history: &[ExecutionResult], max_attempts: u32) -> Vec<String> {
    let counts = failure_counts(history);
    plan.steps
        .iter()
        .filter(|step| counts.get(step.id.as_str()).copied().unwrap_or(0) >= max_attempts)
        .map(|step| step.id.clone())
        .collect()
}
