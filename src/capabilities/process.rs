//! Process listing and management through `/proc` and signals
//!
//! Processes are selected by `pid` (exact) or `name` (case-insensitive
//! substring of the command name). The orchestrator's own pid is never a
//! management target.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::Path;

use crate::actions;
use crate::capability::{Capability, CapabilityError, CapabilityResult};
use crate::models::{Context, ExecutionResult, Parameters, PlanStep, int_param, text_param};
use crate::types::ProcessOperation;

/// Listing output is capped at this many entries
pub const LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    pub state: String,
    pub rss_kb: u64,
}

/// Parse `/proc/<pid>/status`; `None` when the Name line is missing
pub fn parse_status(pid: u32, text: &str) -> Option<ProcessInfo> {
    let mut info = ProcessInfo {
        pid,
        ppid: 0,
        name: String::new(),
        state: String::new(),
        rss_kb: 0,
    };
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Name" => info.name = value.to_string(),
            "State" => info.state = value.split_whitespace().next().unwrap_or("").to_string(),
            "PPid" => info.ppid = value.parse().unwrap_or(0),
            "VmRSS" => {
                info.rss_kb = value
                    .split_whitespace()
                    .next()
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0)
            }
            _ => {}
        }
    }
    (!info.name.is_empty()).then_some(info)
}

/// Snapshot of every readable process under `root` (normally `/proc`)
pub fn scan_processes_in(root: &Path) -> std::io::Result<Vec<ProcessInfo>> {
    let mut processes = Vec::new();
    for entry in fs::read_dir(root)? {
        let Ok(entry) = entry else { continue };
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // processes can exit between readdir and read
        if let Ok(text) = fs::read_to_string(entry.path().join("status"))
            && let Some(info) = parse_status(pid, &text)
        {
            processes.push(info);
        }
    }
    processes.sort_by_key(|p| p.pid);
    Ok(processes)
}

pub fn scan_processes() -> std::io::Result<Vec<ProcessInfo>> {
    scan_processes_in(Path::new("/proc"))
}

/// `pid` and/or `name` selector from step parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessFilter {
    pub pid: Option<u32>,
    pub name: Option<String>,
}

impl ProcessFilter {
    pub fn from_parameters(params: &Parameters) -> Self {
        Self {
            pid: int_param(params, "pid").and_then(|p| u32::try_from(p).ok()),
            name: text_param(params, "name")
                .or_else(|| text_param(params, "process"))
                .map(str::to_lowercase),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pid.is_none() && self.name.is_none()
    }

    pub fn matches(&self, info: &ProcessInfo) -> bool {
        self.pid.is_none_or(|pid| info.pid == pid)
            && self
                .name
                .as_deref()
                .is_none_or(|name| info.name.to_lowercase().contains(name))
    }

    pub fn describe(&self) -> String {
        match (&self.name, self.pid) {
            (Some(name), Some(pid)) => format!("{} (pid {})", name, pid),
            (Some(name), None) => name.clone(),
            (None, Some(pid)) => format!("pid {}", pid),
            (None, None) => "all processes".to_string(),
        }
    }
}

fn operation(params: &Parameters) -> Result<ProcessOperation, CapabilityError> {
    match text_param(params, "operation") {
        None => Ok(ProcessOperation::default()),
        Some(op) => op
            .parse()
            .map_err(|_| CapabilityError::invalid("operation", format!("unknown operation '{}'", op))),
    }
}

pub fn signal_for(operation: ProcessOperation) -> Signal {
    match operation {
        ProcessOperation::Terminate => Signal::SIGTERM,
        ProcessOperation::Kill => Signal::SIGKILL,
        ProcessOperation::Pause => Signal::SIGSTOP,
        ProcessOperation::Resume => Signal::SIGCONT,
    }
}

/// Matching processes, excluding the orchestrator itself
fn targets(filter: &ProcessFilter) -> Result<Vec<ProcessInfo>, CapabilityError> {
    let own = std::process::id();
    Ok(scan_processes()?
        .into_iter()
        .filter(|p| p.pid != own && filter.matches(p))
        .collect())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessListing;

impl Capability for ProcessListing {
    fn name(&self) -> &str {
        actions::ENUMERATE_PROCESSES
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let filter = ProcessFilter::from_parameters(&step.parameters);
        let matches: Vec<ProcessInfo> = scan_processes()?
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect();
        let payload = json!({
            "filter": filter.describe(),
            "total": matches.len(),
            "processes": matches.iter().take(LIST_LIMIT).collect::<Vec<_>>(),
        });
        Ok(ExecutionResult::success(&step.id, super::json_text(&payload)))
    }
}

/// Proposes `{pid, name, operation}` entries without touching anything
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEvaluation;

impl Capability for ProcessEvaluation {
    fn name(&self) -> &str {
        actions::EVALUATE_PROCESS_ACTIONS
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let filter = ProcessFilter::from_parameters(&step.parameters);
        let operation = operation(&step.parameters)?;
        if filter.is_empty() {
            return Ok(ExecutionResult::success(
                &step.id,
                super::json_text(&json!({"proposals": [], "note": "no process selected"})),
            ));
        }
        let proposals: Vec<_> = targets(&filter)?
            .into_iter()
            .map(|p| json!({"pid": p.pid, "name": p.name, "operation": operation.to_string()}))
            .collect();
        Ok(ExecutionResult::success(
            &step.id,
            super::json_text(&json!({"proposals": proposals})),
        ))
    }
}

/// Delivers the signal for `operation` to every matching process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessManagement;

impl Capability for ProcessManagement {
    fn name(&self) -> &str {
        actions::APPLY_PROCESS_MANAGEMENT
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let filter = ProcessFilter::from_parameters(&step.parameters);
        if filter.is_empty() {
            return Err(CapabilityError::missing("pid or name"));
        }
        let operation = operation(&step.parameters)?;
        let sig = signal_for(operation);

        let targets = targets(&filter)?;
        if targets.is_empty() {
            return Ok(ExecutionResult::error(
                &step.id,
                format!("No process matches {}", filter.describe()),
            ));
        }

        let mut delivered = Vec::new();
        let mut failures = Vec::new();
        for target in &targets {
            match signal::kill(Pid::from_raw(target.pid as i32), sig) {
                Ok(()) => {
                    tracing::info!(pid = target.pid, name = %target.name, signal = %sig, "signal delivered");
                    delivered.push(format!("{} ({})", target.pid, target.name));
                }
                Err(e) => failures.push(format!("{} ({}): {}", target.pid, target.name, e)),
            }
        }

        let summary = format!("Sent {} to {}", sig, delivered.join(", "));
        if failures.is_empty() {
            return Ok(ExecutionResult::success(&step.id, summary));
        }
        let result = ExecutionResult::error(&step.id, failures.join("; "));
        Ok(if delivered.is_empty() {
            result
        } else {
            result.with_output(summary)
        })
    }
}
