//! Tool availability report for the `doctor` command
//!
//! Nothing here is required for orchestration itself: a missing tool only
//! means the capability that shells out to it will report `error` for its
//! steps. The report tells the operator which capabilities can actually run.

use serde::Serialize;
use std::path::PathBuf;

use crate::actions;
use crate::planner::low_level;

/// External programs used by bundled capabilities, with the actions that need them
const TOOLS: &[(&str, &str)] = &[
    ("xdotool", actions::CONTROL_POINTER),
    ("cc", actions::EXECUTE_LOW_LEVEL),
    ("as", actions::EXECUTE_LOW_LEVEL),
    ("ld", actions::EXECUTE_LOW_LEVEL),
    ("python3", actions::ENSURE_PYTHON_PACKAGE),
    ("apt-get", actions::RUN_COMMAND),
    ("renice", actions::APPLY_RESOURCE_TUNING),
    ("bash", actions::EXECUTE_LOW_LEVEL),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub used_by: String,
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorReport {
    pub tools: Vec<ToolStatus>,
    /// Whether `/proc` is readable (process and resource capabilities)
    pub procfs: bool,
    pub is_root: bool,
}

impl DoctorReport {
    pub fn missing(&self) -> Vec<&ToolStatus> {
        self.tools.iter().filter(|t| !t.is_available()).collect()
    }

    pub fn is_ok(&self) -> bool {
        self.procfs && self.missing().is_empty()
    }
}

/// Search `$PATH` for every tool the bundled capabilities call.
pub fn verify_environment() -> DoctorReport {
    let tools = TOOLS
        .iter()
        .map(|(name, used_by)| {
            let path = low_level::which(name);
            if path.is_none() {
                tracing::debug!(tool = name, "tool not found on PATH");
            }
            ToolStatus {
                name: name.to_string(),
                used_by: used_by.to_string(),
                path,
            }
        })
        .collect();

    DoctorReport {
        tools,
        procfs: std::path::Path::new("/proc/self/status").exists(),
        is_root: nix::unistd::geteuid().is_root(),
    }
}

/// Debian package providing `tool`, for install hints
pub fn package_for_tool(tool: &str) -> &'static str {
    match tool {
        "xdotool" => "xdotool",
        "cc" => "gcc",
        "as" | "ld" => "binutils",
        "python3" => "python3",
        "apt-get" => "apt",
        "renice" => "bsdutils",
        "bash" => "bash",
        _ => "unknown",
    }
}

/// Human-readable report lines
pub fn render(report: &DoctorReport) -> Vec<String> {
    let mut lines = Vec::new();
    for tool in &report.tools {
        match &tool.path {
            Some(path) => lines.push(format!("✓ {:<8} {} ({})", tool.name, path.display(), tool.used_by)),
            None => lines.push(format!(
                "✗ {:<8} missing (install: apt-get install {}; needed by {})",
                tool.name,
                package_for_tool(&tool.name),
                tool.used_by
            )),
        }
    }
    lines.push(if report.procfs {
        "✓ /proc readable".to_string()
    } else {
        "✗ /proc not readable; process and resource capabilities will fail".to_string()
    });
    if !report.is_root {
        lines.push("• not running as root; renice below 0 and signals to other users' processes will be refused".to_string());
    }
    lines
}
