//! Resource metrics, hotspot analysis and priority tuning.

use serde_json::json;
use std::fs;
use std::time::Duration;

use super::process::{self, ProcessInfo};
use crate::actions;
use crate::capability::{Capability, CapabilityResult};
use crate::commands::system::ReniceArgs;
use crate::models::{Context, ExecutionResult, PlanStep, int_param};

/// Load averages from `/proc/loadavg`
pub fn parse_loadavg(text: &str) -> Option<[f64; 3]> {
    let mut fields = text.split_whitespace().map(|f| f.parse::<f64>().ok());
    Some([fields.next()??, fields.next()??, fields.next()??])
}

/// Value in kB of one `/proc/meminfo` key
pub fn meminfo_kb(text: &str, key: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        (name == key)
            .then(|| rest.split_whitespace().next()?.parse().ok())
            .flatten()
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceMetrics;

impl Capability for ResourceMetrics {
    fn name(&self) -> &str {
        actions::COLLECT_RESOURCE_METRICS
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let load = parse_loadavg(&fs::read_to_string("/proc/loadavg")?);
        let meminfo = fs::read_to_string("/proc/meminfo")?;
        let total = meminfo_kb(&meminfo, "MemTotal");
        let available = meminfo_kb(&meminfo, "MemAvailable");
        let used_percent = match (total, available) {
            (Some(total), Some(available)) if total > 0 => {
                Some(((total.saturating_sub(available)) as f64 / total as f64 * 1000.0).round() / 10.0)
            }
            _ => None,
        };
        let cpus = std::thread::available_parallelism().map(|n| n.get()).ok();

        let payload = json!({
            "load_average": load,
            "cpu_count": cpus,
            "memory": {
                "total_kb": total,
                "available_kb": available,
                "used_percent": used_percent,
            },
        });
        Ok(ExecutionResult::success(&step.id, super::json_text(&payload)))
    }
}

/// Largest processes by resident memory
#[derive(Debug, Clone, Copy)]
pub struct HotspotAnalysis {
    pub limit: usize,
}

impl Default for HotspotAnalysis {
    fn default() -> Self {
        Self { limit: 5 }
    }
}

/// Top `limit` entries by RSS, ties broken by pid
pub fn top_by_memory(mut processes: Vec<ProcessInfo>, limit: usize) -> Vec<ProcessInfo> {
    processes.sort_by(|a, b| b.rss_kb.cmp(&a.rss_kb).then(a.pid.cmp(&b.pid)));
    processes.truncate(limit);
    processes
}

impl Capability for HotspotAnalysis {
    fn name(&self) -> &str {
        actions::ANALYZE_RESOURCE_HOTSPOTS
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let limit = int_param(&step.parameters, "limit")
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(self.limit);
        let hotspots = top_by_memory(process::scan_processes()?, limit);
        Ok(ExecutionResult::success(
            &step.id,
            super::json_text(&json!({"hotspots": hotspots})),
        ))
    }
}

/// `renice` when both `pid` and `nice` are given, otherwise a recommendation
#[derive(Debug, Clone, Copy)]
pub struct ResourceTuning {
    timeout: Duration,
}

impl ResourceTuning {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Capability for ResourceTuning {
    fn name(&self) -> &str {
        actions::APPLY_RESOURCE_TUNING
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let pid = int_param(&step.parameters, "pid").and_then(|p| u32::try_from(p).ok());
        let nice = int_param(&step.parameters, "nice")
            .or_else(|| int_param(&step.parameters, "priority"))
            .and_then(|n| i32::try_from(n).ok());

        match (pid, nice) {
            (Some(pid), Some(priority)) => Ok(super::run_for_step(
                &step.id,
                &ReniceArgs { pid, priority },
                self.timeout,
            )),
            _ => {
                let payload = json!({
                    "recommendation": "Provide pid and nice to apply a scheduling adjustment.",
                    "parameters": step.parameters,
                });
                Ok(ExecutionResult::dry_run(&step.id, super::json_text(&payload)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionStatus;

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/389 12345\n"), Some([0.52, 0.58, 0.59]));
        assert_eq!(parse_loadavg("garbage"), None);
    }

    #[test]
    fn test_meminfo_lookup() {
        let text = "MemTotal:       16303636 kB\nMemFree:         1234 kB\nMemAvailable:    8000000 kB\n";
        assert_eq!(meminfo_kb(text, "MemTotal"), Some(16303636));
        assert_eq!(meminfo_kb(text, "MemAvailable"), Some(8000000));
        assert_eq!(meminfo_kb(text, "SwapTotal"), None);
    }

    #[test]
    fn test_top_by_memory_orders_and_truncates() {
        let info = |pid, rss_kb| ProcessInfo {
            pid,
            ppid: 1,
            name: format!("p{}", pid),
            state: "S".into(),
            rss_kb,
        };
        let top = top_by_memory(vec![info(1, 10), info(2, 30), info(3, 30), info(4, 20)], 3);
        assert_eq!(top.iter().map(|p| p.pid).collect::<Vec<_>>(), [2, 3, 4]);
    }

    #[test]
    fn test_tuning_without_target_is_recommendation() {
        let step = PlanStep::new("apply_tuning", actions::APPLY_RESOURCE_TUNING, "");
        let result = ResourceTuning::new(Duration::from_secs(5))
            .execute(&step, &Context::new())
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::DryRun);
        assert!(result.output.unwrap().contains("recommendation"));
    }
}
