//! Scheduling-priority adjustments.

use crate::command_args::CommandArgs;

/// `renice -n <priority> -p <pid>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReniceArgs {
    pub pid: u32,
    /// Clamped to the kernel's -20..=19 range
    pub priority: i32,
}

impl CommandArgs for ReniceArgs {
    fn program(&self) -> &str {
        "renice"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-n".to_string(),
            self.priority.clamp(-20, 19).to_string(),
            "-p".to_string(),
            self.pid.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_is_clamped() {
        let args = ReniceArgs { pid: 42, priority: 40 };
        assert_eq!(args.to_cli_args(), ["-n", "19", "-p", "42"]);
    }
}
