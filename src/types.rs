//! Typed vocabularies shared across the orchestrator
//!
//! Step parameters travel as JSON maps, but wherever a parameter has a closed
//! set of values it is parsed into one of these enums before use.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Outcome of one step attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Blocked,
    DryRun,
}

impl ExecutionStatus {
    /// Error and blocked attempts leave a step pending
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Blocked)
    }
}

/// Source language for low-level execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum CodeLanguage {
    #[strum(to_string = "c")]
    C,
    #[default]
    #[strum(to_string = "assembly", serialize = "asm")]
    Assembly,
    #[strum(to_string = "machine", serialize = "binary", serialize = "hex")]
    Machine,
    #[strum(to_string = "python", serialize = "py", serialize = "python3")]
    Python,
    #[strum(to_string = "shell", serialize = "bash", serialize = "sh")]
    Shell,
}

/// Pointer action requested by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PointerOperation {
    #[default]
    Move,
    Click,
    DoubleClick,
    RightClick,
    Locate,
}

/// Screen direction for relative pointer moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PointerDirection {
    Left,
    Right,
    Up,
    Down,
}

impl PointerDirection {
    /// Signed screen offset for a move of `distance` pixels (y grows downward)
    pub const fn offset(self, distance: i64) -> (i64, i64) {
        match self {
            Self::Left => (-distance, 0),
            Self::Right => (distance, 0),
            Self::Up => (0, -distance),
            Self::Down => (0, distance),
        }
    }
}

/// Process management operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProcessOperation {
    #[default]
    Terminate,
    Kill,
    Pause,
    Resume,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(ExecutionStatus::DryRun.to_string(), "dry_run");
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Blocked).unwrap(),
            "\"blocked\""
        );
        assert_eq!(ExecutionStatus::from_str("success").unwrap(), ExecutionStatus::Success);
    }

    #[test]
    fn test_failure_statuses() {
        assert!(ExecutionStatus::Error.is_failure());
        assert!(ExecutionStatus::Blocked.is_failure());
        assert!(!ExecutionStatus::Success.is_failure());
        assert!(!ExecutionStatus::DryRun.is_failure());
    }

    #[test]
    fn test_language_aliases() {
        assert_eq!(CodeLanguage::from_str("asm").unwrap(), CodeLanguage::Assembly);
        assert_eq!(CodeLanguage::from_str("ASSEMBLY").unwrap(), CodeLanguage::Assembly);
        assert_eq!(CodeLanguage::from_str("binary").unwrap(), CodeLanguage::Machine);
        assert_eq!(CodeLanguage::from_str("hex").unwrap(), CodeLanguage::Machine);
        assert_eq!(CodeLanguage::from_str("bash").unwrap(), CodeLanguage::Shell);
        assert_eq!(CodeLanguage::Machine.to_string(), "machine");
        assert!(CodeLanguage::from_str("cobol").is_err());
    }

    #[test]
    fn test_pointer_offsets() {
        assert_eq!(PointerDirection::Left.offset(25), (-25, 0));
        assert_eq!(PointerDirection::Up.offset(100), (0, -100));
        assert_eq!(PointerDirection::Down.offset(400), (0, 400));
        assert_eq!(PointerOperation::DoubleClick.to_string(), "double_click");
    }
}
