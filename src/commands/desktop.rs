//! Pointer control through `xdotool`.

use crate::command_args::CommandArgs;
use crate::types::PointerOperation;

pub const XDOTOOL: &str = "xdotool";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XdotoolArgs {
    /// `mousemove_relative -- dx dy`
    MoveRelative { dx: i64, dy: i64 },
    /// `click [--repeat n] button`
    Click { button: u8, repeat: u8 },
    /// `getmouselocation --shell`
    Locate,
}

impl XdotoolArgs {
    /// Click invocation for a pointer operation; `None` for move/locate
    pub fn for_click(operation: PointerOperation) -> Option<Self> {
        match operation {
            PointerOperation::Click => Some(Self::Click { button: 1, repeat: 1 }),
            PointerOperation::DoubleClick => Some(Self::Click { button: 1, repeat: 2 }),
            PointerOperation::RightClick => Some(Self::Click { button: 3, repeat: 1 }),
            PointerOperation::Move | PointerOperation::Locate => None,
        }
    }
}

impl CommandArgs for XdotoolArgs {
    fn program(&self) -> &str {
        XDOTOOL
    }

    fn to_cli_args(&self) -> Vec<String> {
        match self {
            // `--` keeps negative offsets from parsing as flags
            Self::MoveRelative { dx, dy } => vec![
                "mousemove_relative".to_string(),
                "--".to_string(),
                dx.to_string(),
                dy.to_string(),
            ],
            Self::Click { button, repeat } if *repeat > 1 => vec![
                "click".to_string(),
                "--repeat".to_string(),
                repeat.to_string(),
                button.to_string(),
            ],
            Self::Click { button, .. } => vec!["click".to_string(), button.to_string()],
            Self::Locate => vec!["getmouselocation".to_string(), "--shell".to_string()],
        }
    }
}
