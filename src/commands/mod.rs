//! Typed invocations for the external tools capabilities drive.
//!
//! Each struct maps its fields to the exact argument layout of one program.
//! [`ProgramArgs`] is the untyped escape hatch for commands that arrive as
//! an argument vector (allow-listed shell commands, launched applications,
//! freshly built launchers).

pub mod desktop;
pub mod python;
pub mod system;
pub mod toolchain;

use crate::command_args::CommandArgs;

/// Program plus arguments, passed through unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramArgs {
    pub program: String,
    pub args: Vec<String>,
}

impl ProgramArgs {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// First element is the program; `None` for an empty vector
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }
}

impl CommandArgs for ProgramArgs {
    fn program(&self) -> &str {
        &self.program
    }

    fn to_cli_args(&self) -> Vec<String> {
        self.args.clone()
    }
}
