//! Compiler, assembler and linker invocations for low-level launchers.

use std::path::PathBuf;

use crate::command_args::CommandArgs;

/// `cc -O2 -o <output> <source>`
#[derive(Debug, Clone)]
pub struct CcArgs {
    pub source: PathBuf,
    pub output: PathBuf,
}

impl CommandArgs for CcArgs {
    fn program(&self) -> &str {
        "cc"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-O2".to_string(),
            "-o".to_string(),
            self.output.display().to_string(),
            self.source.display().to_string(),
        ]
    }
}

/// `as --64 -o <object> <source>`
#[derive(Debug, Clone)]
pub struct AsArgs {
    pub source: PathBuf,
    pub object: PathBuf,
}

impl CommandArgs for AsArgs {
    fn program(&self) -> &str {
        "as"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "--64".to_string(),
            "-o".to_string(),
            self.object.display().to_string(),
            self.source.display().to_string(),
        ]
    }
}

/// `ld -o <output> <object>`; the launcher defines `_start` itself
#[derive(Debug, Clone)]
pub struct LdArgs {
    pub object: PathBuf,
    pub output: PathBuf,
}

impl CommandArgs for LdArgs {
    fn program(&self) -> &str {
        "ld"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            self.output.display().to_string(),
            self.object.display().to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cc_output_before_source() {
        let args = CcArgs {
            source: PathBuf::from("/tmp/l.c"),
            output: PathBuf::from("/tmp/l"),
        };
        assert_eq!(args.to_cli_args(), ["-O2", "-o", "/tmp/l", "/tmp/l.c"]);
    }

    #[test]
    fn test_assemble_then_link() {
        let asm = AsArgs {
            source: PathBuf::from("l.s"),
            object: PathBuf::from("l.o"),
        };
        let ld = LdArgs {
            object: PathBuf::from("l.o"),
            output: PathBuf::from("l"),
        };
        assert_eq!(asm.display(), "as --64 -o l.o l.s");
        assert_eq!(ld.display(), "ld -o l l.o");
    }
}
