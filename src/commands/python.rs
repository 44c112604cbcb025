//! Python interpreter invocations.

use std::path::PathBuf;

use crate::command_args::CommandArgs;

pub const PYTHON: &str = "python3";

/// Run a script file with arguments
#[derive(Debug, Clone)]
pub struct PythonScriptArgs {
    pub script: PathBuf,
    pub args: Vec<String>,
}

impl CommandArgs for PythonScriptArgs {
    fn program(&self) -> &str {
        PYTHON
    }

    fn to_cli_args(&self) -> Vec<String> {
        std::iter::once(self.script.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())]
    }
}

/// `python3 -c "import <module>"`; exit status tells whether it is importable
#[derive(Debug, Clone)]
pub struct ImportCheckArgs {
    pub module: String,
}

impl CommandArgs for ImportCheckArgs {
    fn program(&self) -> &str {
        PYTHON
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-c".to_string(), format!("import {}", self.module)]
    }
}

/// `python3 -m pip install [--user] <package>`
#[derive(Debug, Clone)]
pub struct PipInstallArgs {
    pub package: String,
    pub user: bool,
}

impl CommandArgs for PipInstallArgs {
    fn program(&self) -> &str {
        PYTHON
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["-m".to_string(), "pip".to_string(), "install".to_string()];
        if self.user {
            args.push("--user".to_string());
        }
        args.push(self.package.clone());
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![("PIP_DISABLE_PIP_VERSION_CHECK".to_string(), "1".to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pip_user_flag_precedes_package() {
        let args = PipInstallArgs {
            package: "pyyaml".into(),
            user: true,
        };
        assert_eq!(args.to_cli_args(), ["-m", "pip", "install", "--user", "pyyaml"]);
    }

    #[test]
    fn test_import_check() {
        let args = ImportCheckArgs { module: "yaml".into() };
        assert_eq!(args.display(), "python3 -c import yaml");
    }
}
