use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ainux - natural-language automation orchestrator
#[derive(Parser)]
#[command(name = "ainux")]
#[command(about = "Turn natural-language requests into reviewed, supervised automation runs")]
#[command(version)]
pub struct Cli {
    /// Configuration file (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Dry-run mode: plan and review without executing any step.
    ///
    /// Equivalent to the `plan` command when combined with `run`.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Orchestrate a request end to end
    Run {
        /// Request text, e.g. "optimize memory usage"
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,

        /// JSON object merged into the orchestration context
        #[arg(long)]
        context: Option<PathBuf>,

        /// Context fabric file (overrides `fabric_path` from the config)
        #[arg(long)]
        fabric: Option<PathBuf>,

        /// Print the orchestration result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the plan and safety review for a request without executing it
    Plan {
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,

        #[arg(long)]
        context: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// List registered capabilities
    Capabilities,
    /// Report which external tools the capabilities can use
    Doctor,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

/// Join request words back into one request string
pub fn request_text(words: &[String]) -> String {
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["ainux"]).is_err());
    }

    #[test]
    fn test_cli_run_with_options() {
        let cli = Cli::try_parse_from([
            "ainux",
            "--dry-run",
            "run",
            "open",
            "firefox",
            "--fabric",
            "/tmp/fabric.json",
            "--json",
        ])
        .unwrap();
        assert!(cli.dry_run);
        match cli.command {
            Commands::Run {
                request,
                fabric,
                json,
                context,
            } => {
                assert_eq!(request_text(&request), "open firefox");
                assert_eq!(fabric.unwrap().to_str().unwrap(), "/tmp/fabric.json");
                assert!(json);
                assert!(context.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_run_requires_request() {
        assert!(Cli::try_parse_from(["ainux", "run"]).is_err());
    }

    #[test]
    fn test_cli_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["ainux", "plan", "kill", "process", "--config", "/etc/ainux.json"])
            .unwrap();
        assert_eq!(cli.config.unwrap().to_str().unwrap(), "/etc/ainux.json");
        assert!(matches!(cli.command, Commands::Plan { .. }));
    }

    #[test]
    fn test_cli_validate_command() {
        let cli = Cli::try_parse_from(["ainux", "validate", "/path/to/config.json"]).unwrap();
        match cli.command {
            Commands::Validate { config } => {
                assert_eq!(config.to_str().unwrap(), "/path/to/config.json");
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_cli_simple_commands() {
        assert!(matches!(
            Cli::try_parse_from(["ainux", "capabilities"]).unwrap().command,
            Commands::Capabilities
        ));
        assert!(matches!(
            Cli::try_parse_from(["ainux", "-v", "doctor"]).unwrap().command,
            Commands::Doctor
        ));
    }
}
