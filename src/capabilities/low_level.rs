//! Compile-and-run for low-level sources
//!
//! Each language maps to a build recipe producing something executable:
//!
//! | language   | build                         | run               |
//! |------------|-------------------------------|-------------------|
//! | `c`        | `cc`                          | binary            |
//! | `assembly` | `as` then `ld`                | binary            |
//! | `machine`  | hex decoded into an ELF file  | binary            |
//! | `python`   | none                          | `python3 script`  |
//! | `shell`    | none                          | `bash script`     |
//!
//! Launchers synthesized by the planner start a desktop program, so they
//! are spawned detached. Operator-supplied source runs to completion with
//! its output captured.

use nix::errno::Errno;
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::actions;
use crate::capability::{Capability, CapabilityError, CapabilityResult};
use crate::command_args::CommandArgs;
use crate::command_runner::{self, LaunchState};
use crate::commands::ProgramArgs;
use crate::commands::python::PythonScriptArgs;
use crate::commands::toolchain::{AsArgs, CcArgs, LdArgs};
use crate::models::{Context, ExecutionResult, Parameters, PlanStep, text_param};
use crate::planner::low_level as synthesis;
use crate::types::CodeLanguage;

static WORKDIR_SEQ: AtomicU64 = AtomicU64::new(0);

/// How long a launcher is watched for an immediate failure
const LAUNCH_SETTLE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct LowLevelExecution {
    timeout: Duration,
    work_root: PathBuf,
}

impl LowLevelExecution {
    pub fn new(timeout: Duration) -> Self {
        Self::with_work_root(timeout, std::env::temp_dir())
    }

    pub fn with_work_root(timeout: Duration, work_root: PathBuf) -> Self {
        Self { timeout, work_root }
    }

    fn workdir(&self, step_id: &str) -> std::io::Result<PathBuf> {
        let safe: String = step_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let dir = self.work_root.join(format!(
            "ainux-{}-{}-{}",
            std::process::id(),
            safe,
            WORKDIR_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Build `source`; `Err` carries the failing build step's result.
    fn build(
        &self,
        step_id: &str,
        language: CodeLanguage,
        source: &str,
        args: Vec<String>,
        dir: &Path,
    ) -> Result<Result<Box<dyn CommandArgs>, ExecutionResult>, CapabilityError> {
        let binary = dir.join("launcher");
        let built: Box<dyn CommandArgs> = match language {
            CodeLanguage::C => {
                let src = dir.join("launcher.c");
                fs::write(&src, source)?;
                let cc = CcArgs {
                    source: src,
                    output: binary.clone(),
                };
                if let Some(failed) = self.build_step(step_id, &cc) {
                    return Ok(Err(failed));
                }
                Box::new(program(&binary, args))
            }
            CodeLanguage::Assembly => {
                let src = dir.join("launcher.s");
                let object = dir.join("launcher.o");
                fs::write(&src, source)?;
                let assemble = AsArgs {
                    source: src,
                    object: object.clone(),
                };
                if let Some(failed) = self.build_step(step_id, &assemble) {
                    return Ok(Err(failed));
                }
                let link = LdArgs {
                    object,
                    output: binary.clone(),
                };
                if let Some(failed) = self.build_step(step_id, &link) {
                    return Ok(Err(failed));
                }
                Box::new(program(&binary, args))
            }
            CodeLanguage::Machine => {
                let image = synthesis::decode_hex(source)
                    .ok_or_else(|| CapabilityError::invalid("source", "machine code must be hex bytes"))?;
                fs::write(&binary, image)?;
                fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))?;
                Box::new(program(&binary, args))
            }
            CodeLanguage::Python => {
                let script = dir.join("main.py");
                fs::write(&script, source)?;
                Box::new(PythonScriptArgs { script, args })
            }
            CodeLanguage::Shell => {
                let script = dir.join("main.sh");
                fs::write(&script, source)?;
                let argv = std::iter::once(script.display().to_string()).chain(args);
                Box::new(ProgramArgs::new("bash", argv))
            }
        };
        Ok(Ok(built))
    }

    fn build_step<T: CommandArgs>(&self, step_id: &str, args: &T) -> Option<ExecutionResult> {
        let result = super::run_for_step(step_id, args, self.timeout);
        result.is_failure().then(|| {
            tracing::warn!(step = step_id, tool = args.program(), "low-level build step failed");
            result
        })
    }
}

fn program(binary: &Path, args: Vec<String>) -> ProgramArgs {
    ProgramArgs::new(binary.display().to_string(), args)
}

fn source_text(params: &Parameters) -> Option<&str> {
    text_param(params, "source").or_else(|| text_param(params, "code"))
}

fn launch_target(params: &Parameters) -> Option<&str> {
    params
        .get(synthesis::METADATA_KEY)
        .and_then(|meta| meta.get("target"))
        .and_then(|target| target.get("executable"))
        .and_then(Value::as_str)
}

fn launch_result(step_id: &str, language: CodeLanguage, params: &Parameters, state: LaunchState) -> ExecutionResult {
    let target = launch_target(params).unwrap_or("target");
    match state {
        LaunchState::Running { pid } => ExecutionResult::success(
            step_id,
            format!("Started {} launcher for {} (pid {})", language, target, pid),
        ),
        LaunchState::Exited { code: Some(0), .. } => ExecutionResult::success(
            step_id,
            format!("{} launcher for {} ran to completion", language, target),
        ),
        // launchers exit with the errno of the failed exec
        LaunchState::Exited { code: Some(code), .. } => ExecutionResult::error(
            step_id,
            format!(
                "{} launcher for {} exited with code {}: {}",
                language,
                target,
                code,
                Errno::from_raw(code).desc()
            ),
        ),
        LaunchState::Exited { code: None, .. } => ExecutionResult::error(
            step_id,
            format!("{} launcher for {} was terminated by a signal", language, target),
        ),
    }
}

fn is_synthesized(params: &Parameters) -> bool {
    params
        .get(synthesis::METADATA_KEY)
        .and_then(|meta| meta.get("synthesized_source"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

impl Capability for LowLevelExecution {
    fn name(&self) -> &str {
        actions::EXECUTE_LOW_LEVEL
    }

    fn execute(&self, step: &PlanStep, _context: &Context) -> CapabilityResult {
        let params = &step.parameters;
        let Some(source) = source_text(params) else {
            return Err(CapabilityError::missing("source"));
        };
        let language = match text_param(params, "language") {
            Some(lang) => lang.parse::<CodeLanguage>().map_err(|_| {
                CapabilityError::invalid("language", format!("unsupported language '{}'", lang))
            })?,
            None => CodeLanguage::default(),
        };
        let synthesized = is_synthesized(params);
        // synthesized launchers already embed their argv
        let args = if synthesized {
            Vec::new()
        } else {
            synthesis::arg_list(params.get("args"))
        };

        let dir = self.workdir(&step.id)?;
        let outcome = self
            .build(&step.id, language, source, args, &dir)
            .and_then(|built| match built {
                Err(failed) => Ok(failed),
                Ok(runnable) if synthesized => {
                    let state = command_runner::launch_detached(runnable.as_ref(), LAUNCH_SETTLE)?;
                    Ok(launch_result(&step.id, language, params, state))
                }
                Ok(runnable) => Ok(super::run_for_step(&step.id, runnable.as_ref(), self.timeout)),
            });

        if let Err(e) = fs::remove_dir_all(&dir) {
            tracing::debug!(dir = %dir.display(), error = %e, "could not remove work directory");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn run(params: Value) -> (CapabilityResult, TempDir) {
        let root = TempDir::new().unwrap();
        let cap = LowLevelExecution::with_work_root(Duration::from_secs(20), root.path().to_path_buf());
        let step = PlanStep::new("execute_low_level", actions::EXECUTE_LOW_LEVEL, "")
            .with_parameters(params.as_object().cloned().unwrap_or_default());
        (cap.execute(&step, &Context::new()), root)
    }

    #[test]
    fn test_shell_source_runs_with_args() {
        let (result, root) = run(json!({
            "language": "bash",
            "source": "echo \"hello $1\"",
            "args": ["world"]
        }));
        let result = result.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output.as_deref(), Some("hello world"));
        // work directory is cleaned up
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failing_script_reports_stderr() {
        let (result, _root) = run(json!({"language": "sh", "code": "echo nope >&2; exit 4"}));
        let result = result.unwrap();
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("nope"));
    }

    #[test]
    fn test_missing_source() {
        let (result, _root) = run(json!({"language": "c"}));
        assert_eq!(result.unwrap_err().to_string(), "Missing source");
    }

    #[test]
    fn test_bad_hex_is_invalid() {
        let (result, _root) = run(json!({"language": "machine", "source": "zz"}));
        assert!(matches!(result, Err(CapabilityError::InvalidParameter { .. })));
    }

    #[test]
    fn test_unknown_language() {
        let (result, _root) = run(json!({"language": "cobol", "source": "x"}));
        assert!(result.unwrap_err().to_string().contains("unsupported language 'cobol'"));
    }

    fn launcher_params(source: &str) -> Value {
        json!({
            "language": "shell",
            "source": source,
            "_low_level": {
                "synthesized_source": true,
                "target": {"executable": "/opt/ainux-missing-tool", "args": []}
            }
        })
    }

    #[test]
    fn test_launcher_immediate_failure_is_an_error() {
        let (result, _root) = run(launcher_params("exit 2"));
        let result = result.unwrap();
        assert_eq!(result.status, ExecutionStatus::Error);
        let error = result.error.unwrap();
        assert!(error.contains("/opt/ainux-missing-tool"), "{}", error);
        assert!(error.contains("exited with code 2: No such file or directory"), "{}", error);
    }

    #[test]
    fn test_running_launcher_is_success() {
        let (result, _root) = run(launcher_params("sleep 2"));
        let result = result.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert!(result.output.unwrap().contains("(pid "));
    }

    #[test]
    fn test_synthesized_flag_detection() {
        let prepared = synthesis::prepare_parameters(
            &json!({"target": "/bin/true", "language": "c"}).as_object().cloned().unwrap(),
            "",
        );
        assert!(is_synthesized(&prepared));
        assert!(!is_synthesized(&Parameters::new()));
    }
}
