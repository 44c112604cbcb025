//! Configuration file handling for the orchestrator.
//!
//! Every field has a default so a partial JSON file (or no file at all)
//! yields a usable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::actions;

/// Connection settings for an OpenAI-compatible model backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    /// Inline API key; prefer `api_key_env`
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub organization: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            organization: None,
            timeout_secs: 60,
        }
    }
}

impl ModelSettings {
    /// Inline key first, then the named environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

/// Orchestrator configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Actions the baseline safety review always blocks
    pub disallowed_actions: Vec<String>,
    /// Command prefixes the shell capability may run
    pub shell_allowed_prefixes: Vec<String>,
    pub command_timeout_secs: u64,
    /// Failures of one step id before it is skipped
    pub max_step_attempts: u32,
    pub fabric_event_limit: usize,
    pub fabric_path: Option<PathBuf>,
    pub blueprint_dir: Option<PathBuf>,
    pub model: Option<ModelSettings>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            disallowed_actions: actions::DEFAULT_DISALLOWED
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shell_allowed_prefixes: vec!["apt".to_string(), "systemctl".to_string()],
            command_timeout_secs: 120,
            max_step_attempts: 3,
            fabric_event_limit: 50,
            fabric_path: None,
            blueprint_dir: None,
            model: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Directory for written blueprints, `$HOME/.ainux/blueprints` by default
    pub fn blueprint_dir(&self) -> PathBuf {
        self.blueprint_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir)
                .join(".ainux")
                .join("blueprints")
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            anyhow::bail!("command_timeout_secs must be greater than zero");
        }
        if self.max_step_attempts == 0 {
            anyhow::bail!("max_step_attempts must be at least 1");
        }
        if self.disallowed_actions.iter().any(|a| a.trim().is_empty()) {
            anyhow::bail!("disallowed_actions must not contain empty entries");
        }
        if self.shell_allowed_prefixes.iter().any(|p| p.trim().is_empty()) {
            anyhow::bail!("shell_allowed_prefixes must not contain empty entries");
        }

        if let Some(model) = &self.model {
            let url = model.base_url.trim();
            if url.is_empty() {
                anyhow::bail!("model.base_url must be specified");
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("model.base_url must be an http(s) URL: {}", url);
            }
            if model.model.trim().is_empty() {
                anyhow::bail!("model.model must be specified");
            }
            if model.timeout_secs == 0 {
                anyhow::bail!("model.timeout_secs must be greater than zero");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.disallowed_actions, vec!["system.shutdown"]);
        assert_eq!(config.max_step_attempts, 3);
        assert_eq!(config.fabric_event_limit, 50);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"command_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.command_timeout_secs, 5);
        assert_eq!(config.shell_allowed_prefixes, vec!["apt", "systemctl"]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ainux.json");

        let mut config = OrchestratorConfig::default();
        config.disallowed_actions.push("process.apply_management".into());
        config.model = Some(ModelSettings::default());
        config.save_to_file(&path).unwrap();

        let loaded = OrchestratorConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = OrchestratorConfig::default();
        config.max_step_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.shell_allowed_prefixes.push("  ".into());
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.model = Some(ModelSettings {
            base_url: "ftp://example.com".into(),
            ..ModelSettings::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inline_api_key_wins() {
        let settings = ModelSettings {
            api_key: Some("sk-inline".into()),
            api_key_env: Some("AINUX_TEST_KEY_THAT_IS_NOT_SET".into()),
            ..ModelSettings::default()
        };
        assert_eq!(settings.resolved_api_key().as_deref(), Some("sk-inline"));

        let settings = ModelSettings {
            api_key: None,
            api_key_env: Some("AINUX_TEST_KEY_THAT_IS_NOT_SET".into()),
            ..ModelSettings::default()
        };
        assert_eq!(settings.resolved_api_key(), None);
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(OrchestratorConfig::load_from_file("/nonexistent/ainux.json").is_err());
    }
}
