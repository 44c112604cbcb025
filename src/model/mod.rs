//! Model client abstraction
//!
//! The orchestrator can consult an optional chat-completion model for intent
//! parsing, planning, safety review and verification. Every such call goes
//! through [`with_model_fallback`]: any [`ModelError`] is logged and replaced
//! by the caller's heuristic, so a broken or absent model never changes the
//! shape of an orchestration call.

pub mod http;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpChatClient;

/// Seeds keep model responses reproducible per component
pub const INTENT_SEED: u64 = 1;
pub const PLAN_SEED: u64 = 2;
pub const SAFETY_SEED: u64 = 3;
pub const REVIEW_SEED: u64 = 4;
pub const VERIFY_SEED: u64 = 6;

/// Model errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Model client is disabled")]
    Disabled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid JSON from model: {0}")]
    InvalidJson(String),

    #[error("Invalid model payload: {0}")]
    InvalidPayload(String),
}

impl ModelError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-request options
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the backend for a single JSON object
    pub json_object: bool,
    pub seed: Option<u64>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
            json_object: false,
            seed: None,
        }
    }
}

impl CompletionOptions {
    pub fn json(seed: u64) -> Self {
        Self {
            json_object: true,
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

impl Usage {
    /// Compact `prompt=.., completion=.., total=..` summary
    pub fn summary(&self) -> String {
        [
            ("prompt", self.prompt_tokens),
            ("completion", self.completion_tokens),
            ("total", self.total_tokens),
        ]
        .iter()
        .filter_map(|(label, value)| value.map(|v| format!("{label}={v}")))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Completion returned by a [`ChatClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<Usage>,
}

/// Chat-completion backend
pub trait ChatClient: Send + Sync {
    fn create_chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatCompletion, ModelError>;
}

/// Run `model_path` when a client is available, otherwise or on failure `heuristic`.
pub fn with_model_fallback<T>(
    client: Option<&dyn ChatClient>,
    component: &str,
    model_path: impl FnOnce(&dyn ChatClient) -> Result<T, ModelError>,
    heuristic: impl FnOnce() -> T,
) -> T {
    let Some(client) = client else {
        return heuristic();
    };
    match model_path(client) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(component, error = %err, "model path failed, using heuristics");
            heuristic()
        }
    }
}

/// Send `payload` under `system_prompt` and parse the reply as a JSON object.
pub fn request_json_object(
    client: &dyn ChatClient,
    system_prompt: &str,
    payload: &Value,
    seed: u64,
) -> Result<serde_json::Map<String, Value>, ModelError> {
    let body = serde_json::to_string(payload)
        .map_err(|e| ModelError::InvalidPayload(format!("unserializable request: {e}")))?;
    let messages = [ChatMessage::system(system_prompt), ChatMessage::user(body)];
    let completion = client.create_chat_completion(&messages, &CompletionOptions::json(seed))?;
    if let Some(usage) = &completion.usage {
        tracing::debug!(seed, usage = %usage.summary(), "model usage");
    }
    match serde_json::from_str::<Value>(completion.content.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ModelError::invalid_payload(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ModelError::InvalidJson(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
