//! OpenAI-compatible chat completions over blocking HTTP.

use serde_json::{Value, json};
use std::time::Duration;

use super::{ChatClient, ChatCompletion, ChatMessage, CompletionOptions, ModelError, Usage};
use crate::config_file::ModelSettings;

/// Real model client using HTTP
pub struct HttpChatClient {
    settings: ModelSettings,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpChatClient {
    pub fn new(settings: ModelSettings) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        let api_key = settings.resolved_api_key();

        Ok(Self {
            settings,
            api_key,
            client,
        })
    }

    /// `{base_url}/chat/completions` unless the base already names the endpoint
    fn endpoint(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn request_body(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": options.temperature,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if options.json_object {
            body["response_format"] = json!({"type": "json_object"});
        }
        if let Some(seed) = options.seed {
            body["seed"] = json!(seed);
        }
        body
    }
}

impl ChatClient for HttpChatClient {
    fn create_chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatCompletion, ModelError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(messages, options));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        if let Some(org) = &self.settings.organization {
            request = request.header("OpenAI-Organization", org);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(self.settings.timeout_secs)
            } else {
                ModelError::Transport(format!("Failed to reach provider: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ModelError::Transport(format!(
                "Provider returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let data: Value = response
            .json()
            .map_err(|e| ModelError::InvalidJson(format!("Unable to parse response: {}", e)))?;
        parse_completion(&data)
    }
}

/// Extract the first choice from a chat-completions response body
pub(crate) fn parse_completion(data: &Value) -> Result<ChatCompletion, ModelError> {
    let first = data
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| {
            ModelError::invalid_payload("Model response did not contain any choices")
        })?;

    let content = first
        .pointer("/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let usage = data
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

    Ok(ChatCompletion { content, usage })
}
