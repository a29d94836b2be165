//! Live model backend handles.
//!
//! A `ResolvedBackend` is an owned, per-request handle bound to one
//! registry entry. All supported platforms speak the OpenAI-compatible
//! chat-completions protocol; Groq and Ollama differ only in base URL and
//! credential requirements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::llm::registry::ModelSpec;

/// One role-tagged message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Boundary to a language-model backend. The pipeline only ever sees this
/// trait, so stages are testable with scripted responses.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a message sequence and return the response text.
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Registry name of the model behind this handle.
    fn model_name(&self) -> &str;
}

/// A backend handle bound to one model spec.
#[derive(Debug)]
pub struct ResolvedBackend {
    client: reqwest::Client,
    spec: &'static ModelSpec,
    api_key: Option<String>,
    base_url: String,
    temperature: f64,
}

impl ResolvedBackend {
    pub(crate) fn new(
        spec: &'static ModelSpec,
        api_key: Option<String>,
        base_url: String,
        temperature: f64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            spec,
            api_key,
            base_url,
            temperature,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.spec.name,
            "messages": messages,
            "temperature": self.temperature,
        });

        // Reasoning models burn tokens on internal reasoning before the
        // visible completion, so they get a larger budget. Newer OpenAI
        // models take max_completion_tokens, older ones max_tokens.
        if self.spec.name.starts_with("o1") {
            body["max_completion_tokens"] = serde_json::json!(4000);
        } else if self.spec.name.starts_with("gpt-4") {
            body["max_completion_tokens"] = serde_json::json!(1500);
        } else {
            body["max_tokens"] = serde_json::json!(1500);
        }

        body
    }
}

#[async_trait]
impl ChatBackend for ResolvedBackend {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = self.request_body(messages);

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            EngineError::BackendInvoke(format!("request to '{}' failed: {}", self.spec.name, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EngineError::BackendInvoke(format!(
                "'{}' returned {}: {}",
                self.spec.name, status, error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            EngineError::BackendInvoke(format!("failed to decode response body: {}", e))
        })?;

        if let Some(error) = response_json.get("error") {
            return Err(EngineError::BackendInvoke(format!(
                "'{}' returned an error payload: {}",
                self.spec.name, error
            )));
        }

        let choices = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                EngineError::BackendInvoke("no choices array in backend response".to_string())
            })?;
        let first = choices.first().ok_or_else(|| {
            EngineError::BackendInvoke("empty choices array in backend response".to_string())
        })?;

        match first.get("finish_reason").and_then(|r| r.as_str()) {
            Some("length") => warn!(model = self.spec.name, "response truncated by token limit"),
            Some("content_filter") => {
                return Err(EngineError::BackendInvoke(
                    "response was filtered by content policy".to_string(),
                ))
            }
            _ => {}
        }

        let content = first["message"]["content"].as_str().ok_or_else(|| {
            EngineError::BackendInvoke("no content in backend response".to_string())
        })?;
        if content.is_empty() {
            return Err(EngineError::BackendInvoke(
                "empty content in backend response".to_string(),
            ));
        }

        Ok(content.to_string())
    }

    fn model_name(&self) -> &str {
        self.spec.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::registry;

    #[test]
    fn reasoning_models_use_completion_token_budget() {
        let backend = ResolvedBackend::new(
            registry::spec("o1-mini").unwrap(),
            Some("test-key".to_string()),
            "http://localhost".to_string(),
            1.0,
        );
        let body = backend.request_body(&[ChatMessage::user("hi")]);
        assert!(body.get("max_completion_tokens").is_some());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["max_completion_tokens"], 4000);
    }

    #[test]
    fn groq_models_use_max_tokens() {
        let backend = ResolvedBackend::new(
            registry::spec("llama-3.1-8b-instant").unwrap(),
            Some("test-key".to_string()),
            "http://localhost".to_string(),
            0.0,
        );
        let body = backend.request_body(&[ChatMessage::user("hi")]);
        assert!(body.get("max_tokens").is_some());
        assert!(body.get("max_completion_tokens").is_none());
    }
}
