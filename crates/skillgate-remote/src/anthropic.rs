//! Content generation through the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skillgate_core::{ContentGenerator, Result};
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::http::build_client;

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";
pub const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_url: String,
}

impl AnthropicConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// `ANTHROPIC_API_KEY` plus optional `SKILLGATE_MODEL`. `None` when no
    /// key is set, which leaves generation and repair unavailable.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Option<Self> {
        let key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty())?;
        let mut config = Self::new(key.trim());
        if let Some(model) = lookup("SKILLGATE_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        Some(config)
    }
}

pub struct AnthropicGenerator {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicGenerator {
    pub fn new(config: AnthropicConfig, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            config,
            client: build_client(timeout)?,
        })
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        })
    }

    async fn complete(&self, prompt: &str) -> RemoteResult<String> {
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "generation request");
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: self.config.api_url.clone(),
                status: status.as_u16(),
            });
        }
        let body: Value = response.json().await?;
        extract_text(&body)
    }
}

/// Text of the first content block in a Messages API response.
pub fn extract_text(body: &Value) -> RemoteResult<String> {
    body.pointer("/content/0/text")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_string())
        .ok_or_else(|| RemoteError::Decode("no text in first content block".to_string()))
}

#[async_trait]
impl ContentGenerator for AnthropicGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(self.complete(prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_needs_key() {
        assert!(AnthropicConfig::from_lookup(|_| None).is_none());
        assert!(AnthropicConfig::from_lookup(|_| Some("  ".to_string())).is_none());

        let cfg = AnthropicConfig::from_lookup(|k| match k {
            "ANTHROPIC_API_KEY" => Some("sk-test".to_string()),
            "SKILLGATE_MODEL" => Some("claude-haiku-4-5".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.model, "claude-haiku-4-5");
        assert_eq!(cfg.max_tokens, 4096);
    }

    #[test]
    fn test_request_body_shape() {
        let g = AnthropicGenerator::new(AnthropicConfig::new("k"), Duration::from_secs(5)).unwrap();
        let body = g.request_body("write it");
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "write it");
    }

    #[test]
    fn test_extract_text() {
        let body = json!({"content": [{"type": "text", "text": "\n---\nname: x\n"}]});
        assert_eq!(extract_text(&body).unwrap(), "---\nname: x");
        assert!(matches!(
            extract_text(&json!({"content": []})),
            Err(RemoteError::Decode(_))
        ));
    }
}
