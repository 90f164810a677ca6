//! Chat-completion client for an OpenAI-compatible endpoint.
//!
//! The agent talks to models through the [`ChatModel`] trait; the
//! production implementation is [`OpenAiChatClient`], which calls
//! `POST {base_url}/chat/completions` and returns the first choice.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, … (capped at 2^5 seconds)
//!
//! Failures surface as [`LlmError`] inside `anyhow::Error`, so callers can
//! tell an unreachable model apart from their own bugs.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// Key used when the configured environment variable is unset; local
/// OpenAI-compatible servers usually ignore it.
const FALLBACK_API_KEY: &str = "dummy";

/// Failures talking to the model server.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("LLM connection error (is the model server running at {base_url}?): {source}")]
    Connection {
        base_url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid chat response: {0}")]
    InvalidResponse(String),
}

/// One message of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// A language model that answers a chat transcript.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the assistant reply for `messages`.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// [`ChatModel`] backed by an OpenAI-compatible HTTP API.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key =
            std::env::var(&config.api_key_env).unwrap_or_else(|_| FALLBACK_API_KEY.to_string());
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });
        let url = self.endpoint();

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying chat completion");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
                        return Ok(parse_chat_response(&json)?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = LlmError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    };
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, "chat completion failed, will retry");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err.into());
                }
                Err(e) => {
                    warn!(error = %e, "chat completion request failed");
                    last_err = Some(LlmError::Connection {
                        base_url: self.config.base_url.clone(),
                        source: e,
                    });
                    continue;
                }
            }
        }

        match last_err {
            Some(err) => Err(err.into()),
            None => bail!("Chat completion failed after retries"),
        }
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, LlmError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            LlmError::InvalidResponse("missing choices[0].message.content".to_string())
        })
}
