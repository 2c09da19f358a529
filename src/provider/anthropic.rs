//! Anthropic Messages API adapter.
//!
//! The system prompt is a top-level `system` field rather than a message,
//! `max_tokens` is mandatory, and assistant text comes back as an array of
//! content blocks.

use crate::provider::adapter::LLMProvider;
use crate::provider::http::{HttpCore, with_backoff};
use crate::provider::types::{
    LLMError, LLMRequest, LLMResponse, MessageRole, ProviderKind, RetryPolicy, TokenUsage,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const MESSAGES_PATH: &str = "/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u64 = 1024;

pub struct AnthropicAdapter {
    core: HttpCore,
    model: String,
    retry: RetryPolicy,
}

impl AnthropicAdapter {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        base_url: Option<&str>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, LLMError> {
        if api_key.is_empty() {
            return Err(LLMError::Auth("Anthropic API key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|e| LLMError::Auth(format!("invalid Anthropic API key: {}", e)))?;
        headers.insert(HeaderName::from_static("x-api-key"), key);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            core: HttpCore::new(base_url.unwrap_or(DEFAULT_BASE_URL), headers, timeout),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            retry,
        })
    }

    fn build_payload(&self, request: &LLMRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut payload = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(system) = request.system_prompt() {
            payload["system"] = serde_json::json!(system);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = serde_json::json!(top_p);
        }
        payload
    }

    pub(crate) fn parse_response(
        &self,
        raw: serde_json::Value,
        latency: Duration,
    ) -> Result<LLMResponse, LLMError> {
        let blocks = raw
            .get("content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| LLMError::Provider {
                status: None,
                message: "no content blocks in Anthropic response".to_string(),
            })?;

        let mut content = String::new();
        for block in blocks {
            if block.get("type").and_then(|v| v.as_str()) == Some("text") {
                content.push_str(block.get("text").and_then(|v| v.as_str()).unwrap_or(""));
            }
        }

        let usage = raw.get("usage").map(|u| {
            let input = u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            let output = u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            TokenUsage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
            }
        });

        Ok(LLMResponse {
            id: raw
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            provider: ProviderKind::Anthropic,
            model: raw
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or(&self.model)
                .to_string(),
            content,
            finish_reason: raw
                .get("stop_reason")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            usage,
            citations: None,
            created_at: Utc::now(),
            latency,
            raw,
        })
    }
}

#[async_trait]
impl LLMProvider for AnthropicAdapter {
    async fn generate(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        let payload = self.build_payload(request);
        let started = Instant::now();
        let raw = with_backoff(&self.retry, "anthropic", || {
            self.core.post_json(MESSAGES_PATH, &payload)
        })
        .await?;
        self.parse_response(raw, started.elapsed())
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn shutdown(&self) {
        self.core.shutdown().await;
    }
}
