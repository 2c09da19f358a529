//! OpenAI adapter built on the Responses API.
//!
//! The system prompt maps to the top-level `instructions` field; remaining
//! messages become typed `input` items. Assistant text is reassembled from
//! the `output_text` blocks of the response's `output` array.

use crate::provider::adapter::LLMProvider;
use crate::provider::http::{HttpCore, with_backoff};
use crate::provider::types::{
    LLMError, LLMRequest, LLMResponse, MessageRole, ProviderKind, RetryPolicy, TokenUsage,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const RESPONSES_PATH: &str = "/responses";

pub struct OpenAiAdapter {
    core: HttpCore,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiAdapter {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        base_url: Option<&str>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, LLMError> {
        if api_key.is_empty() {
            return Err(LLMError::Auth("OpenAI API key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| LLMError::Auth(format!("invalid OpenAI API key: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            core: HttpCore::new(base_url.unwrap_or(DEFAULT_BASE_URL), headers, timeout),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            retry,
        })
    }

    fn build_payload(&self, request: &LLMRequest) -> serde_json::Value {
        let input: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                serde_json::json!({
                    "type": "message",
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut payload = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "input": input,
            "stream": false,
        });
        if let Some(instructions) = request.system_prompt() {
            payload["instructions"] = serde_json::json!(instructions);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = serde_json::json!(top_p);
        }
        if let Some(max_tokens) = request.max_tokens {
            payload["max_output_tokens"] = serde_json::json!(max_tokens);
        }
        payload
    }

    pub(crate) fn parse_response(
        &self,
        raw: serde_json::Value,
        latency: Duration,
    ) -> Result<LLMResponse, LLMError> {
        let output = raw
            .get("output")
            .and_then(|v| v.as_array())
            .filter(|items| !items.is_empty())
            .ok_or_else(|| LLMError::Provider {
                status: None,
                message: "no output items in OpenAI response".to_string(),
            })?;

        let mut content = String::new();
        let mut finish_reason = None;
        for item in output {
            let is_assistant_message = item.get("type").and_then(|v| v.as_str()) == Some("message")
                && item.get("role").and_then(|v| v.as_str()) == Some("assistant");
            if !is_assistant_message {
                continue;
            }
            if let Some(blocks) = item.get("content").and_then(|v| v.as_array()) {
                for block in blocks {
                    if block.get("type").and_then(|v| v.as_str()) == Some("output_text") {
                        content.push_str(block.get("text").and_then(|v| v.as_str()).unwrap_or(""));
                    }
                }
            }
            finish_reason = item.get("status").and_then(|v| v.as_str()).map(str::to_string);
        }

        let usage = raw.get("usage").map(|u| TokenUsage {
            prompt_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            completion_tokens: u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        });

        Ok(LLMResponse {
            id: raw
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            provider: ProviderKind::OpenAi,
            model: raw
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or(&self.model)
                .to_string(),
            content,
            finish_reason,
            usage,
            citations: None,
            created_at: Utc::now(),
            latency,
            raw,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAiAdapter {
    async fn generate(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        let payload = self.build_payload(request);
        let started = Instant::now();
        let raw = with_backoff(&self.retry, "openai", || {
            self.core.post_json(RESPONSES_PATH, &payload)
        })
        .await?;
        self.parse_response(raw, started.elapsed())
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn shutdown(&self) {
        self.core.shutdown().await;
    }
}
