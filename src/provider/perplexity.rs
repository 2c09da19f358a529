//! Perplexity adapter.
//!
//! Sonar models return web-grounded completions with a `search_results`
//! array, which this adapter surfaces as normalized [`Citation`]s for the
//! citation-validity analysis.

use crate::provider::adapter::LLMProvider;
use crate::provider::http::{HttpCore, with_backoff};
use crate::provider::types::{
    Citation, LLMError, LLMRequest, LLMResponse, ProviderKind, RetryPolicy, TokenUsage,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar";
const COMPLETIONS_PATH: &str = "/chat/completions";

pub struct PerplexityAdapter {
    core: HttpCore,
    model: String,
    retry: RetryPolicy,
}

impl PerplexityAdapter {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        base_url: Option<&str>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, LLMError> {
        if api_key.is_empty() {
            return Err(LLMError::Auth("Perplexity API key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| LLMError::Auth(format!("invalid Perplexity API key: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
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
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut payload = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = serde_json::json!(top_p);
        }
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = serde_json::json!(max_tokens);
        }
        payload
    }

    pub(crate) fn parse_response(
        &self,
        raw: serde_json::Value,
        latency: Duration,
    ) -> Result<LLMResponse, LLMError> {
        let choice = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::Provider {
                status: None,
                message: "no choices in Perplexity response".to_string(),
            })?;

        let content = choice
            .pointer("/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let finish_reason = choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let usage = raw.get("usage").map(|u| TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        });

        let citations = raw
            .get("search_results")
            .and_then(|v| v.as_array())
            .map(|results| {
                results
                    .iter()
                    .map(|sr| Citation {
                        title: sr
                            .get("title")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        url: sr
                            .get("url")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        date: sr.get("date").and_then(|v| v.as_str()).map(str::to_string),
                    })
                    .collect::<Vec<_>>()
            });

        Ok(LLMResponse {
            id: raw
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            provider: ProviderKind::Perplexity,
            model: raw
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or(&self.model)
                .to_string(),
            content,
            finish_reason,
            usage,
            citations,
            created_at: Utc::now(),
            latency,
            raw,
        })
    }
}

#[async_trait]
impl LLMProvider for PerplexityAdapter {
    async fn generate(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        let payload = self.build_payload(request);
        let started = Instant::now();
        let raw = with_backoff(&self.retry, "perplexity", || {
            self.core.post_json(COMPLETIONS_PATH, &payload)
        })
        .await?;
        self.parse_response(raw, started.elapsed())
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Perplexity
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn shutdown(&self) {
        self.core.shutdown().await;
    }
}
