//! Shared HTTP plumbing for provider adapters.
//!
//! Every adapter owns one [`HttpCore`]: a lazily-created `reqwest::Client`
//! scoped to the adapter's lifetime, released deterministically via
//! [`HttpCore::shutdown`]. The client is cloned out of the lock so multiple
//! in-flight iterations can share it safely.

use crate::provider::types::{LLMError, RetryPolicy};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub(crate) struct HttpCore {
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    client: Mutex<Option<Client>>,
}

impl HttpCore {
    pub(crate) fn new(base_url: impl Into<String>, headers: HeaderMap, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            headers,
            timeout,
            client: Mutex::new(None),
        }
    }

    /// Get or create the HTTP client.
    async fn client(&self) -> Result<Client, LLMError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers.clone())
            .build()
            .map_err(|e| LLMError::Network(format!("failed to build HTTP client: {}", e)))?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Drop the HTTP client, releasing its connection pool.
    pub(crate) async fn shutdown(&self) {
        let mut guard = self.client.lock().await;
        *guard = None;
    }

    /// POST a JSON body and interpret the status code into the typed
    /// error taxonomy. Returns the raw JSON payload on 2xx.
    pub(crate) async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, LLMError> {
        let client = self.client().await?;
        let url = format!("{}{}", self.base_url, path);

        let response = match client.post(&url).json(body).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(LLMError::Timeout(e.to_string()));
            }
            Err(e) => {
                return Err(LLMError::Network(e.to_string()));
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok())
                .map(Duration::from_secs_f64);
            return Err(LLMError::RateLimited {
                message: format!("rate limit exceeded at {}", url),
                retry_after,
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::Auth(text));
        }

        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::Server {
                status: status.as_u16(),
                message: text,
            });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::Provider {
                status: Some(status.as_u16()),
                message: text,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| LLMError::Provider {
                status: None,
                message: format!("malformed response body: {}", e),
            })
    }
}

/// Run `op` with exponential backoff on retryable errors.
///
/// Rate-limit errors honor the upstream `Retry-After` hint when one was
/// given; all other retryable errors follow the policy's doubling schedule.
/// Non-retryable errors surface immediately.
pub(crate) async fn with_backoff<F, Fut>(
    policy: &RetryPolicy,
    provider: &str,
    op: F,
) -> Result<serde_json::Value, LLMError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<serde_json::Value, LLMError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(provider, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = match &error {
                    LLMError::RateLimited {
                        retry_after: Some(hint),
                        ..
                    } => (*hint).min(policy.max_delay),
                    _ => policy.delay_for(attempt),
                };
                warn!(
                    provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retryable provider error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
