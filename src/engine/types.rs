use crate::provider::{LLMResponse, ProviderKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Configuration for one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of independent invocations of the prompt.
    pub iterations: u32,
    /// Bounded-admission limit on concurrently in-flight requests.
    pub concurrency: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u64>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            concurrency: 10,
            temperature: 0.7,
            top_p: None,
            max_tokens: None,
            model: None,
            system_prompt: None,
        }
    }
}

/// Final status of a single iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Success,
    Failed,
    RateLimited,
    AuthError,
    Timeout,
}

/// Result of one single-prompt invocation.
///
/// Immutable once produced. `response` is present exactly when `status`
/// is [`IterationStatus::Success`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationOutcome {
    /// 0-based ordinal index within the batch.
    pub index: u32,
    pub status: IterationStatus,
    pub response: Option<LLMResponse>,
    /// Measured around the retried invocation, including backoff delays.
    pub latency: Duration,
    pub error_message: Option<String>,
    /// Outer (runner-level) retries taken before this outcome settled.
    pub retry_count: u32,
}

impl IterationOutcome {
    pub fn success(index: u32, response: LLMResponse, latency: Duration, retry_count: u32) -> Self {
        Self {
            index,
            status: IterationStatus::Success,
            response: Some(response),
            latency,
            error_message: None,
            retry_count,
        }
    }

    pub fn failure(
        index: u32,
        status: IterationStatus,
        message: impl Into<String>,
        latency: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            index,
            status,
            response: None,
            latency,
            error_message: Some(message.into()),
            retry_count,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == IterationStatus::Success
    }
}

/// Aggregate outcome of one batch run.
///
/// Outcomes are ordered by ordinal index regardless of completion order,
/// with exactly one entry per requested iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub provider: ProviderKind,
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub config: BatchConfig,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration: Duration,
    pub outcomes: Vec<IterationOutcome>,
    pub total_iterations: u32,
    pub successful_iterations: u32,
    pub failed_iterations: u32,
    pub total_tokens: u64,
}

impl BatchResult {
    pub fn new(
        provider: ProviderKind,
        model: impl Into<String>,
        prompt: impl Into<String>,
        config: &BatchConfig,
    ) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            provider,
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: config.system_prompt.clone(),
            config: config.clone(),
            started_at: Utc::now(),
            completed_at: None,
            total_duration: Duration::ZERO,
            outcomes: Vec::new(),
            total_iterations: config.iterations,
            successful_iterations: 0,
            failed_iterations: 0,
            total_tokens: 0,
        }
    }

    /// Recompute the derived counts from the outcome collection and stamp
    /// the completion time.
    pub fn finalize(&mut self) {
        self.total_iterations = self.outcomes.len() as u32;
        self.successful_iterations = self.outcomes.iter().filter(|o| o.is_success()).count() as u32;
        self.failed_iterations = self.total_iterations - self.successful_iterations;
        self.total_tokens = self
            .outcomes
            .iter()
            .filter_map(|o| o.response.as_ref())
            .filter_map(|r| r.usage)
            .map(|u| u.total_tokens)
            .sum();
        self.completed_at = Some(Utc::now());
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_iterations == 0 {
            return 0.0;
        }
        self.successful_iterations as f64 / self.total_iterations as f64
    }

    /// Texts of the successful responses, in index order.
    pub fn successful_texts(&self) -> Vec<&str> {
        self.successful_responses()
            .map(|r| r.content.as_str())
            .collect()
    }

    /// Successful response payloads, in index order.
    pub fn successful_responses(&self) -> impl Iterator<Item = &LLMResponse> {
        self.outcomes.iter().filter_map(|o| o.response.as_ref())
    }
}

/// Best-effort progress notification emitted after each completed iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: Uuid,
    pub completed: u32,
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub last_succeeded: bool,
}

/// Errors surfaced by the execution engine before any work begins.
/// Per-iteration failures never surface here; they are contained as
/// failed outcomes inside the [`BatchResult`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("invalid batch configuration: {0}")]
    Validation(String),
}
