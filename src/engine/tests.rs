use super::*;
use crate::config::EngineSettings;
use crate::provider::{
    LLMError, LLMProvider, LLMRequest, LLMResponse, ProviderKind, RetryPolicy, TokenUsage,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Provider double that replays a scripted sequence of results in call
/// order. The last step repeats once the script is exhausted.
struct ScriptedProvider {
    script: Vec<Result<String, LLMError>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<String, LLMError>>) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn always_ok(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        match &self.script[call.min(self.script.len() - 1)] {
            Ok(text) => Ok(scripted_response(request, text)),
            Err(error) => Err(error.clone()),
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Perplexity
    }

    fn default_model(&self) -> &str {
        "sonar"
    }

    async fn shutdown(&self) {}
}

fn scripted_response(request: &LLMRequest, text: &str) -> LLMResponse {
    LLMResponse {
        id: request.id.to_string(),
        provider: ProviderKind::Perplexity,
        model: "sonar".to_string(),
        content: text.to_string(),
        finish_reason: Some("stop".to_string()),
        usage: Some(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 20,
            total_tokens: 30,
        }),
        citations: None,
        created_at: Utc::now(),
        latency: Duration::from_millis(5),
        raw: serde_json::Value::Null,
    }
}

fn fast_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.engine_retry =
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
    settings
}

fn rate_limited() -> LLMError {
    LLMError::RateLimited {
        message: "slow down".to_string(),
        retry_after: None,
    }
}

#[tokio::test]
async fn batch_has_exactly_one_outcome_per_index() {
    let provider = Arc::new(ScriptedProvider::always_ok("hello"));
    let runner = BatchRunner::new(fast_settings());
    let config = BatchConfig {
        iterations: 7,
        concurrency: 3,
        ..Default::default()
    };

    let batch = runner
        .run_batch(provider, "test prompt", config)
        .await
        .unwrap();

    assert_eq!(batch.outcomes.len(), 7);
    for (i, outcome) in batch.outcomes.iter().enumerate() {
        assert_eq!(outcome.index, i as u32);
        assert_eq!(outcome.status, IterationStatus::Success);
        assert_eq!(outcome.is_success(), outcome.response.is_some());
    }
    assert_eq!(batch.total_iterations, 7);
    assert_eq!(batch.successful_iterations, 7);
    assert_eq!(batch.failed_iterations, 0);
    assert_eq!(batch.total_tokens, 7 * 30);
    assert!(batch.completed_at.is_some());
}

#[tokio::test]
async fn iteration_count_is_validated_before_any_call() {
    let provider = Arc::new(ScriptedProvider::always_ok("hello"));
    let runner = BatchRunner::new(fast_settings());

    let over = BatchConfig {
        iterations: 101,
        ..Default::default()
    };
    let result = runner.run_batch(provider.clone(), "p", over).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let zero = BatchConfig {
        iterations: 0,
        ..Default::default()
    };
    let result = runner.run_batch(provider.clone(), "p", zero).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let no_gate = BatchConfig {
        concurrency: 0,
        ..Default::default()
    };
    let result = runner.run_batch(provider.clone(), "p", no_gate).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    // fail-fast means the provider was never invoked
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn auth_failures_are_contained_per_iteration() {
    // Concurrency of one keeps call order aligned with ordinal index.
    let script: Vec<Result<String, LLMError>> = (0..10)
        .map(|i| {
            if i == 2 || i == 7 {
                Err(LLMError::Auth("bad credentials".to_string()))
            } else {
                Ok(format!("response {}", i))
            }
        })
        .collect();
    let provider = Arc::new(ScriptedProvider::new(script));
    let runner = BatchRunner::new(fast_settings());
    let config = BatchConfig {
        iterations: 10,
        concurrency: 1,
        ..Default::default()
    };

    let batch = runner.run_batch(provider, "prompt", config).await.unwrap();

    assert_eq!(batch.successful_iterations, 8);
    assert_eq!(batch.failed_iterations, 2);
    for outcome in &batch.outcomes {
        if outcome.index == 2 || outcome.index == 7 {
            assert_eq!(outcome.status, IterationStatus::AuthError);
            assert!(outcome.response.is_none());
            assert!(outcome.error_message.is_some());
        } else {
            assert!(outcome.is_success());
        }
    }
    assert_eq!(batch.successful_texts().len(), 8);
}

#[tokio::test]
async fn outer_retry_recovers_after_adapter_budget_exhausted() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(rate_limited()),
        Err(rate_limited()),
        Ok("finally".to_string()),
    ]));
    let runner = BatchRunner::new(fast_settings());
    let config = BatchConfig {
        iterations: 1,
        concurrency: 1,
        ..Default::default()
    };

    let batch = runner
        .run_batch(provider.clone(), "prompt", config)
        .await
        .unwrap();

    let outcome = &batch.outcomes[0];
    assert_eq!(outcome.status, IterationStatus::Success);
    assert_eq!(outcome.retry_count, 2);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn persistent_rate_limit_records_rate_limited_outcome() {
    let provider = Arc::new(ScriptedProvider::new(vec![Err(rate_limited())]));
    let runner = BatchRunner::new(fast_settings());
    let config = BatchConfig {
        iterations: 1,
        concurrency: 1,
        ..Default::default()
    };

    let batch = runner
        .run_batch(provider.clone(), "prompt", config)
        .await
        .unwrap();

    let outcome = &batch.outcomes[0];
    assert_eq!(outcome.status, IterationStatus::RateLimited);
    // 3 outer attempts total, so 2 retries were taken
    assert_eq!(outcome.retry_count, 2);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn zero_successes_still_returns_a_batch_result() {
    let provider = Arc::new(ScriptedProvider::new(vec![Err(LLMError::Auth(
        "revoked key".to_string(),
    ))]));
    let runner = BatchRunner::new(fast_settings());
    let config = BatchConfig {
        iterations: 4,
        concurrency: 2,
        ..Default::default()
    };

    let batch = runner.run_batch(provider, "prompt", config).await.unwrap();

    assert_eq!(batch.successful_iterations, 0);
    assert_eq!(batch.failed_iterations, 4);
    assert_eq!(batch.success_rate(), 0.0);
    assert!(batch.successful_texts().is_empty());
}

#[tokio::test]
async fn never_failing_provider_takes_zero_retries() {
    let provider = Arc::new(ScriptedProvider::always_ok("stable"));
    let runner = BatchRunner::new(fast_settings());
    let config = BatchConfig {
        iterations: 5,
        concurrency: 5,
        ..Default::default()
    };

    let batch = runner
        .run_batch(provider.clone(), "prompt", config)
        .await
        .unwrap();

    assert!(batch.outcomes.iter().all(|o| o.retry_count == 0));
    assert_eq!(provider.call_count(), 5);
}

#[tokio::test]
async fn progress_notifications_cover_every_iteration() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("a".to_string()),
        Err(LLMError::Auth("nope".to_string())),
        Ok("c".to_string()),
    ]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = BatchRunner::new(fast_settings()).with_progress(tx);
    let config = BatchConfig {
        iterations: 3,
        concurrency: 1,
        ..Default::default()
    };

    let batch = runner.run_batch(provider, "prompt", config).await.unwrap();
    assert_eq!(batch.successful_iterations, 2);

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    assert_eq!(updates.len(), 3);
    let last = updates.last().unwrap();
    assert_eq!(last.completed, 3);
    assert_eq!(last.total, 3);
    assert_eq!(last.succeeded + last.failed, 3);
    assert!(updates.iter().all(|u| u.batch_id == batch.batch_id));
}

#[tokio::test]
async fn dropped_progress_receiver_never_fails_the_batch() {
    let provider = Arc::new(ScriptedProvider::always_ok("fine"));
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let runner = BatchRunner::new(fast_settings()).with_progress(tx);
    let config = BatchConfig {
        iterations: 3,
        concurrency: 3,
        ..Default::default()
    };

    let batch = runner.run_batch(provider, "prompt", config).await.unwrap();
    assert_eq!(batch.successful_iterations, 3);
}

#[tokio::test]
async fn batch_ceiling_marks_unresolved_iterations_as_timeout() {
    let provider =
        Arc::new(ScriptedProvider::always_ok("slow").with_delay(Duration::from_millis(500)));
    let mut settings = fast_settings();
    settings.batch_timeout = Some(Duration::from_millis(50));
    let runner = BatchRunner::new(settings);
    let config = BatchConfig {
        iterations: 3,
        concurrency: 3,
        ..Default::default()
    };

    let started = std::time::Instant::now();
    let batch = runner.run_batch(provider, "prompt", config).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(batch.outcomes.len(), 3);
    assert!(
        batch
            .outcomes
            .iter()
            .all(|o| o.status == IterationStatus::Timeout)
    );
    assert_eq!(batch.successful_iterations, 0);
}

#[tokio::test]
async fn outcomes_stay_in_index_order_despite_completion_order() {
    // First call is the slowest, so index 0 completes last.
    let provider = Arc::new(
        ScriptedProvider::new(vec![
            Ok("first".to_string()),
            Ok("rest".to_string()),
        ])
        .with_delay(Duration::from_millis(10)),
    );
    let runner = BatchRunner::new(fast_settings());
    let config = BatchConfig {
        iterations: 6,
        concurrency: 6,
        ..Default::default()
    };

    let batch = runner.run_batch(provider, "prompt", config).await.unwrap();

    let indices: Vec<u32> = batch.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
}
