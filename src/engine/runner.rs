//! The probabilistic execution engine.
//!
//! [`BatchRunner`] issues the same prompt N times against one provider
//! adapter under a bounded-admission semaphore, contains every per-iteration
//! failure as a typed outcome, and reassembles the results into ordinal
//! order. One auth failure or timeout never aborts sibling iterations; a
//! batch with zero successes is still a well-formed [`BatchResult`].

use crate::config::EngineSettings;
use crate::engine::types::{
    BatchConfig, BatchProgress, BatchResult, EngineError, IterationOutcome, IterationStatus,
};
use crate::provider::{LLMError, LLMProvider, LLMRequest, LLMResponse, RetryPolicy};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct BatchRunner {
    settings: EngineSettings,
    progress: Option<mpsc::UnboundedSender<BatchProgress>>,
}

#[derive(Default)]
struct Tally {
    completed: AtomicU32,
    succeeded: AtomicU32,
    failed: AtomicU32,
}

impl BatchRunner {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            progress: None,
        }
    }

    /// Attach a progress sink. Delivery is best effort: a dropped receiver
    /// is logged and never fails the batch.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<BatchProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Run `config.iterations` independent invocations of `prompt` against
    /// `provider` and assemble a complete [`BatchResult`], even when some
    /// or all iterations fail.
    pub async fn run_batch(
        &self,
        provider: Arc<dyn LLMProvider>,
        prompt: &str,
        config: BatchConfig,
    ) -> Result<BatchResult, EngineError> {
        if config.iterations == 0 {
            return Err(EngineError::Validation(
                "iterations must be at least 1".to_string(),
            ));
        }
        if config.iterations > self.settings.max_iterations {
            return Err(EngineError::Validation(format!(
                "iterations ({}) exceeds maximum allowed ({})",
                config.iterations, self.settings.max_iterations
            )));
        }
        if config.concurrency == 0 {
            return Err(EngineError::Validation(
                "concurrency must be at least 1".to_string(),
            ));
        }

        // One normalized request shared by every iteration; each task
        // stamps a fresh request id.
        let mut request = LLMRequest::simple(prompt, config.system_prompt.as_deref());
        request.model = config.model.clone();
        request.temperature = Some(config.temperature);
        request.top_p = config.top_p;
        request.max_tokens = config.max_tokens;
        let request = Arc::new(request);

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());
        let mut batch = BatchResult::new(provider.kind(), model, prompt, &config);
        let batch_id = batch.batch_id;
        let total = config.iterations;

        info!(%batch_id, provider = %batch.provider, iterations = total, concurrency = config.concurrency, "starting batch");

        let semaphore = Arc::new(Semaphore::new(config.concurrency as usize));
        let tally = Arc::new(Tally::default());
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for index in 0..total {
            tasks.spawn(run_iteration(
                provider.clone(),
                request.clone(),
                index,
                batch_id,
                total,
                semaphore.clone(),
                tally.clone(),
                self.progress.clone(),
                self.settings.engine_retry.clone(),
            ));
        }

        let deadline = self
            .settings
            .batch_timeout
            .map(|d| tokio::time::Instant::now() + d);
        let mut slots: Vec<Option<IterationOutcome>> =
            std::iter::repeat_with(|| None).take(total as usize).collect();
        let mut deadline_hit = false;

        loop {
            let joined = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(%batch_id, "batch wall-clock ceiling reached, aborting in-flight iterations");
                        deadline_hit = true;
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            match joined {
                Some(Ok((index, outcome))) => slots[index as usize] = Some(outcome),
                Some(Err(join_error)) => {
                    // A panicking or aborted task leaves its slot empty;
                    // the fill pass below converts it to a failed outcome.
                    error!(%batch_id, %join_error, "iteration task aborted");
                }
                None => break,
            }
        }

        let elapsed = started.elapsed();
        batch.outcomes = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let (status, message) = if deadline_hit {
                        (
                            IterationStatus::Timeout,
                            "batch wall-clock ceiling reached",
                        )
                    } else {
                        (
                            IterationStatus::Failed,
                            "iteration task did not produce an outcome",
                        )
                    };
                    IterationOutcome::failure(index as u32, status, message, elapsed, 0)
                })
            })
            .collect();
        batch.total_duration = elapsed;
        batch.finalize();

        info!(
            %batch_id,
            successful = batch.successful_iterations,
            failed = batch.failed_iterations,
            duration_ms = batch.total_duration.as_millis() as u64,
            "batch completed"
        );

        Ok(batch)
    }
}

/// One iteration: admitted by the semaphore, invoked with outer rate-limit
/// retry, and always resolved to an outcome.
#[allow(clippy::too_many_arguments)]
async fn run_iteration(
    provider: Arc<dyn LLMProvider>,
    base: Arc<LLMRequest>,
    index: u32,
    batch_id: Uuid,
    total: u32,
    semaphore: Arc<Semaphore>,
    tally: Arc<Tally>,
    progress: Option<mpsc::UnboundedSender<BatchProgress>>,
    retry: RetryPolicy,
) -> (u32, IterationOutcome) {
    let permit = match semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return (
                index,
                IterationOutcome::failure(
                    index,
                    IterationStatus::Failed,
                    "admission gate closed",
                    std::time::Duration::ZERO,
                    0,
                ),
            );
        }
    };

    let mut request = (*base).clone();
    request.id = Uuid::new_v4();

    // Latency spans the retried invocation, including backoff delays.
    let started = Instant::now();
    let (result, retry_count) = invoke_with_retry(provider.as_ref(), &request, &retry).await;
    let latency = started.elapsed();
    drop(permit);

    let outcome = match result {
        Ok(response) => IterationOutcome::success(index, response, latency, retry_count),
        Err(err) => {
            let status = status_for(&err);
            match status {
                IterationStatus::AuthError => {
                    error!(%batch_id, iteration = index, %err, "iteration auth error")
                }
                _ => warn!(%batch_id, iteration = index, %err, "iteration failed"),
            }
            IterationOutcome::failure(index, status, err.to_string(), latency, retry_count)
        }
    };

    let completed = tally.completed.fetch_add(1, Ordering::SeqCst) + 1;
    let (succeeded, failed) = if outcome.is_success() {
        (
            tally.succeeded.fetch_add(1, Ordering::SeqCst) + 1,
            tally.failed.load(Ordering::SeqCst),
        )
    } else {
        (
            tally.succeeded.load(Ordering::SeqCst),
            tally.failed.fetch_add(1, Ordering::SeqCst) + 1,
        )
    };

    if let Some(sender) = &progress {
        let update = BatchProgress {
            batch_id,
            completed,
            total,
            succeeded,
            failed,
            last_succeeded: outcome.is_success(),
        };
        if sender.send(update).is_err() {
            warn!(%batch_id, iteration = index, "progress sink dropped, notification skipped");
        }
    }

    (index, outcome)
}

/// Outer retry on rate limits only, independent of the adapter's internal
/// backoff. Catches the case where the adapter's retry budget was exhausted
/// while the upstream limit was still in force. Returns the number of
/// retries taken alongside the final result.
async fn invoke_with_retry(
    provider: &dyn LLMProvider,
    request: &LLMRequest,
    policy: &RetryPolicy,
) -> (Result<LLMResponse, LLMError>, u32) {
    let mut attempt = 0u32;
    loop {
        match provider.generate(request).await {
            Ok(response) => return (Ok(response), attempt),
            Err(err @ LLMError::RateLimited { .. }) if attempt + 1 < policy.max_attempts => {
                let delay = match &err {
                    LLMError::RateLimited {
                        retry_after: Some(hint),
                        ..
                    } => (*hint).min(policy.max_delay),
                    _ => policy.delay_for(attempt),
                };
                warn!(
                    request_id = %request.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited after adapter retries, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}

fn status_for(error: &LLMError) -> IterationStatus {
    match error {
        LLMError::RateLimited { .. } => IterationStatus::RateLimited,
        LLMError::Auth(_) => IterationStatus::AuthError,
        LLMError::Timeout(_) => IterationStatus::Timeout,
        LLMError::Server { .. } | LLMError::Network(_) | LLMError::Provider { .. } => {
            IterationStatus::Failed
        }
    }
}
