//! End-to-end test of the batch runner feeding the analyzer, with a mock
//! provider standing in for the network.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use visprobe::config::EngineSettings;
use visprobe::engine::{BatchConfig, BatchRunner, IterationStatus};
use visprobe::provider::{Citation, LLMError, LLMProvider, LLMRequest, LLMResponse, ProviderKind};
use visprobe::BatchAnalyzer;

/// Replays canned responses in call order; calls listed in `auth_failures`
/// fail with a non-retryable auth error.
struct CannedProvider {
    responses: Vec<(String, Vec<Citation>)>,
    auth_failures: Vec<usize>,
    calls: AtomicUsize,
}

impl CannedProvider {
    fn new(responses: Vec<(String, Vec<Citation>)>, auth_failures: Vec<usize>) -> Self {
        Self {
            responses,
            auth_failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LLMProvider for CannedProvider {
    async fn generate(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.auth_failures.contains(&call) {
            return Err(LLMError::Auth("invalid api key".to_string()));
        }
        let (content, citations) = self.responses[call % self.responses.len()].clone();
        Ok(LLMResponse {
            id: request.id.to_string(),
            provider: ProviderKind::Perplexity,
            model: "sonar".to_string(),
            content,
            finish_reason: Some("stop".to_string()),
            usage: None,
            citations: if citations.is_empty() {
                None
            } else {
                Some(citations)
            },
            created_at: Utc::now(),
            latency: Duration::from_millis(1),
            raw: serde_json::Value::Null,
        })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Perplexity
    }

    fn default_model(&self) -> &str {
        "sonar"
    }

    async fn shutdown(&self) {}
}

fn cite(url: &str) -> Citation {
    Citation {
        title: "source".to_string(),
        url: url.to_string(),
        date: None,
    }
}

#[tokio::test]
async fn batch_runs_and_analyzes_with_partial_failures() {
    let responses = vec![
        (
            "Acme is the leading CRM, ahead of Initech.".to_string(),
            vec![cite("https://reviews.example.com/crm"), cite("https://madeup.biz/top10")],
        ),
        (
            "Initech edges out Acme for small teams.".to_string(),
            vec![cite("https://example.com/comparison")],
        ),
        ("Most analysts recommend Acme.".to_string(), vec![]),
    ];
    // Concurrency 1 keeps the call order equal to the iteration order.
    let provider = Arc::new(CannedProvider::new(responses, vec![2, 7]));

    let runner = BatchRunner::new(EngineSettings::default());
    let config = BatchConfig {
        iterations: 10,
        concurrency: 1,
        ..Default::default()
    };
    let batch = runner
        .run_batch(provider.clone(), "What is the best CRM?", config)
        .await
        .unwrap();

    assert_eq!(batch.total_iterations, 10);
    assert_eq!(batch.successful_iterations, 8);
    assert_eq!(batch.failed_iterations, 2);
    for (i, outcome) in batch.outcomes.iter().enumerate() {
        assert_eq!(outcome.index as usize, i);
    }
    assert_eq!(batch.outcomes[2].status, IterationStatus::AuthError);
    assert_eq!(batch.outcomes[7].status, IterationStatus::AuthError);

    let brands = vec!["Acme".to_string(), "Initech".to_string()];
    let whitelist = vec!["example.com".to_string()];
    let analysis = BatchAnalyzer::new()
        .analyze_batch(&batch, &brands, Some(&whitelist))
        .unwrap();

    assert_eq!(analysis.total_responses, 8);
    let target = analysis.target_visibility.expect("target brand metrics");
    assert_eq!(target.brand, "Acme");
    // Every successful response mentions Acme.
    assert!((target.visibility_rate - 1.0).abs() < 1e-9);
    assert_eq!(analysis.competitor_visibility.len(), 1);
    assert_eq!(analysis.share_of_voice.len(), 2);
    assert_eq!(analysis.share_of_voice[0].rank, 1);

    // Repeated canned texts keep the sample highly self-similar.
    assert!(analysis.consistency.avg_similarity > 40.0);
    assert!(analysis.consistency.pairs_compared > 0);

    let citations = analysis.citations.expect("citation metrics");
    // 8 successes cycle through the 3 canned responses; only madeup.biz
    // is off-whitelist.
    assert!(citations.total_citations > 0);
    assert_eq!(
        citations.invalid_citations,
        citations
            .flagged_urls
            .iter()
            .filter(|u| u.contains("madeup.biz"))
            .count() as u64
    );
    assert!(citations.hallucination_rate > 0.0 && citations.hallucination_rate < 1.0);
}

#[tokio::test]
async fn total_failure_still_yields_a_complete_batch() {
    let provider = Arc::new(CannedProvider::new(
        vec![("unused".to_string(), vec![])],
        (0..4).collect(),
    ));

    let runner = BatchRunner::new(EngineSettings::default());
    let config = BatchConfig {
        iterations: 4,
        concurrency: 2,
        ..Default::default()
    };
    let batch = runner
        .run_batch(provider, "anything", config)
        .await
        .unwrap();

    assert_eq!(batch.total_iterations, 4);
    assert_eq!(batch.successful_iterations, 0);

    let analysis = BatchAnalyzer::new()
        .analyze_batch(&batch, &["Acme".to_string()], None)
        .unwrap();
    assert_eq!(analysis.total_responses, 0);
    assert!(analysis.target_visibility.is_none());
}
