use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visibility metrics for a single brand across a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandVisibility {
    pub brand: String,
    /// Total mentions across all analyzed responses.
    pub mention_count: u64,
    /// Fraction of analyzed responses that mention the brand, in [0, 1].
    pub visibility_rate: f64,
    /// Mean mentions over the responses that mention the brand at all.
    pub avg_mentions_per_response: f64,
    /// Fraction of responses in which this brand is mentioned before every
    /// other analyzed brand.
    pub first_mention_rate: f64,
    /// Mean byte offset of the first mention, None when never mentioned.
    pub avg_first_position: Option<f64>,
}

/// One brand's slice of the cross-brand mention total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareOfVoice {
    pub brand: String,
    /// Proportion of total cross-brand mentions, in [0, 1].
    pub share: f64,
    /// 1-based contiguous rank by descending mention count.
    pub rank: u32,
}

/// Pairwise response-similarity statistics on the 0-100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyMetrics {
    pub avg_similarity: f64,
    pub min_similarity: f64,
    pub max_similarity: f64,
    /// Sample standard deviation (Bessel-corrected).
    pub std_deviation: f64,
    /// avg_similarity normalized to [0, 1].
    pub consistency_score: f64,
    /// Unordered pairs actually compared (sampled above the ceiling).
    pub pairs_compared: u64,
}

impl ConsistencyMetrics {
    /// Fewer than two responses are trivially consistent.
    pub fn maximal() -> Self {
        Self {
            avg_similarity: 100.0,
            min_similarity: 100.0,
            max_similarity: 100.0,
            std_deviation: 0.0,
            consistency_score: 1.0,
            pairs_compared: 0,
        }
    }

    pub fn empty() -> Self {
        Self {
            avg_similarity: 0.0,
            min_similarity: 0.0,
            max_similarity: 0.0,
            std_deviation: 0.0,
            consistency_score: 0.0,
            pairs_compared: 0,
        }
    }
}

/// Citation-validity metrics against a trusted-domain whitelist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationMetrics {
    pub total_citations: u64,
    pub valid_citations: u64,
    pub invalid_citations: u64,
    /// Proportion of citations whose host is not whitelisted, in [0, 1].
    pub hallucination_rate: f64,
    /// Sample of flagged URLs, capped for storage.
    pub flagged_urls: Vec<String>,
}

/// Derived statistics over one [`crate::engine::BatchResult`].
///
/// Computed once, immutable afterwards. When zero responses succeeded all
/// metrics are zeroed and `raw_metrics` carries an explanatory marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub batch_id: Uuid,
    pub provider: ProviderKind,
    pub model: String,
    /// Number of successful responses the metrics were computed over.
    pub total_responses: u64,
    pub target_visibility: Option<BrandVisibility>,
    pub competitor_visibility: Vec<BrandVisibility>,
    pub share_of_voice: Vec<ShareOfVoice>,
    pub consistency: ConsistencyMetrics,
    pub citations: Option<CitationMetrics>,
    /// Flattened metrics map suitable for storage by the calling layer.
    pub raw_metrics: serde_json::Value,
}

/// Errors from the analysis pipeline
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid brand pattern for '{brand}': {message}")]
    InvalidBrandPattern { brand: String, message: String },
}
