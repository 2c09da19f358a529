//! The statistical analysis engine.
//!
//! Consumes a finalized [`BatchResult`] and derives brand visibility,
//! share of voice, response consistency, and (when citations and a domain
//! whitelist are available) citation-validity metrics. CPU-bound and
//! synchronous; no suspension points.

use crate::analysis::citations;
use crate::analysis::consistency;
use crate::analysis::types::{
    AnalysisError, AnalysisResult, BrandVisibility, CitationMetrics, ConsistencyMetrics,
    ShareOfVoice,
};
use crate::analysis::visibility::{self, BrandScan};
use crate::engine::BatchResult;
use serde_json::json;
use tracing::{debug, warn};

pub struct BatchAnalyzer;

impl BatchAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Compute the full analysis over the successful responses of `batch`.
    ///
    /// `target_brands` is ordered: the first entry is the primary target,
    /// the rest are competitors. A batch with zero successes yields the
    /// documented sentinel result rather than an error.
    pub fn analyze_batch(
        &self,
        batch: &BatchResult,
        target_brands: &[String],
        domain_whitelist: Option<&[String]>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let responses = batch.successful_texts();
        let total_responses = responses.len();

        if total_responses == 0 {
            warn!(
                batch_id = %batch.batch_id,
                failed = batch.failed_iterations,
                "batch has zero successful responses, returning sentinel analysis"
            );
            return Ok(Self::empty_result(batch));
        }

        debug!(
            batch_id = %batch.batch_id,
            responses = total_responses,
            brands = target_brands.len(),
            "analyzing batch"
        );

        let scans: Vec<BrandScan> = target_brands
            .iter()
            .map(|brand| visibility::scan_brand(&responses, brand))
            .collect::<Result<_, _>>()?;
        let mut all_visibility = visibility::build_visibility(&scans, total_responses);
        let share_of_voice = visibility::share_of_voice(&all_visibility);

        let consistency = consistency::compute(&responses);

        let citation_metrics = domain_whitelist.map(|whitelist| {
            let urls = batch
                .successful_responses()
                .filter_map(|r| r.citations.as_ref())
                .flatten()
                .map(|c| c.url.as_str());
            citations::compute(urls, whitelist)
        });

        let competitor_visibility = if all_visibility.is_empty() {
            Vec::new()
        } else {
            all_visibility.split_off(1)
        };
        let target_visibility = all_visibility.into_iter().next();

        let raw_metrics = Self::build_raw_metrics(
            total_responses as u64,
            target_visibility.as_ref(),
            &competitor_visibility,
            &share_of_voice,
            &consistency,
            citation_metrics.as_ref(),
        );

        Ok(AnalysisResult {
            batch_id: batch.batch_id,
            provider: batch.provider,
            model: batch.model.clone(),
            total_responses: total_responses as u64,
            target_visibility,
            competitor_visibility,
            share_of_voice,
            consistency,
            citations: citation_metrics,
            raw_metrics,
        })
    }

    fn empty_result(batch: &BatchResult) -> AnalysisResult {
        AnalysisResult {
            batch_id: batch.batch_id,
            provider: batch.provider,
            model: batch.model.clone(),
            total_responses: 0,
            target_visibility: None,
            competitor_visibility: Vec::new(),
            share_of_voice: Vec::new(),
            consistency: ConsistencyMetrics::empty(),
            citations: None,
            raw_metrics: json!({
                "total_responses": 0,
                "error": "no successful responses",
            }),
        }
    }

    /// Flatten all metrics into one JSON object for storage.
    fn build_raw_metrics(
        total_responses: u64,
        target: Option<&BrandVisibility>,
        competitors: &[BrandVisibility],
        share_of_voice: &[ShareOfVoice],
        consistency: &ConsistencyMetrics,
        citations: Option<&CitationMetrics>,
    ) -> serde_json::Value {
        let mut metrics = json!({
            "total_responses": total_responses,
            "consistency": consistency,
        });

        if let Some(target) = target {
            metrics["target_visibility"] = json!(target);
        }
        if !competitors.is_empty() {
            metrics["competitor_visibility"] = json!(competitors);
        }
        if !share_of_voice.is_empty() {
            metrics["share_of_voice"] = json!(share_of_voice);
        }
        if let Some(citations) = citations {
            metrics["citations"] = json!(citations);
        }

        metrics
    }
}

impl Default for BatchAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
