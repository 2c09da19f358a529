//! Pairwise response-similarity statistics.
//!
//! Similarity is a normalized edit-distance ratio on the 0-100 scale. The
//! number of unordered pairs grows quadratically, so batches above
//! [`MAX_PAIR_COMPARISONS`] pairs are uniformly sampled instead of compared
//! exhaustively. Pair indices are sampled directly and decoded from the
//! triangular enumeration, so the full pair list is never materialized.

use crate::analysis::types::ConsistencyMetrics;
use similar::TextDiff;

/// Ceiling on pairwise comparisons per batch.
pub(crate) const MAX_PAIR_COMPARISONS: usize = 1000;

fn similarity(a: &str, b: &str) -> f64 {
    TextDiff::from_chars(a, b).ratio() as f64 * 100.0
}

/// Decode the k-th unordered pair of the row-major triangular enumeration
/// over n items: (0,1), (0,2), .., (0,n-1), (1,2), ..
fn pair_from_index(mut k: usize, n: usize) -> (usize, usize) {
    let mut i = 0;
    let mut row = n - 1;
    while k >= row {
        k -= row;
        i += 1;
        row -= 1;
    }
    (i, i + 1 + k)
}

/// The unordered pairs to compare for n responses: exhaustive below the
/// ceiling, a uniform random sample of exactly the ceiling above it.
pub(crate) fn pair_sample(n: usize) -> Vec<(usize, usize)> {
    if n < 2 {
        return Vec::new();
    }
    let total_pairs = n * (n - 1) / 2;
    if total_pairs <= MAX_PAIR_COMPARISONS {
        (0..total_pairs).map(|k| pair_from_index(k, n)).collect()
    } else {
        let mut rng = rand::rng();
        rand::seq::index::sample(&mut rng, total_pairs, MAX_PAIR_COMPARISONS)
            .into_iter()
            .map(|k| pair_from_index(k, n))
            .collect()
    }
}

/// Sample standard deviation with Bessel's correction.
pub(crate) fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Consistency statistics over a batch's successful response texts.
/// Fewer than two responses are defined as maximally consistent.
pub(crate) fn compute(responses: &[&str]) -> ConsistencyMetrics {
    if responses.len() < 2 {
        return ConsistencyMetrics::maximal();
    }

    let pairs = pair_sample(responses.len());
    let similarities: Vec<f64> = pairs
        .iter()
        .map(|&(i, j)| similarity(responses[i], responses[j]))
        .collect();

    let avg = similarities.iter().sum::<f64>() / similarities.len() as f64;
    let min = similarities.iter().copied().fold(f64::INFINITY, f64::min);
    let max = similarities
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    ConsistencyMetrics {
        avg_similarity: avg,
        min_similarity: min,
        max_similarity: max,
        std_deviation: sample_std_dev(&similarities, avg),
        consistency_score: avg / 100.0,
        pairs_compared: similarities.len() as u64,
    }
}
