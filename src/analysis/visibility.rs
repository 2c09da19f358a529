//! Brand detection and share-of-voice computation.
//!
//! Brand patterns are case-insensitive literal matches bounded by `\b` only
//! on sides where the brand's own edge character is a word character, so
//! names like "Yahoo!" still match ahead of punctuation. First-mention
//! attribution is a pure two-pass computation: pass one scans every brand
//! against every response, pass two attributes first mentions across brands
//! and produces the final records.

use crate::analysis::types::{AnalysisError, BrandVisibility, ShareOfVoice};
use regex::{Regex, RegexBuilder};
use std::cmp::Reverse;

/// Raw per-brand match data from one scan pass
pub(crate) struct BrandScan {
    pub brand: String,
    pub total_mentions: u64,
    pub responses_with_mention: u64,
    /// First-match byte offset per response, None when the brand is absent.
    pub first_positions: Vec<Option<usize>>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-token pattern for a brand name. The `\b` assertion only holds
/// between word and non-word characters, so it is omitted on sides where
/// the brand itself starts or ends with punctuation.
pub(crate) fn brand_pattern(brand: &str) -> Result<Regex, AnalysisError> {
    let escaped = regex::escape(brand);
    let prefix = if brand.chars().next().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    let suffix = if brand.chars().last().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    RegexBuilder::new(&format!("{}{}{}", prefix, escaped, suffix))
        .case_insensitive(true)
        .build()
        .map_err(|e| AnalysisError::InvalidBrandPattern {
            brand: brand.to_string(),
            message: e.to_string(),
        })
}

/// Pass one: count matches and record first-match byte offsets for one brand.
pub(crate) fn scan_brand(responses: &[&str], brand: &str) -> Result<BrandScan, AnalysisError> {
    let pattern = brand_pattern(brand)?;

    let mut total_mentions = 0u64;
    let mut responses_with_mention = 0u64;
    let mut first_positions = Vec::with_capacity(responses.len());

    for response in responses {
        let mut count = 0u64;
        let mut first = None;
        for found in pattern.find_iter(response) {
            if first.is_none() {
                first = Some(found.start());
            }
            count += 1;
        }
        if count > 0 {
            responses_with_mention += 1;
            total_mentions += count;
        }
        first_positions.push(first);
    }

    Ok(BrandScan {
        brand: brand.to_string(),
        total_mentions,
        responses_with_mention,
        first_positions,
    })
}

/// Pass two: cross-brand first-mention attribution, producing the final
/// immutable visibility records.
pub(crate) fn build_visibility(scans: &[BrandScan], total_responses: usize) -> Vec<BrandVisibility> {
    let mut first_counts = vec![0u64; scans.len()];
    for response_idx in 0..total_responses {
        let mut winner: Option<(usize, usize)> = None;
        for (brand_idx, scan) in scans.iter().enumerate() {
            if let Some(pos) = scan.first_positions[response_idx]
                && winner.is_none_or(|(_, best)| pos < best)
            {
                winner = Some((brand_idx, pos));
            }
        }
        if let Some((brand_idx, _)) = winner {
            first_counts[brand_idx] += 1;
        }
    }

    scans
        .iter()
        .zip(first_counts)
        .map(|(scan, first_count)| {
            let positions: Vec<usize> = scan.first_positions.iter().flatten().copied().collect();
            let avg_first_position = if positions.is_empty() {
                None
            } else {
                Some(positions.iter().sum::<usize>() as f64 / positions.len() as f64)
            };
            BrandVisibility {
                brand: scan.brand.clone(),
                mention_count: scan.total_mentions,
                visibility_rate: if total_responses > 0 {
                    scan.responses_with_mention as f64 / total_responses as f64
                } else {
                    0.0
                },
                avg_mentions_per_response: if scan.responses_with_mention > 0 {
                    scan.total_mentions as f64 / scan.responses_with_mention as f64
                } else {
                    0.0
                },
                first_mention_rate: if total_responses > 0 {
                    first_count as f64 / total_responses as f64
                } else {
                    0.0
                },
                avg_first_position,
            }
        })
        .collect()
}

/// Rank brands by descending raw mention count, ties broken by original
/// list order. Shares are zero when no brand was mentioned at all.
pub(crate) fn share_of_voice(visibility: &[BrandVisibility]) -> Vec<ShareOfVoice> {
    let total_mentions: u64 = visibility.iter().map(|v| v.mention_count).sum();

    let mut order: Vec<usize> = (0..visibility.len()).collect();
    // Stable sort keeps original list order among equal counts.
    order.sort_by_key(|&i| Reverse(visibility[i].mention_count));

    order
        .into_iter()
        .enumerate()
        .map(|(rank, i)| ShareOfVoice {
            brand: visibility[i].brand.clone(),
            share: if total_mentions > 0 {
                visibility[i].mention_count as f64 / total_mentions as f64
            } else {
                0.0
            },
            rank: rank as u32 + 1,
        })
        .collect()
}
