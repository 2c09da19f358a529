//! Citation validation against a trusted-domain whitelist.
//!
//! A citation host is valid when it exactly equals, or is a strict
//! subdomain of, a whitelisted domain. Comparison is case-insensitive;
//! scheme-less URLs are tolerated.

use crate::analysis::types::CitationMetrics;
use url::Url;

/// Cap on flagged URLs retained for inspection.
const MAX_FLAGGED_URLS: usize = 20;

/// Host portion of a citation URL, lowercased; None when unparseable.
pub(crate) fn extract_host(raw: &str) -> Option<String> {
    let parsed = match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{}", raw)).ok()
        }
        Err(_) => None,
    }?;
    parsed.host_str().map(|h| h.to_lowercase())
}

fn host_allowed(host: &str, whitelist: &[String]) -> bool {
    whitelist
        .iter()
        .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)))
}

/// Validate every citation URL against the whitelist.
pub(crate) fn compute<'a, I>(urls: I, domain_whitelist: &[String]) -> CitationMetrics
where
    I: IntoIterator<Item = &'a str>,
{
    let whitelist: Vec<String> = domain_whitelist
        .iter()
        .map(|d| d.trim().to_lowercase())
        .collect();

    let mut total = 0u64;
    let mut valid = 0u64;
    let mut flagged = Vec::new();

    for url in urls {
        if url.is_empty() {
            continue;
        }
        total += 1;

        let is_valid = extract_host(url)
            .map(|host| host_allowed(&host, &whitelist))
            .unwrap_or(false);

        if is_valid {
            valid += 1;
        } else if flagged.len() < MAX_FLAGGED_URLS {
            flagged.push(url.to_string());
        }
    }

    let invalid = total - valid;
    CitationMetrics {
        total_citations: total,
        valid_citations: valid,
        invalid_citations: invalid,
        hallucination_rate: if total > 0 {
            invalid as f64 / total as f64
        } else {
            0.0
        },
        flagged_urls: flagged,
    }
}
