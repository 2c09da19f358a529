//! Command line argument parsing
//!
//! Single-command CLI: run one prompt N times against a provider and print
//! the analysis as pretty JSON. Exists for manual verification of the
//! library; the crate's real surface is the [`crate::engine`] and
//! [`crate::analysis`] APIs.

use crate::provider::ProviderKind;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Openai,
    Anthropic,
    Perplexity,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Openai => ProviderKind::OpenAi,
            ProviderArg::Anthropic => ProviderKind::Anthropic,
            ProviderArg::Perplexity => ProviderKind::Perplexity,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "visprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Probe LLM brand visibility: run one prompt N times and analyze the responses")]
#[command(long_about = None)]
pub struct Args {
    /// The prompt sent on every iteration
    #[arg(short = 'p', long = "prompt")]
    pub prompt: String,

    /// Provider to query
    #[arg(long = "provider", value_enum, default_value = "perplexity")]
    pub provider: ProviderArg,

    /// Model override (defaults to the provider's default model)
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Number of iterations to run
    #[arg(short = 'n', long = "iterations")]
    pub iterations: Option<u32>,

    /// Maximum concurrent requests
    #[arg(short = 'c', long = "concurrency")]
    pub concurrency: Option<u32>,

    /// Sampling temperature
    #[arg(short = 't', long = "temperature")]
    pub temperature: Option<f64>,

    /// Nucleus sampling threshold
    #[arg(long = "top-p")]
    pub top_p: Option<f32>,

    /// Cap on generated tokens per response
    #[arg(long = "max-tokens")]
    pub max_tokens: Option<u64>,

    /// Optional system prompt
    #[arg(long = "system")]
    pub system_prompt: Option<String>,

    /// Target brand to track
    #[arg(short = 'b', long = "brand")]
    pub brand: String,

    /// Competitor brand (can be given multiple times)
    #[arg(long = "competitor", value_name = "BRAND")]
    pub competitors: Vec<String>,

    /// Whitelisted citation domain (can be given multiple times).
    /// Enables citation hallucination metrics.
    #[arg(long = "whitelist", value_name = "DOMAIN")]
    pub whitelist: Vec<String>,

    /// Configuration file path (TOML)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Write the analysis JSON to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Also print the full batch result, not only the analysis
    #[arg(long = "dump-batch")]
    pub dump_batch: bool,
}

impl Args {
    /// All tracked brands, target first. Order matters downstream: share
    /// of voice breaks ties by it.
    pub fn brands(&self) -> Vec<String> {
        let mut brands = Vec::with_capacity(1 + self.competitors.len());
        brands.push(self.brand.clone());
        brands.extend(self.competitors.iter().cloned());
        brands
    }

    pub fn domain_whitelist(&self) -> Option<&[String]> {
        if self.whitelist.is_empty() {
            None
        } else {
            Some(&self.whitelist)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_minimal_invocation() {
        let args = parse(&["visprobe", "--prompt", "best CRM?", "--brand", "Acme"]);
        assert_eq!(args.prompt, "best CRM?");
        assert_eq!(args.brand, "Acme");
        assert_eq!(ProviderKind::from(args.provider), ProviderKind::Perplexity);
        assert!(args.iterations.is_none());
        assert!(args.domain_whitelist().is_none());
    }

    #[test]
    fn test_brands_keep_target_first() {
        let args = parse(&[
            "visprobe",
            "-p",
            "best CRM?",
            "-b",
            "Acme",
            "--competitor",
            "Initech",
            "--competitor",
            "Globex",
        ]);
        assert_eq!(args.brands(), vec!["Acme", "Initech", "Globex"]);
    }

    #[test]
    fn test_provider_and_whitelist() {
        let args = parse(&[
            "visprobe",
            "-p",
            "q",
            "-b",
            "Acme",
            "--provider",
            "anthropic",
            "--whitelist",
            "example.com",
            "--whitelist",
            "acme.com",
            "-n",
            "25",
        ]);
        assert_eq!(ProviderKind::from(args.provider), ProviderKind::Anthropic);
        assert_eq!(args.iterations, Some(25));
        assert_eq!(args.domain_whitelist().unwrap().len(), 2);
    }

    #[test]
    fn test_sampling_overrides_parse() {
        let args = parse(&[
            "visprobe",
            "-p",
            "q",
            "-b",
            "Acme",
            "-t",
            "1.2",
            "--top-p",
            "0.9",
            "--max-tokens",
            "512",
        ]);
        assert_eq!(args.temperature, Some(1.2));
        assert_eq!(args.top_p, Some(0.9));
        assert_eq!(args.max_tokens, Some(512));

        let defaults = parse(&["visprobe", "-p", "q", "-b", "Acme"]);
        assert!(defaults.top_p.is_none());
        assert!(defaults.max_tokens.is_none());
    }

    #[test]
    fn test_missing_brand_is_an_error() {
        assert!(Args::try_parse_from(["visprobe", "--prompt", "q"]).is_err());
    }
}
