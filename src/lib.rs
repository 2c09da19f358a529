//! # visprobe
//!
//! A probabilistic batch-execution and analysis engine for measuring brand
//! visibility in LLM responses. One prompt is issued N times against a
//! provider, responses are collected under bounded concurrency, and the
//! resulting sample is analyzed statistically.
//!
//! ## Architecture Overview
//!
//! The crate is organized into a small number of modules:
//!
//! - **[`provider`]**: Adapters for OpenAI, Anthropic and Perplexity behind a
//!   single [`provider::LLMProvider`] trait, with shared retry and error
//!   taxonomy
//! - **[`engine`]**: Bounded-concurrency batch runner that always returns
//!   exactly one outcome per requested iteration
//! - **[`analysis`]**: Brand visibility, share of voice, response consistency
//!   and citation hallucination metrics over a completed batch
//! - **[`config`]**: TOML settings with environment variable fallback for
//!   API keys
//! - **[`cli`]**: Argument parsing for the companion `visprobe` binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use visprobe::config::EngineSettings;
//! use visprobe::engine::{BatchConfig, BatchRunner};
//! use visprobe::provider::{ProviderFactory, ProviderKind};
//! use visprobe::BatchAnalyzer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = EngineSettings::load(None)?;
//!     let provider = ProviderFactory::create(ProviderKind::Perplexity, &settings, None)?;
//!
//!     let runner = BatchRunner::new(settings);
//!     let batch = runner
//!         .run_batch(provider.clone(), "What is the best CRM?", BatchConfig::default())
//!         .await?;
//!     provider.shutdown().await;
//!
//!     let brands = vec!["Acme".to_string(), "Initech".to_string()];
//!     let analysis = BatchAnalyzer::new().analyze_batch(&batch, &brands, None)?;
//!     println!("{}", serde_json::to_string_pretty(&analysis)?);
//!     Ok(())
//! }
//! ```

/// Provider adapters and the shared LLM abstraction.
///
/// Normalized request/response types, the [`provider::LLMProvider`] trait,
/// per-provider wire formats, and retry with exponential backoff.
pub mod provider;

/// Batch execution engine.
///
/// Runs N iterations of one prompt under a concurrency limit, contains
/// per-iteration failures, and reassembles outcomes in ordinal order.
pub mod engine;

/// Statistical analysis over completed batches.
///
/// Brand visibility and first-mention attribution, share of voice,
/// sampled pairwise consistency, and citation validation.
pub mod analysis;

/// Engine settings: TOML file plus environment variable API keys.
pub mod config;

/// Argument parsing for the `visprobe` binary.
pub mod cli;

pub use analysis::{AnalysisError, AnalysisResult, BatchAnalyzer};
pub use config::EngineSettings;
pub use engine::{BatchConfig, BatchResult, BatchRunner, EngineError};
pub use provider::{LLMError, LLMProvider, LLMRequest, LLMResponse, ProviderFactory, ProviderKind};
