//! Engine settings and credential resolution.
//!
//! Settings load from a TOML file with API keys overlaid from the
//! environment (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `PERPLEXITY_API_KEY`),
//! falling back to built-in defaults when no file is given.

use crate::provider::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(String),
    #[error("invalid settings file: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Iterations used when the caller does not specify a count.
    pub default_iterations: u32,
    /// Hard ceiling on iterations per batch; validated before any network call.
    pub max_iterations: u32,
    /// Concurrency used when the caller does not specify a limit.
    pub default_concurrency: u32,
    /// Timeout for one HTTP round trip, decoupled from the batch budget.
    pub request_timeout: Duration,
    /// Optional wall-clock ceiling on a whole batch. Unresolved iterations
    /// become timeout outcomes once it elapses.
    pub batch_timeout: Option<Duration>,
    /// Backoff policy applied inside provider adapters.
    pub provider_retry: RetryPolicy,
    /// Outer rate-limit backoff applied per iteration by the runner.
    pub engine_retry: RetryPolicy,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub perplexity_base_url: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_iterations: 10,
            max_iterations: 100,
            default_concurrency: 10,
            request_timeout: Duration::from_secs(60),
            batch_timeout: None,
            provider_retry: RetryPolicy::default(),
            engine_retry: RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(60)),
            openai_api_key: None,
            anthropic_api_key: None,
            perplexity_api_key: None,
            openai_base_url: None,
            anthropic_base_url: None,
            perplexity_base_url: None,
        }
    }
}

impl EngineSettings {
    /// Load from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save to a TOML file.
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Overlay API keys from the environment. File-provided keys win so a
    /// settings file can pin credentials explicitly.
    pub fn with_env_keys(mut self) -> Self {
        if self.openai_api_key.is_none() {
            self.openai_api_key = env_key("OPENAI_API_KEY");
        }
        if self.anthropic_api_key.is_none() {
            self.anthropic_api_key = env_key("ANTHROPIC_API_KEY");
        }
        if self.perplexity_api_key.is_none() {
            self.perplexity_api_key = env_key("PERPLEXITY_API_KEY");
        }
        self
    }

    /// Load settings from an optional file path, then overlay env keys.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading settings file");
                Self::from_toml_file(path)?
            }
            None => Self::default(),
        };
        Ok(settings.with_env_keys())
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_are_sane() {
        let settings = EngineSettings::default();
        assert_eq!(settings.default_iterations, 10);
        assert_eq!(settings.max_iterations, 100);
        assert_eq!(settings.default_concurrency, 10);
        assert!(settings.batch_timeout.is_none());
        assert_eq!(settings.engine_retry.max_attempts, 3);
        assert_eq!(settings.provider_retry.max_attempts, 5);
    }

    #[test]
    fn toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visprobe.toml");

        let mut settings = EngineSettings::default();
        settings.max_iterations = 50;
        settings.perplexity_api_key = Some("pplx-test".to_string());
        settings.batch_timeout = Some(Duration::from_secs(300));
        settings.to_toml_file(&path).unwrap();

        let loaded = EngineSettings::from_toml_file(&path).unwrap();
        assert_eq!(loaded.max_iterations, 50);
        assert_eq!(loaded.perplexity_api_key.as_deref(), Some("pplx-test"));
        assert_eq!(loaded.batch_timeout, Some(Duration::from_secs(300)));
        assert_eq!(loaded.default_iterations, 10);
    }

    #[test]
    #[serial]
    fn env_keys_fill_missing_credentials() {
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "sk-env");
        }
        let settings = EngineSettings::default().with_env_keys();
        assert_eq!(settings.openai_api_key.as_deref(), Some("sk-env"));
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
    }

    #[test]
    #[serial]
    fn file_keys_take_precedence_over_env() {
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "sk-env");
        }
        let mut settings = EngineSettings::default();
        settings.openai_api_key = Some("sk-file".to_string());
        let settings = settings.with_env_keys();
        assert_eq!(settings.openai_api_key.as_deref(), Some("sk-file"));
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
    }
}
