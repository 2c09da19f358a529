use crate::config::EngineSettings;
use crate::provider::anthropic::AnthropicAdapter;
use crate::provider::openai::OpenAiAdapter;
use crate::provider::perplexity::PerplexityAdapter;
use crate::provider::types::{LLMError, LLMRequest, LLMResponse, ProviderKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Uniform capability contract over heterogeneous chat-completion endpoints.
///
/// Adapters translate the normalized [`LLMRequest`] into provider-specific
/// wire calls and translate responses and status codes back into
/// [`LLMResponse`] and the [`LLMError`] taxonomy. Transient upstream errors
/// (rate limits, 5xx, network) are retried internally with exponential
/// backoff before a failure surfaces to the caller.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Execute a single generation request.
    async fn generate(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError>;

    /// Which provider this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Model used when the request carries no override.
    fn default_model(&self) -> &str;

    /// Release the underlying HTTP connection handle.
    async fn shutdown(&self);
}

/// Factory for creating provider adapters
pub struct ProviderFactory;

impl ProviderFactory {
    /// Build an adapter for `kind`, resolving credentials and overrides
    /// from `settings`. Fails with [`LLMError::Auth`] when the API key for
    /// the requested provider is not configured.
    pub fn create(
        kind: ProviderKind,
        settings: &EngineSettings,
        model: Option<String>,
    ) -> Result<Arc<dyn LLMProvider>, LLMError> {
        match kind {
            ProviderKind::OpenAi => {
                let api_key = settings
                    .openai_api_key
                    .as_deref()
                    .ok_or_else(|| LLMError::Auth("OpenAI API key not configured".to_string()))?;
                Ok(Arc::new(OpenAiAdapter::new(
                    api_key,
                    model,
                    settings.openai_base_url.as_deref(),
                    settings.request_timeout,
                    settings.provider_retry.clone(),
                )?))
            }
            ProviderKind::Anthropic => {
                let api_key = settings.anthropic_api_key.as_deref().ok_or_else(|| {
                    LLMError::Auth("Anthropic API key not configured".to_string())
                })?;
                Ok(Arc::new(AnthropicAdapter::new(
                    api_key,
                    model,
                    settings.anthropic_base_url.as_deref(),
                    settings.request_timeout,
                    settings.provider_retry.clone(),
                )?))
            }
            ProviderKind::Perplexity => {
                let api_key = settings.perplexity_api_key.as_deref().ok_or_else(|| {
                    LLMError::Auth("Perplexity API key not configured".to_string())
                })?;
                Ok(Arc::new(PerplexityAdapter::new(
                    api_key,
                    model,
                    settings.perplexity_base_url.as_deref(),
                    settings.request_timeout,
                    settings.provider_retry.clone(),
                )?))
            }
        }
    }
}
