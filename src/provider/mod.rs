pub mod adapter;
pub mod anthropic;
mod http;
pub mod openai;
pub mod perplexity;
pub mod types;


pub use adapter::{LLMProvider, ProviderFactory};
pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;
pub use perplexity::PerplexityAdapter;
pub use types::*;
