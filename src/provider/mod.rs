//! Provider implementations and factory
//!
//! One adapter per backend, selected once at startup from configuration.

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod traits;
pub mod transport;

use std::sync::Arc;

use crate::core::config::{Config, ProviderKind};
use crate::core::Result;

use self::anthropic::AnthropicProvider;
use self::ollama::OllamaProvider;
use self::openai::OpenAiProvider;

pub use self::traits::Provider;
pub use self::transport::{HttpResponse, RetryTransport};

/// Create the configured provider
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config.provider.kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(config)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_config(config)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_config(config)?),
    };
    Ok(provider)
}
