//! Provider-agnostic LLM integration for Fanout.
//!
//! This crate exposes a common [`traits::LlmClient`] interface, concrete
//! providers for Anthropic and OpenAI, and the [`summarizer::Summarizer`]
//! that turns extracted page text into a short summary. Clients are built
//! from a [`fanout_common::LlmConfig`] with [`client_from_config`].
//!
//! # Examples
//! ```
//! use fanout_common::LlmConfig;
//! use fanout_llm::client_from_config;
//!
//! // No provider configured: the caller decides to skip summaries.
//! assert!(client_from_config(&LlmConfig::None).is_err());
//! ```
#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "openai")]
pub mod openai;
pub mod summarizer;
pub mod traits;

use fanout_common::{FanoutError, LlmConfig};
use fanout_http::HttpError;
use std::sync::Arc;
use traits::LlmClient;

pub use summarizer::{SummarizationError, Summarizer};

/// Build the configured provider client.
pub fn client_from_config(
    config: &LlmConfig,
) -> fanout_common::Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    match config {
        #[cfg(feature = "anthropic")]
        LlmConfig::Anthropic {
            api_key,
            model,
            base_url,
        } => {
            let base = base_url.as_deref().unwrap_or(anthropic::ANTHROPIC_API_BASE);
            let client = anthropic::AnthropicClient::with_base_url(base, api_key, model.clone())?;
            Ok(Arc::new(client))
        }
        #[cfg(feature = "openai")]
        LlmConfig::OpenAi {
            api_key,
            model,
            base_url,
        } => {
            let base = base_url.as_deref().unwrap_or(openai::OPENAI_API_BASE);
            let client = openai::OpenAiClient::with_base_url(base, api_key.clone(), model.clone())?;
            Ok(Arc::new(client))
        }
        LlmConfig::None => Err(FanoutError::Config("No LLM configured".to_string())),
        #[allow(unreachable_patterns)]
        _ => Err(FanoutError::Config("LLM provider not enabled".to_string())),
    }
}

pub(crate) fn http_to_fanout(e: HttpError) -> FanoutError {
    FanoutError::Llm(format!("{e}"))
}
