//! Condense extracted page text into a short summary with one LLM call.

use std::sync::Arc;

use crate::traits::LlmClient;
use fanout_common::FanoutError;

pub const SUMMARY_SYSTEM_PROMPT: &str = "You write short summaries. Reply with a single \
paragraph of at most three sentences that captures what the provided introductions have in \
common and what sets them apart. No preamble, no lists.";

pub const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 300;
pub const DEFAULT_SUMMARY_TEMPERATURE: f32 = 0.2;

const TEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(thiserror::Error, Debug)]
pub enum SummarizationError {
    /// Authentication, network, or response-shape failure from the provider.
    #[error("summarization request failed: {0}")]
    Service(#[from] FanoutError),

    #[error("summarization returned no text (model {model})")]
    Empty { model: String },
}

/// Holds the provider client for the lifetime of an experiment.
#[derive(Clone)]
pub struct Summarizer {
    client: Arc<dyn LlmClient + Send + Sync>,
    max_tokens: u32,
    temperature: f32,
}

impl Summarizer {
    pub fn new(client: Arc<dyn LlmClient + Send + Sync>) -> Self {
        Self {
            client,
            max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
            temperature: DEFAULT_SUMMARY_TEMPERATURE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Embed the joined texts in the fixed instruction template.
    pub fn build_prompt(texts: &[String]) -> String {
        let joined = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR);
        format!("Summarize the following page introductions.\n\n{joined}")
    }

    pub async fn summarize(&self, texts: &[String]) -> Result<String, SummarizationError> {
        let prompt = Self::build_prompt(texts);
        tracing::debug!(
            model = self.client.model_name(),
            texts = texts.len(),
            prompt_len = prompt.len(),
            "summarizer.request"
        );

        let response = self
            .client
            .generate(
                &prompt,
                Some(SUMMARY_SYSTEM_PROMPT),
                Some(self.max_tokens),
                Some(self.temperature),
            )
            .await?;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(SummarizationError::Empty {
                model: self.client.model_name().to_string(),
            });
        }
        tracing::info!(
            model = self.client.model_name(),
            tokens_used = ?response.tokens_used,
            "summarizer.done"
        );
        Ok(text.to_string())
    }
}
