//! Anthropic Messages API client.
//!
//! One request per [`LlmClient::generate`] call: a single user message, an
//! optional system instruction, and bounded output length.

use crate::http_to_fanout;
use crate::traits::{LlmClient, LlmResponse};
use async_trait::async_trait;
use fanout_common::{FanoutError, Result};
use fanout_http::{secret_header, Auth, HttpClient, RequestOpts};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1/";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The Messages API requires `max_tokens`; used when the caller passes none.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicClient {
    client: HttpClient,
    auth: Auth<'static>,
    model: String,
}

#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl AnthropicClient {
    /// Create a new client for the given API key and model.
    pub fn new(api_key: &str, model: String) -> Result<Self> {
        Self::with_base_url(ANTHROPIC_API_BASE, api_key, model)
    }

    /// Point the client at a different endpoint (gateways, test servers).
    pub fn with_base_url(base_url: &str, api_key: &str, model: String) -> Result<Self> {
        let client = HttpClient::new(base_url)
            .map_err(|e| FanoutError::Llm(format!("HttpClient init failed: {e}")))?;
        let auth = secret_header("x-api-key", api_key)
            .map_err(|e| FanoutError::Config(format!("Anthropic API key: {e}")))?;

        Ok(Self {
            client,
            auth,
            model,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let req = MessagesRequest {
            model: &self.model,
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature,
            system: system_prompt,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        let opts = RequestOpts {
            auth: Some(self.auth.clone()),
            headers: Some(headers),
            ..Default::default()
        };

        let resp: MessagesResponse = self
            .client
            .post_json_opts("messages", &req, opts)
            .await
            .map_err(http_to_fanout)?;
        tracing::debug!(
            id = %resp.id,
            stop_reason = ?resp.stop_reason,
            "anthropic.messages.done"
        );

        let text = resp
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            text,
            model: Some(resp.model),
            tokens_used: resp.usage.map(|u| u.input_tokens + u.output_tokens),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
