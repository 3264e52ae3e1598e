use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{CompletionClient, CompletionRequest, CompletionResponse};
use crate::config::CondenserToml;
use crate::errors::LlmError;

/// Longest error body kept in `LlmError::Status`.
const MAX_ERROR_BODY: usize = 500;

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("condenser/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn from_config(config: &CondenserToml) -> Result<Self> {
        Self::new(
            config.base_url(),
            config.api_key(),
            Duration::from_secs(config.llm.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = self.endpoint();
        debug!(url = %url, model = %request.model, "Sending completion request");

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(LlmError::Http)?;
        let status = resp.status();
        let body = resp.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        parse_response(&body)
    }
}

/// Decode a completion response body.
pub(crate) fn parse_response(body: &str) -> Result<CompletionResponse, LlmError> {
    let response: CompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;
    if response.choices.is_empty() {
        return Err(LlmError::NoChoices);
    }
    Ok(response)
}
