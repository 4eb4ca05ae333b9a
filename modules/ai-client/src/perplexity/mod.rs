mod client;
pub(crate) mod types;

use crate::error::AiError;
use crate::traits::{ChatAgent, Completion, CompletionRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use client::PerplexityClient;
use types::ChatRequest;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_TOKENS: u32 = 4096;

// =============================================================================
// Perplexity Agent
// =============================================================================

/// Search-grounded chat completions. Every answer comes back with the web
/// sources it was built from, which makes it the preferred discovery backend.
#[derive(Clone)]
pub struct Perplexity {
    api_key: String,
    model: String,
    base_url: Option<String>,
    http: reqwest::Client,
}

impl Perplexity {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("PERPLEXITY_API_KEY").map_err(|_| {
            AiError::Config("PERPLEXITY_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> PerplexityClient {
        let client = PerplexityClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl ChatAgent for Perplexity {
    fn provider(&self) -> &'static str {
        "perplexity"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut wire = ChatRequest::new(&self.model)
            .messages(&request.messages)
            .temperature(request.temperature)
            .max_tokens(MAX_TOKENS);
        if let Some(schema) = request.json_schema {
            wire = wire.json_schema(schema);
        }

        let response = self.client().chat(&wire).await?;
        let citations = response.citation_urls();

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(AiError::EmptyResponse("perplexity"))?;

        Ok(Completion { text, citations })
    }
}
