mod client;
pub(crate) mod types;

use crate::error::AiError;
use crate::traits::{ChatAgent, Completion, CompletionRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use client::GeminiClient;
use types::GenerateRequest;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_OUTPUT_TOKENS: u32 = 4096;

// =============================================================================
// Gemini Agent
// =============================================================================

#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    model: String,
    base_url: Option<String>,
    http: reqwest::Client,
}

impl Gemini {
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
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            AiError::Config("GEMINI_API_KEY environment variable not set".to_string())
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

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl ChatAgent for Gemini {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let wire = GenerateRequest::from_completion(&request, MAX_OUTPUT_TOKENS);
        let response = self.client().generate(&self.model, &wire).await?;

        let text = response.text().ok_or(AiError::EmptyResponse("gemini"))?;

        Ok(Completion {
            text,
            citations: response.citations(),
        })
    }
}
