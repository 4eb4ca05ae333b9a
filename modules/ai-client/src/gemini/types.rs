use serde::{Deserialize, Serialize};

use crate::traits::{CompletionRequest, MessageRole};

// =============================================================================
// generateContent Request
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateRequest {
    /// Gemini has no system role in `contents`; system text moves to
    /// `systemInstruction` and assistant turns are sent as `model`.
    pub fn from_completion(request: &CompletionRequest, max_output_tokens: u32) -> Self {
        let mut system = request.system_prompt();

        let response_mime_type = request.json_schema.as_ref().map(|schema| {
            let instruction = format!(
                "Respond with a single JSON object matching this JSON schema:\n{schema}"
            );
            system = Some(match system.take() {
                Some(existing) => format!("{existing}\n\n{instruction}"),
                None => instruction,
            });
            "application/json".to_string()
        });

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| Content {
                role: Some(
                    match m.role {
                        MessageRole::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![Part::text(m.content.clone())],
            })
            .collect();

        Self {
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![Part::text(text)],
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                response_mime_type,
                max_output_tokens,
            },
        }
    }
}

// =============================================================================
// generateContent Response
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WebChunk {
    pub uri: String,
}

impl GenerateResponse {
    /// Text of the first candidate, all parts joined.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }

    pub fn citations(&self) -> Vec<String> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|g| {
                g.grounding_chunks
                    .iter()
                    .filter_map(|c| c.web.as_ref().map(|w| w.uri.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
