// Discovery backends: ask a search-grounded model for candidate resources.
//
// Replies are parsed through the curator's tolerant normaliser rather than
// strict deserialization. Models drift between list and single-object
// shapes even with a response schema attached.

use std::sync::Arc;

use ai_client::{extract_json_object, ChatAgent, CompletionRequest, StructuredOutput};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use autodidact_common::{domain_of, DiscoveryTier, Resource, ResourceKind};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::curator::resources_from_value;
use crate::request::StepContext;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ResourceDiscoverer: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate resources of every kind for a step. Unvalidated.
    async fn discover(&self, step: &StepContext) -> Result<Vec<Resource>>;

    /// Candidates of a single kind, avoiding `exclude_urls`.
    async fn find_additional(
        &self,
        step: &StepContext,
        kind: ResourceKind,
        exclude_urls: &[String],
    ) -> Result<Vec<Resource>>;
}

/// Last-resort reading written by a model when no external reading survived.
#[async_trait]
pub trait ReadingSynthesizer: Send + Sync {
    async fn synthesize(&self, step: &StepContext) -> Result<Option<Resource>>;
}

// ---------------------------------------------------------------------------
// Response schema
// ---------------------------------------------------------------------------

/// Shape requested from the model. Only used to build the response schema.
#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
struct Candidate {
    title: String,
    url: Option<String>,
    author: Option<String>,
    source: Option<String>,
    /// One sentence on why this fits the step.
    description: Option<String>,
    duration_minutes: Option<u32>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
struct DiscoveryResponse {
    videos: Vec<Candidate>,
    readings: Vec<Candidate>,
    books: Vec<Candidate>,
    moocs: Vec<Candidate>,
}

const SYSTEM_PROMPT: &str = "You are a research librarian curating free, high-quality learning \
materials for self-directed learners. Prefer university, encyclopedia and open courseware \
sources. Only return URLs you have actually found; never invent links. Reply with JSON only.";

fn describe_step(step: &StepContext) -> String {
    let mut out = format!(
        "Discipline: {}\nStep: {}\n",
        step.discipline.trim(),
        step.step_title.trim()
    );
    if let Some(module) = step.module_title.as_deref() {
        out.push_str(&format!("Module: {module}\n"));
    }
    if let Some(description) = step.step_description.as_deref() {
        out.push_str(&format!("About this step: {description}\n"));
    }
    if !step.source_urls.is_empty() {
        out.push_str("Sources the syllabus cites:\n");
        for url in &step.source_urls {
            out.push_str(&format!("- {url}\n"));
        }
    }
    out
}

pub(crate) fn discovery_prompt(step: &StepContext) -> String {
    format!(
        "{}\nFind learning resources for this step:\n\
         - videos: up to 3 lecture or explainer videos (YouTube preferred), 5-90 minutes\n\
         - readings: up to 3 free articles or encyclopedia entries\n\
         - books: up to 2 books (author required, url optional)\n\
         - moocs: up to 2 free online courses\n\
         Return {{\"videos\": [], \"readings\": [], \"books\": [], \"moocs\": []}}.",
        describe_step(step)
    )
}

pub(crate) fn additional_prompt(
    step: &StepContext,
    kind: ResourceKind,
    exclude_urls: &[String],
) -> String {
    let mut prompt = format!(
        "{}\nFind up to 3 more {kind} resources for this step. \
         Put them in the \"{}\" list and leave the other lists empty.\n",
        describe_step(step),
        list_key(kind)
    );
    if !exclude_urls.is_empty() {
        prompt.push_str("Do not suggest any of these URLs:\n");
        for url in exclude_urls {
            prompt.push_str(&format!("- {url}\n"));
        }
    }
    prompt
}

fn list_key(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Video => "videos",
        ResourceKind::Reading => "readings",
        ResourceKind::Book => "books",
        ResourceKind::Mooc => "moocs",
    }
}

// ---------------------------------------------------------------------------
// LlmDiscoverer
// ---------------------------------------------------------------------------

pub struct LlmDiscoverer {
    agent: Arc<dyn ChatAgent>,
}

impl LlmDiscoverer {
    pub fn new(agent: Arc<dyn ChatAgent>) -> Self {
        Self { agent }
    }

    async fn ask(&self, prompt: String) -> Result<Vec<Resource>> {
        let request = CompletionRequest::new()
            .system(SYSTEM_PROMPT)
            .user(prompt)
            .temperature(0.2)
            .json_schema(DiscoveryResponse::strict_schema());

        let completion = self.agent.complete(request).await?;
        let mut resources = parse_reply(&completion.text)
            .with_context(|| format!("{} returned an unusable reply", self.agent.provider()))?;

        let has_reading = resources.iter().any(|r| r.kind == ResourceKind::Reading);
        if !has_reading {
            resources.extend(completion.citations.iter().filter_map(|url| citation_reading(url)));
        }

        for r in &mut resources {
            r.tier = DiscoveryTier::Discovery;
            if r.source.is_none() {
                r.source = r.url.as_deref().and_then(domain_of);
            }
        }

        debug!(
            provider = self.agent.provider(),
            candidates = resources.len(),
            citations = completion.citations.len(),
            "Discovery reply parsed"
        );
        Ok(resources)
    }
}

#[async_trait]
impl ResourceDiscoverer for LlmDiscoverer {
    fn name(&self) -> &str {
        self.agent.provider()
    }

    async fn discover(&self, step: &StepContext) -> Result<Vec<Resource>> {
        self.ask(discovery_prompt(step)).await
    }

    async fn find_additional(
        &self,
        step: &StepContext,
        kind: ResourceKind,
        exclude_urls: &[String],
    ) -> Result<Vec<Resource>> {
        let resources = self.ask(additional_prompt(step, kind, exclude_urls)).await?;
        Ok(resources.into_iter().filter(|r| r.kind == kind).collect())
    }
}

fn parse_reply(text: &str) -> Result<Vec<Resource>> {
    let json = extract_json_object(text).ok_or_else(|| anyhow!("no JSON object in reply"))?;
    let value: serde_json::Value = serde_json::from_str(json)?;
    Ok(resources_from_value(&value))
}

/// Citation URL as a bare reading candidate. Titled by its domain until
/// validation or extraction gives us something better.
fn citation_reading(url: &str) -> Option<Resource> {
    let domain = domain_of(url)?;
    let mut r = Resource::new(ResourceKind::Reading, domain.clone()).with_url(url);
    r.source = Some(domain);
    Some(r)
}

// ---------------------------------------------------------------------------
// LlmSynthesizer
// ---------------------------------------------------------------------------

const SYNTHESIS_PROMPT: &str = "You are a patient tutor. Write a self-contained primer of about \
400 words in plain prose. No headings, no links, no bullet lists.";

pub struct LlmSynthesizer {
    agent: Arc<dyn ChatAgent>,
}

impl LlmSynthesizer {
    pub fn new(agent: Arc<dyn ChatAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl ReadingSynthesizer for LlmSynthesizer {
    async fn synthesize(&self, step: &StepContext) -> Result<Option<Resource>> {
        let request = CompletionRequest::new()
            .system(SYNTHESIS_PROMPT)
            .user(format!(
                "{}\nWrite the primer for this step.",
                describe_step(step)
            ))
            .temperature(0.4);

        let completion = self.agent.complete(request).await?;
        let text = completion.text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let mut r = Resource::new(
            ResourceKind::Reading,
            format!("{}: a primer", step.step_title.trim()),
        )
        .with_tier(DiscoveryTier::Synthesis);
        r.synthesized = true;
        r.embedded_content = Some(text.to_string());
        r.source = Some(format!("Generated ({})", self.agent.provider()));
        Ok(Some(r))
    }
}
