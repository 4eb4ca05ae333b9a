use autodidact_common::{canonical_url, ResourceKind, StepKey};
use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, Result};

/// What the discovery backends know about the step being curated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    pub step_title: String,
    pub discipline: String,
    #[serde(default)]
    pub step_description: Option<String>,
    #[serde(default)]
    pub module_title: Option<String>,
    /// Academic sources the syllabus cites for this step.
    #[serde(default)]
    pub source_urls: Vec<String>,
}

impl StepContext {
    pub fn key(&self) -> StepKey {
        StepKey::new(&self.step_title, &self.discipline)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.step_title.trim().is_empty() {
            return Err(ResourceError::InvalidRequest(
                "step_title must not be empty".to_string(),
            ));
        }
        if self.discipline.trim().is_empty() {
            return Err(ResourceError::InvalidRequest(
                "discipline must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResourcesRequest {
    #[serde(flatten)]
    pub step: StepContext,
    /// Skip the cache and re-run discovery.
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditionalResourceRequest {
    #[serde(flatten)]
    pub step: StepContext,
    pub kind: ResourceKind,
    /// URLs the learner has already seen or rejected.
    #[serde(default)]
    pub exclude_urls: Vec<String>,
}

pub(crate) fn validate_url(url: &str) -> Result<String> {
    canonical_url(url)
        .ok_or_else(|| ResourceError::InvalidRequest(format!("not an http(s) URL: {url}")))
}
