// Open-educational-resource fallback: a Wikipedia summary for the step.

use std::time::Duration;

use anyhow::{anyhow, Result};
use autodidact_common::{Config, DiscoveryTier, Resource, ResourceKind};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::extractor::truncate_snippet;
use crate::request::StepContext;

#[derive(Debug, Deserialize)]
struct PageSummary {
    #[serde(rename = "type", default)]
    page_type: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

pub struct OerSearch {
    http: reqwest::Client,
    base_url: String,
    max_chars: usize,
}

impl OerSearch {
    pub fn new(base_url: &str, timeout: Duration, max_chars: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_chars,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.wikipedia_base_url,
            Duration::from_secs(config.link_timeout_secs),
            config.snippet_max_chars,
        )
    }

    /// Encyclopedia reading for the step: the step title first, then the
    /// title qualified by discipline. Disambiguation pages don't count.
    pub async fn lookup(&self, step: &StepContext) -> Option<Resource> {
        let title = step.step_title.trim();
        let candidates = [
            title.to_string(),
            format!("{title} ({})", step.discipline.trim()),
        ];

        for candidate in candidates {
            match self.summary(&candidate).await {
                Ok(Some(resource)) => return Some(resource),
                Ok(None) => continue,
                Err(e) => {
                    debug!(title = %candidate, error = %e, "Wikipedia summary lookup failed");
                }
            }
        }
        None
    }

    async fn summary(&self, title: &str) -> Result<Option<Resource>> {
        let page = title.replace(' ', "_");
        let mut endpoint = Url::parse(&self.base_url)?;
        endpoint
            .path_segments_mut()
            .map_err(|_| anyhow!("base URL cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["api", "rest_v1", "page", "summary", page.as_str()]);

        let resp = self.http.get(endpoint).send().await?;
        if !resp.status().is_success() {
            debug!(title, status = resp.status().as_u16(), "No Wikipedia page");
            return Ok(None);
        }

        let summary: PageSummary = resp.json().await?;
        if summary.page_type == "disambiguation" || summary.extract.trim().is_empty() {
            return Ok(None);
        }

        let url = summary
            .content_urls
            .and_then(|c| c.desktop)
            .map(|d| d.page)
            .unwrap_or_else(|| format!("{}/wiki/{page}", self.base_url));

        let mut r = Resource::new(ResourceKind::Reading, summary.title)
            .with_url(url)
            .with_tier(DiscoveryTier::OerSearch);
        r.source = Some("Wikipedia".to_string());
        r.description = summary.description;
        r.embedded_content = Some(truncate_snippet(summary.extract.trim(), self.max_chars));
        Ok(Some(r))
    }
}
