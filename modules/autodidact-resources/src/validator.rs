// Link validation: is a candidate URL still serving, and if not, does the
// Wayback Machine have a copy we can link instead?

use std::time::Duration;

use autodidact_common::{is_youtube, Config, Resource};
use futures::stream::{self, StreamExt};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tracing::{debug, warn};
use wayback_client::WaybackClient;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; AutodidactLinkCheck/1.0)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Live,
    Archived { snapshot_url: String },
    Dead { reason: String },
}

pub struct LinkValidator {
    http: reqwest::Client,
    wayback: WaybackClient,
    oembed_url: String,
    concurrency: usize,
}

impl LinkValidator {
    pub fn new(
        wayback: WaybackClient,
        oembed_url: &str,
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            wayback,
            oembed_url: oembed_url.to_string(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.link_timeout_secs);
        Self::new(
            WaybackClient::with_timeout(&config.wayback_base_url, timeout),
            &config.youtube_oembed_url,
            timeout,
            config.validation_concurrency,
        )
    }

    /// Live check, falling back to a Wayback snapshot.
    pub async fn check(&self, url: &str) -> LinkStatus {
        let outcome = if is_youtube(url) {
            self.check_oembed(url).await
        } else {
            self.check_http(url).await
        };

        let reason = match outcome {
            Ok(()) => return LinkStatus::Live,
            Err(reason) => reason,
        };
        debug!(url, reason = %reason, "Link not live, trying wayback");

        match self.wayback.closest(url).await {
            Ok(Some(snapshot)) => LinkStatus::Archived {
                snapshot_url: snapshot.url,
            },
            Ok(None) => LinkStatus::Dead { reason },
            Err(e) => {
                warn!(url, error = %e, "Wayback lookup failed");
                LinkStatus::Dead { reason }
            }
        }
    }

    async fn check_oembed(&self, url: &str) -> Result<(), String> {
        let resp = self
            .http
            .get(&self.oembed_url)
            .query(&[("url", url), ("format", "json")])
            .send()
            .await
            .map_err(|e| format!("oembed request failed: {e}"))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            s => Err(format!("oembed returned {}", s.as_u16())),
        }
    }

    async fn check_http(&self, url: &str) -> Result<(), String> {
        let resp = self
            .http
            .head(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        if is_live(status) {
            return Ok(());
        }

        // Some servers refuse HEAD outright; ask for a single byte instead.
        if matches!(
            status,
            StatusCode::FORBIDDEN | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            let resp = self
                .http
                .get(url)
                .header(RANGE, "bytes=0-0")
                .send()
                .await
                .map_err(|e| format!("request failed: {e}"))?;
            if is_live(resp.status()) {
                return Ok(());
            }
            return Err(format!("status {}", resp.status().as_u16()));
        }

        Err(format!("status {}", status.as_u16()))
    }

    /// Check every linked resource, preserving order. Live links are marked
    /// verified, dead ones with a snapshot are swapped to it, the rest are
    /// dropped. Unlinked resources pass through untouched.
    pub async fn validate(&self, resources: Vec<Resource>) -> Vec<Resource> {
        let total = resources.len();

        let checked: Vec<Option<Resource>> = stream::iter(resources)
            .map(|mut r| async move {
                let Some(url) = r.url.clone() else {
                    return Some(r);
                };
                match self.check(&url).await {
                    LinkStatus::Live => {
                        r.verified = true;
                        Some(r)
                    }
                    LinkStatus::Archived { snapshot_url } => {
                        r.url = Some(snapshot_url);
                        r.archived_from = Some(url);
                        r.verified = true;
                        Some(r)
                    }
                    LinkStatus::Dead { reason } => {
                        debug!(url = %url, reason = %reason, "Dropping dead link");
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let kept: Vec<Resource> = checked.into_iter().flatten().collect();
        debug!(total, kept = kept.len(), "Validation finished");
        kept
    }
}

fn is_live(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}
