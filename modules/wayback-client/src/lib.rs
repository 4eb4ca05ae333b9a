pub mod error;

pub use error::{Result, WaybackError};

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://archive.org";

/// An archived capture of a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Playback URL, always https.
    pub url: String,
    /// Capture time as `YYYYMMDDhhmmss`.
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<ClosestSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ClosestSnapshot {
    #[serde(default)]
    available: bool,
    url: String,
    #[serde(default)]
    timestamp: String,
    status: Option<String>,
}

impl ClosestSnapshot {
    /// Captures of error pages are useless as a replacement link.
    fn is_usable(&self) -> bool {
        self.available
            && self
                .status
                .as_deref()
                .map_or(true, |s| s.starts_with('2'))
    }
}

pub struct WaybackClient {
    client: reqwest::Client,
    base_url: String,
}

impl WaybackClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Closest usable snapshot of `url`, if the Wayback Machine has one.
    pub async fn closest(&self, url: &str) -> Result<Option<Snapshot>> {
        let endpoint = format!("{}/wayback/available", self.base_url);

        debug!(url, "wayback availability lookup");

        let resp = self
            .client
            .get(&endpoint)
            .query(&[("url", url)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(WaybackError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: AvailabilityResponse = resp.json().await?;

        Ok(body
            .archived_snapshots
            .closest
            .filter(ClosestSnapshot::is_usable)
            .map(|c| Snapshot {
                url: force_https(&c.url),
                timestamp: c.timestamp,
            }))
    }
}

fn force_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}
