// Best-effort snippet extraction from a handful of academic sites with
// stable markup. Any failure means no snippet, never an error.

use std::sync::LazyLock;
use std::time::Duration;

use autodidact_common::{domain_of, Config, Resource, ResourceKind};
use futures::stream::{self, StreamExt};
use regex::{Captures, Regex};
use tracing::debug;

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>").expect("valid regex")
});
static SUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<sup[^>]*>.*?</sup>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex")
});
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static SEP_PREAMBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*\bid\s*=\s*["']preamble["'][^>]*>(.*?)</div>"#)
        .expect("valid regex")
});
static WIKI_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*\bclass\s*=\s*["'][^"']*mw-parser-output[^"']*["'][^>]*>"#)
        .expect("valid regex")
});
static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").expect("valid regex"));

const TITLE_SUFFIXES: &[&str] = &[
    " - Wikipedia",
    " (Stanford Encyclopedia of Philosophy)",
    " | Stanford Encyclopedia of Philosophy",
];

/// Sites whose page structure we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownSource {
    StanfordEncyclopedia,
    Wikipedia,
}

/// SEP and its official mirrors.
const SEP_HOSTS: &[&str] = &[
    "plato.stanford.edu",
    "seop.illc.uva.nl",
    "plato.sydney.edu.au",
    "stanford.library.sydney.edu.au",
];

pub fn known_source(url: &str) -> Option<KnownSource> {
    let domain = domain_of(url)?;
    if SEP_HOSTS.contains(&domain.as_str()) {
        Some(KnownSource::StanfordEncyclopedia)
    } else if domain == "wikipedia.org" || domain.ends_with(".wikipedia.org") {
        Some(KnownSource::Wikipedia)
    } else {
        None
    }
}

// --- HTML helpers ---

fn decode_entity(caps: &Captures<'_>) -> String {
    let raw = &caps[1];
    let decoded = if let Some(hex) = raw.strip_prefix("#x").or_else(|| raw.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = raw.strip_prefix('#') {
        dec.parse().ok().and_then(char::from_u32)
    } else {
        match raw {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            "ndash" => Some('–'),
            "mdash" => Some('—'),
            "hellip" => Some('…'),
            "lsquo" => Some('\u{2018}'),
            "rsquo" => Some('\u{2019}'),
            "ldquo" => Some('\u{201C}'),
            "rdquo" => Some('\u{201D}'),
            _ => None,
        }
    };
    decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
}

/// Plain text of an HTML fragment: tags removed, entities decoded,
/// whitespace collapsed.
pub fn strip_tags(html: &str) -> String {
    let without_code = SCRIPT_STYLE_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_code, "");
    let decoded = ENTITY_RE.replace_all(&without_tags, decode_entity);
    WS_RE.replace_all(&decoded, " ").trim().to_string()
}

/// The preamble of an SEP entry.
pub fn extract_sep(html: &str) -> Option<String> {
    let caps = SEP_PREAMBLE_RE.captures(html)?;
    let text = strip_tags(&caps[1]);
    (!text.is_empty()).then_some(text)
}

/// First non-empty paragraph of a Wikipedia article body.
pub fn extract_wikipedia(html: &str) -> Option<String> {
    let body_start = WIKI_BODY_RE.find(html).map_or(0, |m| m.end());
    let body = &html[body_start..];

    PARAGRAPH_RE.captures_iter(body).find_map(|caps| {
        let without_refs = SUP_RE.replace_all(&caps[1], "");
        let text = strip_tags(&without_refs);
        (!text.is_empty()).then_some(text)
    })
}

fn page_title(html: &str) -> Option<String> {
    let caps = TITLE_RE.captures(html)?;
    let mut title = strip_tags(&caps[1]);
    for suffix in TITLE_SUFFIXES {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.trim().to_string();
        }
    }
    (!title.is_empty()).then_some(title)
}

/// Cut to at most `max_chars` characters, marking the cut.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let Some((end, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let cut = &text[..end];
    // Prefer ending on a word.
    let cut = match cut.rfind(' ') {
        Some(i) if i > cut.len() / 2 => &cut[..i],
        _ => cut,
    };
    format!("{}…", cut.trim_end())
}

// --- Extractor ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub snippet: String,
}

const DEFAULT_CONCURRENCY: usize = 8;

pub struct ContentExtractor {
    http: reqwest::Client,
    max_chars: usize,
    concurrency: usize,
    extra_hosts: Vec<(String, KnownSource)>,
}

impl ContentExtractor {
    pub fn new(timeout: Duration, max_chars: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            max_chars,
            concurrency: DEFAULT_CONCURRENCY,
            extra_hosts: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(config.link_timeout_secs),
            config.snippet_max_chars,
        )
        .with_concurrency(config.validation_concurrency)
    }

    /// Page fetches in flight at once during `enrich`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Treat pages on `host` (e.g. a local mirror) as `source`.
    pub fn with_host(mut self, host: &str, source: KnownSource) -> Self {
        self.extra_hosts.push((host.to_lowercase(), source));
        self
    }

    pub fn source_for(&self, url: &str) -> Option<KnownSource> {
        known_source(url).or_else(|| {
            let host = url::Url::parse(url).ok()?.host_str()?.to_lowercase();
            self.extra_hosts
                .iter()
                .find(|(h, _)| *h == host)
                .map(|(_, source)| *source)
        })
    }

    /// Fetch `url` and pull a snippet out of it. `None` for unknown sites
    /// and for any fetch or parse failure.
    pub async fn extract(&self, url: &str) -> Option<ExtractedPage> {
        let source = self.source_for(url)?;

        let resp = match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(url, status = resp.status().as_u16(), "Extraction fetch refused");
                return None;
            }
            Err(e) => {
                debug!(url, error = %e, "Extraction fetch failed");
                return None;
            }
        };
        let html = resp.text().await.ok()?;

        let text = match source {
            KnownSource::StanfordEncyclopedia => extract_sep(&html),
            KnownSource::Wikipedia => extract_wikipedia(&html),
        }?;

        Some(ExtractedPage {
            title: page_title(&html),
            snippet: truncate_snippet(&text, self.max_chars),
        })
    }

    /// Fill `embedded_content` on readings from known sites. Returns how many
    /// were enriched.
    pub async fn enrich(&self, resources: &mut [Resource]) -> usize {
        let pending: Vec<&mut Resource> = resources
            .iter_mut()
            .filter(|r| {
                r.kind == ResourceKind::Reading
                    && r.embedded_content.is_none()
                    && r.url.as_deref().is_some_and(|u| self.source_for(u).is_some())
            })
            .collect();
        let tasks: Vec<_> = pending
            .into_iter()
            .map(|r| async move {
                let url = r.url.clone()?;
                let page = self.extract(&url).await?;
                r.embedded_content = Some(page.snippet);
                Some(())
            })
            .collect();

        stream::iter(tasks)
            .buffer_unordered(self.concurrency)
            .filter(|done| futures::future::ready(done.is_some()))
            .count()
            .await
    }
}
