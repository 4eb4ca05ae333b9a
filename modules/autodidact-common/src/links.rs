// URL helpers shared by the curation pipeline and its stores.
//
// Everything that compares URLs (dedup, blacklist, cache invalidation) goes
// through `canonical_url` so that tracking params, scheme, `www.` and the
// many YouTube URL forms don't defeat equality.

use sha2::{Digest, Sha256};
use url::Url;

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "ref", "ref_src", "mc_cid", "mc_eid"];

/// SHA-256 hex digest of `text`.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn parse_http(raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

fn bare_host(parsed: &Url) -> Option<String> {
    let host = parsed.host_str()?.to_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host)
        .to_string();
    Some(host)
}

/// Registrable-ish host of a URL: lowercased, without `www.`/`m.`.
pub fn domain_of(raw: &str) -> Option<String> {
    bare_host(&parse_http(raw)?)
}

pub fn is_youtube(raw: &str) -> bool {
    matches!(
        domain_of(raw).as_deref(),
        Some("youtube.com" | "youtu.be" | "youtube-nocookie.com")
    )
}

/// Video id from any of the common YouTube URL forms.
pub fn youtube_video_id(raw: &str) -> Option<String> {
    let parsed = parse_http(raw)?;
    let host = bare_host(&parsed)?;
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

    let id = match host.as_str() {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "youtube-nocookie.com" => match segments.next() {
            Some("watch") => parsed
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("embed" | "shorts" | "live" | "v") => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    }?;

    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

/// Canonical form used for URL equality. Returns `None` for non-http(s) input.
pub fn canonical_url(raw: &str) -> Option<String> {
    if let Some(id) = youtube_video_id(raw) {
        return Some(format!("https://youtube.com/watch?v={id}"));
    }

    let parsed = parse_http(raw)?;
    let host = bare_host(&parsed)?;

    let port = parsed
        .port()
        .filter(|p| *p != 80 && *p != 443)
        .map(|p| format!(":{p}"))
        .unwrap_or_default();

    let path = parsed.path().trim_end_matches('/');

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let key = k.to_lowercase();
            !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let query = if kept.is_empty() {
        String::new()
    } else {
        let encoded: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        format!("?{encoded}")
    };

    Some(format!("https://{host}{port}{path}{query}"))
}

/// Canonical form when the input parses, the trimmed input otherwise.
pub fn canonical_or_raw(raw: &str) -> String {
    canonical_url(raw).unwrap_or_else(|| raw.trim().to_string())
}
