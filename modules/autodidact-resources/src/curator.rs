// Transformer: reshape every resource payload shape we have ever stored or
// received from a model into one `CuratedStepResources`.
//
// Shapes in the wild:
// - current:       { primary_video, primary_reading, book, mooc, alternatives }
//                  (camelCase variants too)
// - legacy lists:  { videos: [], readings: [], books: [], moocs|courses: [] }
// - legacy single: { video: {}, reading: {}, book: {} }
// - flat:          { resources: [{ type: "video", ... }] } or a bare array
// Any of these may be wrapped in { data: ... }.

use std::collections::HashMap;
use std::sync::LazyLock;

use autodidact_common::{
    canonical_url, domain_of, is_youtube, CuratedStepResources, DiscoveryTier, Resource,
    ResourceKind,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::scoring;

const CONTAINER_KEYS: &[(&str, Option<ResourceKind>)] = &[
    ("primary_video", Some(ResourceKind::Video)),
    ("primaryVideo", Some(ResourceKind::Video)),
    ("primary_reading", Some(ResourceKind::Reading)),
    ("primaryReading", Some(ResourceKind::Reading)),
    ("video", Some(ResourceKind::Video)),
    ("videos", Some(ResourceKind::Video)),
    ("reading", Some(ResourceKind::Reading)),
    ("readings", Some(ResourceKind::Reading)),
    ("book", Some(ResourceKind::Book)),
    ("books", Some(ResourceKind::Book)),
    ("mooc", Some(ResourceKind::Mooc)),
    ("moocs", Some(ResourceKind::Mooc)),
    ("course", Some(ResourceKind::Mooc)),
    ("courses", Some(ResourceKind::Mooc)),
    ("alternatives", None),
    ("resources", None),
    ("items", None),
];

const CURRENT_SHAPE_KEYS: &[&str] = &[
    "primary_video",
    "primaryVideo",
    "primary_reading",
    "primaryReading",
    "alternatives",
];

const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com", "ted.com"];
const MOOC_HOSTS: &[&str] = &[
    "coursera.org",
    "edx.org",
    "udemy.com",
    "futurelearn.com",
    "ocw.mit.edu",
    "khanacademy.org",
    "udacity.com",
];

/// Reshape any known payload into the unified bundle.
///
/// Current-shape payloads keep their slot assignments. Everything else is
/// flattened, scored and re-curated.
pub fn normalize_payload(
    step_title: &str,
    discipline: &str,
    payload: &Value,
    max_alternatives: usize,
) -> CuratedStepResources {
    let payload = unwrap_envelope(payload);

    let mut bundle = if is_current_shape(payload) {
        current_shape(step_title, discipline, payload)
    } else {
        let mut resources = resources_from_value(payload);
        for r in resources.iter_mut().filter(|r| r.score == 0.0) {
            r.score = scoring::score(r);
        }
        curate(step_title, discipline, resources, max_alternatives)
    };

    if let Some(obj) = payload.as_object() {
        bundle.from_cache = field(obj, &["from_cache", "fromCache"])
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if let Some(at) = field(obj, &["generated_at", "generatedAt", "updated_at"])
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            bundle.generated_at = at.with_timezone(&Utc);
        }
    }

    bundle
}

fn unwrap_envelope(payload: &Value) -> &Value {
    match payload.get("data") {
        Some(inner) if inner.is_object() || inner.is_array() => inner,
        _ => payload,
    }
}

fn is_current_shape(payload: &Value) -> bool {
    payload
        .as_object()
        .is_some_and(|obj| CURRENT_SHAPE_KEYS.iter().any(|k| obj.contains_key(*k)))
}

fn current_shape(step_title: &str, discipline: &str, payload: &Value) -> CuratedStepResources {
    let mut bundle = CuratedStepResources::empty(step_title, discipline);
    let Some(obj) = payload.as_object() else {
        return bundle;
    };

    let slot = |keys: &[&str], kind| {
        field(obj, keys).and_then(|v| resource_from_value(Some(kind), v))
    };
    bundle.primary_video = slot(&["primary_video", "primaryVideo"], ResourceKind::Video);
    bundle.primary_reading = slot(&["primary_reading", "primaryReading"], ResourceKind::Reading);
    bundle.book = slot(&["book", "primary_book", "primaryBook"], ResourceKind::Book);
    bundle.mooc = slot(&["mooc", "primary_mooc", "primaryMooc"], ResourceKind::Mooc);

    if let Some(Value::Array(items)) = field(obj, &["alternatives"]) {
        bundle.alternatives = items
            .iter()
            .filter_map(|item| resource_from_value(None, item))
            .collect();
    }

    bundle
}

/// Flatten any payload shape into a resource list, in document order.
pub fn resources_from_value(payload: &Value) -> Vec<Resource> {
    let mut out = Vec::new();
    collect(unwrap_envelope(payload), None, &mut out);
    out
}

fn collect(value: &Value, hint: Option<ResourceKind>, out: &mut Vec<Resource>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect(item, hint, out);
            }
        }
        Value::Object(obj) => {
            if looks_like_resource(obj) {
                if let Some(r) = resource_from_value(hint, value) {
                    out.push(r);
                }
                return;
            }
            for (key, kind) in CONTAINER_KEYS {
                if let Some(inner) = obj.get(*key) {
                    collect(inner, kind.or(hint), out);
                }
            }
        }
        _ => {}
    }
}

fn looks_like_resource(obj: &serde_json::Map<String, Value>) -> bool {
    ["title", "name"]
        .iter()
        .any(|k| obj.get(*k).is_some_and(Value::is_string))
}

fn field<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn string_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    })
}

/// Build one resource from a loosely-shaped object. `hint` wins over any
/// kind label on the item; without either, the kind is inferred from the URL.
pub fn resource_from_value(hint: Option<ResourceKind>, value: &Value) -> Option<Resource> {
    let obj = value.as_object()?;
    let title = string_field(obj, &["title", "name", "heading"])?;

    let url = string_field(obj, &["url", "link", "href", "uri"])
        .filter(|u| canonical_url(u).is_some());

    let label_kind = string_field(obj, &["kind", "type", "resource_type", "resourceType"])
        .and_then(|l| ResourceKind::from_label(&l));
    let kind = hint
        .or(label_kind)
        .unwrap_or_else(|| infer_kind(url.as_deref(), obj));

    let tier = field(obj, &["tier"])
        .and_then(|v| serde_json::from_value::<DiscoveryTier>(v.clone()).ok())
        .unwrap_or_default();

    Some(Resource {
        kind,
        title,
        url,
        author: string_field(obj, &["author", "authors", "channel", "instructor", "creator"]),
        source: string_field(
            obj,
            &["source", "publisher", "platform", "provider", "domain", "site"],
        ),
        description: string_field(
            obj,
            &["description", "summary", "snippet", "why", "rationale"],
        ),
        duration_minutes: field(obj, &["duration_minutes", "durationMinutes", "duration", "length"])
            .and_then(parse_duration_minutes),
        embedded_content: string_field(
            obj,
            &["embedded_content", "embeddedContent", "content", "excerpt"],
        ),
        archived_from: string_field(obj, &["archived_from", "archivedFrom"]),
        verified: field(obj, &["verified", "isVerified"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
        synthesized: field(obj, &["synthesized", "isSynthesized"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
        score: field(obj, &["score", "relevance"])
            .and_then(Value::as_f64)
            .map(|s| s as f32)
            .unwrap_or(0.0),
        tier,
    })
}

fn infer_kind(url: Option<&str>, obj: &serde_json::Map<String, Value>) -> ResourceKind {
    if let Some(url) = url {
        if is_youtube(url) {
            return ResourceKind::Video;
        }
        if let Some(domain) = domain_of(url) {
            let on = |hosts: &[&str]| {
                hosts
                    .iter()
                    .any(|h| domain == *h || domain.ends_with(&format!(".{h}")))
            };
            if on(VIDEO_HOSTS) {
                return ResourceKind::Video;
            }
            if on(MOOC_HOSTS) {
                return ResourceKind::Mooc;
            }
        }
    }
    if obj.contains_key("isbn") {
        return ResourceKind::Book;
    }
    ResourceKind::Reading
}

static ISO_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("valid regex")
});
static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):(\d{2})(?::(\d{2}))?$").expect("valid regex"));
static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:h|hr|hrs|hour|hours)\b").expect("valid regex"));
static MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:m|min|mins|minute|minutes)\b").expect("valid regex"));

/// Minutes from a number or from "12 min", "1h 5m", "1:05:00", "12:34", "PT1H5M".
pub fn parse_duration_minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().filter(|m| *m >= 0.0).map(|m| m.round() as u32),
        Value::String(s) => parse_duration_str(s.trim()),
        _ => None,
    }
}

fn parse_duration_str(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<u32>() {
        return Some(n);
    }

    if let Some(c) = ISO_DURATION_RE.captures(s) {
        let seconds = num(c.get(1)) * 3600 + num(c.get(2)) * 60 + num(c.get(3));
        return (seconds > 0).then(|| (seconds + 30) / 60);
    }

    if let Some(c) = CLOCK_RE.captures(s) {
        // h:mm:ss or mm:ss
        return Some(match c.get(3) {
            Some(_) => num(c.get(1)) * 60 + num(c.get(2)),
            None => num(c.get(1)),
        });
    }

    let hours: f64 = HOURS_RE
        .captures(s)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0.0);
    let minutes = MINUTES_RE.captures(s).map(|c| num(c.get(1))).unwrap_or(0);
    let total = (hours * 60.0).round() as u32 + minutes;
    (total > 0).then_some(total)
}

fn num(m: Option<regex::Match<'_>>) -> u32 {
    m.and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

/// Drop duplicates by identity (canonical URL, or title + author), keeping
/// the higher-scoring copy in the position of the first occurrence.
pub fn dedupe(resources: Vec<Resource>) -> Vec<Resource> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Resource> = Vec::with_capacity(resources.len());

    for r in resources {
        match index.get(&r.identity()) {
            Some(&i) => {
                if r.score > out[i].score {
                    out[i] = r;
                }
            }
            None => {
                index.insert(r.identity(), out.len());
                out.push(r);
            }
        }
    }

    out
}

/// Pick the best resource of each kind as primary; the rest, by score,
/// become alternatives.
pub fn curate(
    step_title: &str,
    discipline: &str,
    resources: Vec<Resource>,
    max_alternatives: usize,
) -> CuratedStepResources {
    let mut resources = dedupe(resources);
    resources.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut bundle = CuratedStepResources::empty(step_title, discipline);
    for r in resources {
        let slot = match r.kind {
            ResourceKind::Video => &mut bundle.primary_video,
            ResourceKind::Reading => &mut bundle.primary_reading,
            ResourceKind::Book => &mut bundle.book,
            ResourceKind::Mooc => &mut bundle.mooc,
        };
        if slot.is_none() {
            *slot = Some(r);
        } else {
            bundle.alternatives.push(r);
        }
    }
    bundle.alternatives.truncate(max_alternatives);

    bundle
}
