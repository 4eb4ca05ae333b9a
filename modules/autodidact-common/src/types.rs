use std::collections::HashSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::links::canonical_or_raw;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Video,
    Reading,
    Book,
    Mooc,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Video,
        ResourceKind::Reading,
        ResourceKind::Book,
        ResourceKind::Mooc,
    ];

    /// Parse the loose kind labels found in stored and model-produced payloads.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "video" | "videos" | "lecture" | "youtube" => Some(Self::Video),
            "reading" | "readings" | "article" | "paper" | "encyclopedia" | "text" => {
                Some(Self::Reading)
            }
            "book" | "books" | "textbook" => Some(Self::Book),
            "mooc" | "moocs" | "course" | "courses" | "online_course" => Some(Self::Mooc),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Video => write!(f, "video"),
            ResourceKind::Reading => write!(f, "reading"),
            ResourceKind::Book => write!(f, "book"),
            ResourceKind::Mooc => write!(f, "mooc"),
        }
    }
}

/// Which stage of the pipeline produced a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryTier {
    /// LLM/search backend discovery.
    #[default]
    Discovery,
    /// Scraped from one of the step's own academic sources.
    Extraction,
    /// Open-educational-resource lookup (Wikipedia).
    OerSearch,
    /// Written by a model when nothing external survived.
    Synthesis,
}

// --- Resources ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Resource {
    pub kind: ResourceKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Publisher, platform or channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Snippet scraped from the page itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_content: Option<String>,
    /// Original URL when `url` was replaced by an archived snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_from: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub synthesized: bool,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub tier: DiscoveryTier,
}

impl Resource {
    pub fn new(kind: ResourceKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            url: None,
            author: None,
            source: None,
            description: None,
            duration_minutes: None,
            embedded_content: None,
            archived_from: None,
            verified: false,
            synthesized: false,
            score: 0.0,
            tier: DiscoveryTier::Discovery,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_tier(mut self, tier: DiscoveryTier) -> Self {
        self.tier = tier;
        self
    }

    /// Canonical URL, or the original one it was archived from.
    pub fn matches_url(&self, canonical: &str) -> bool {
        [self.url.as_deref(), self.archived_from.as_deref()]
            .into_iter()
            .flatten()
            .any(|u| canonical_or_raw(u) == canonical)
    }

    /// Identity used for deduplication: canonical URL, else title + author.
    pub fn identity(&self) -> String {
        match self.url.as_deref() {
            Some(url) => canonical_or_raw(url),
            None => format!(
                "{}|{}",
                self.title.trim().to_lowercase(),
                self.author.as_deref().unwrap_or("").trim().to_lowercase()
            ),
        }
    }
}

// --- Step bundle ---

/// Normalized cache key for one curriculum step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepKey {
    pub step_title: String,
    pub discipline: String,
}

impl StepKey {
    pub fn new(step_title: &str, discipline: &str) -> Self {
        Self {
            step_title: normalize_key_part(step_title),
            discipline: normalize_key_part(discipline),
        }
    }
}

fn normalize_key_part(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedStepResources {
    pub step_title: String,
    pub discipline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_video: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_reading: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mooc: Option<Resource>,
    #[serde(default)]
    pub alternatives: Vec<Resource>,
    #[serde(default)]
    pub from_cache: bool,
    pub generated_at: DateTime<Utc>,
}

impl CuratedStepResources {
    pub fn empty(step_title: impl Into<String>, discipline: impl Into<String>) -> Self {
        Self {
            step_title: step_title.into(),
            discipline: discipline.into(),
            primary_video: None,
            primary_reading: None,
            book: None,
            mooc: None,
            alternatives: Vec::new(),
            from_cache: false,
            generated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> StepKey {
        StepKey::new(&self.step_title, &self.discipline)
    }

    pub fn primary(&self, kind: ResourceKind) -> Option<&Resource> {
        match kind {
            ResourceKind::Video => self.primary_video.as_ref(),
            ResourceKind::Reading => self.primary_reading.as_ref(),
            ResourceKind::Book => self.book.as_ref(),
            ResourceKind::Mooc => self.mooc.as_ref(),
        }
    }

    fn primary_slot(&mut self, kind: ResourceKind) -> &mut Option<Resource> {
        match kind {
            ResourceKind::Video => &mut self.primary_video,
            ResourceKind::Reading => &mut self.primary_reading,
            ResourceKind::Book => &mut self.book,
            ResourceKind::Mooc => &mut self.mooc,
        }
    }

    /// Primaries first (video, reading, book, mooc), then alternatives.
    pub fn all(&self) -> impl Iterator<Item = &Resource> {
        [
            self.primary_video.as_ref(),
            self.primary_reading.as_ref(),
            self.book.as_ref(),
            self.mooc.as_ref(),
        ]
        .into_iter()
        .flatten()
        .chain(self.alternatives.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.all().next().is_none()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        let canonical = canonical_or_raw(url);
        self.all().any(|r| r.matches_url(&canonical))
    }

    /// Remove every resource pointing at `url`. A removed primary is replaced
    /// by the best-scoring alternative of the same kind. Returns whether
    /// anything was removed.
    pub fn remove_url(&mut self, url: &str) -> bool {
        let canonical = canonical_or_raw(url);
        let before = self.alternatives.len();
        self.alternatives.retain(|r| !r.matches_url(&canonical));
        let mut removed = self.alternatives.len() != before;

        for kind in ResourceKind::ALL {
            let hit = self
                .primary(kind)
                .is_some_and(|r| r.matches_url(&canonical));
            if !hit {
                continue;
            }
            removed = true;
            let promoted = self.take_best_alternative(kind);
            *self.primary_slot(kind) = promoted;
        }

        removed
    }

    /// `remove_url` for every canonical URL in `blocked` that the bundle
    /// references.
    pub fn remove_blocked(&mut self, blocked: &HashSet<String>) -> bool {
        let hits: Vec<&String> = blocked
            .iter()
            .filter(|canonical| self.all().any(|r| r.matches_url(canonical)))
            .collect();
        let mut removed = false;
        for canonical in hits {
            removed |= self.remove_url(canonical);
        }
        removed
    }

    fn take_best_alternative(&mut self, kind: ResourceKind) -> Option<Resource> {
        let index = self
            .alternatives
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == kind)
            .max_by(|(_, a), (_, b)| a.score.total_cmp(&b.score))
            .map(|(i, _)| i)?;
        Some(self.alternatives.remove(index))
    }

    /// Add an alternative, keeping the list sorted by score and capped.
    /// Resources already present (by identity) are ignored.
    pub fn push_alternative(&mut self, resource: Resource, max_alternatives: usize) -> bool {
        let identity = resource.identity();
        if self.all().any(|r| r.identity() == identity) {
            return false;
        }
        self.alternatives.push(resource);
        self.alternatives
            .sort_by(|a, b| b.score.total_cmp(&a.score));
        self.alternatives.truncate(max_alternatives);
        self.alternatives.iter().any(|r| r.identity() == identity)
    }
}

// --- Reports ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokenLinkReport {
    pub url: String,
    #[serde(default)]
    pub step_title: Option<String>,
    #[serde(default)]
    pub discipline: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BrokenLinkReport {
    /// The step whose cached bundle should drop this URL, when both parts are given.
    pub fn step_key(&self) -> Option<StepKey> {
        match (self.step_title.as_deref(), self.discipline.as_deref()) {
            (Some(title), Some(discipline)) if !title.trim().is_empty() => {
                Some(StepKey::new(title, discipline))
            }
            _ => None,
        }
    }
}
