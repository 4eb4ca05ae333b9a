// Authority heuristics for ranking candidate resources.

use autodidact_common::{domain_of, Resource, ResourceKind};

const BASE: f32 = 0.5;
const SYNTHESIZED: f32 = 0.2;

/// Encyclopedias, universities, open textbooks, primary archives.
const AUTHORITATIVE: &[&str] = &[
    "plato.stanford.edu",
    "iep.utm.edu",
    "ocw.mit.edu",
    "khanacademy.org",
    "arxiv.org",
    "britannica.com",
    "jstor.org",
    "openstax.org",
];

const REPUTABLE: &[&str] = &[
    "wikipedia.org",
    "coursera.org",
    "edx.org",
    "youtube.com",
    "youtu.be",
    "archive.org",
    "gutenberg.org",
    "ted.com",
    "nature.com",
];

const LOW_QUALITY: &[&str] = &[
    "medium.com",
    "quora.com",
    "reddit.com",
    "blogspot.com",
    "wordpress.com",
    "pinterest.com",
];

fn on_domain(domain: &str, list: &[&str]) -> bool {
    list.iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
}

/// Academic TLDs, including country forms like `ox.ac.uk`.
fn is_academic(domain: &str) -> bool {
    domain.ends_with(".edu")
        || domain.ends_with(".gov")
        || domain.contains(".edu.")
        || domain.contains(".ac.")
}

/// Domain authority adjustment for a URL.
pub fn domain_authority(url: &str) -> f32 {
    let Some(domain) = domain_of(url) else {
        return 0.0;
    };
    if on_domain(&domain, AUTHORITATIVE) || is_academic(&domain) {
        0.3
    } else if on_domain(&domain, REPUTABLE) {
        0.15
    } else if on_domain(&domain, LOW_QUALITY) {
        -0.2
    } else {
        0.0
    }
}

/// Score in [0, 1]. Archived links rank by the domain they were archived
/// from, minus a staleness penalty.
pub fn score(resource: &Resource) -> f32 {
    if resource.synthesized {
        return SYNTHESIZED;
    }

    let mut score = BASE;

    let authority_url = resource
        .archived_from
        .as_deref()
        .or(resource.url.as_deref());
    if let Some(url) = authority_url {
        score += domain_authority(url);
    }

    if resource.verified {
        score += 0.1;
    }
    if resource.embedded_content.is_some() {
        score += 0.05;
    }
    if resource.author.is_some() {
        score += 0.05;
    }
    if resource.kind == ResourceKind::Video
        && resource
            .duration_minutes
            .is_some_and(|m| (5..=90).contains(&m))
    {
        score += 0.05;
    }
    if resource.archived_from.is_some() {
        score -= 0.1;
    }

    score.clamp(0.0, 1.0)
}
