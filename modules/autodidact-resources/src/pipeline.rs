// The curation pipeline: cache → discovery → blacklist → validation →
// enrichment → reading fallbacks → scoring → curation → cache.

use std::collections::HashSet;
use std::sync::Arc;

use autodidact_common::{
    canonical_or_raw, domain_of, BrokenLinkReport, Config, CuratedStepResources, DiscoveryTier,
    Resource, ResourceKind,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::curator::{curate, dedupe, normalize_payload};
use crate::discovery::{ReadingSynthesizer, ResourceDiscoverer};
use crate::error::{ResourceError, Result};
use crate::extractor::ContentExtractor;
use crate::oer::OerSearch;
use crate::request::{validate_url, AdditionalResourceRequest, StepContext, StepResourcesRequest};
use crate::scoring;
use crate::store::{LinkBlacklist, ResourceCache};
use crate::validator::LinkValidator;

const DEFAULT_MAX_ALTERNATIVES: usize = 6;

pub struct ResourcePipeline {
    discoverers: Vec<Arc<dyn ResourceDiscoverer>>,
    synthesizer: Option<Arc<dyn ReadingSynthesizer>>,
    validator: LinkValidator,
    extractor: ContentExtractor,
    oer: OerSearch,
    cache: Arc<dyn ResourceCache>,
    blacklist: Arc<dyn LinkBlacklist>,
    max_alternatives: usize,
}

impl ResourcePipeline {
    pub fn new(
        validator: LinkValidator,
        extractor: ContentExtractor,
        oer: OerSearch,
        cache: Arc<dyn ResourceCache>,
        blacklist: Arc<dyn LinkBlacklist>,
    ) -> Self {
        Self {
            discoverers: Vec::new(),
            synthesizer: None,
            validator,
            extractor,
            oer,
            cache,
            blacklist,
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
        }
    }

    pub fn from_config(
        config: &Config,
        cache: Arc<dyn ResourceCache>,
        blacklist: Arc<dyn LinkBlacklist>,
    ) -> Self {
        Self::new(
            LinkValidator::from_config(config),
            ContentExtractor::from_config(config),
            OerSearch::from_config(config),
            cache,
            blacklist,
        )
        .with_max_alternatives(config.max_alternatives)
    }

    /// Backends are tried in the order they are added.
    pub fn with_discoverer(mut self, discoverer: Arc<dyn ResourceDiscoverer>) -> Self {
        self.discoverers.push(discoverer);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn ReadingSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_max_alternatives(mut self, max_alternatives: usize) -> Self {
        self.max_alternatives = max_alternatives;
        self
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Curated resources for one step, from cache when possible.
    pub async fn fetch_step_resources(
        &self,
        request: &StepResourcesRequest,
    ) -> Result<CuratedStepResources> {
        let step = &request.step;
        step.validate()?;
        let key = step.key();

        let blocked = self.blocked_urls().await;

        if !request.force_refresh {
            match self.cache.get(&key).await {
                Ok(Some(mut bundle)) if !bundle.is_empty() => {
                    if bundle.remove_blocked(&blocked) {
                        info!(step = %step.step_title, "Dropped reported links from cached bundle");
                        let prune = |b: &mut CuratedStepResources| b.remove_blocked(&blocked);
                        if let Err(e) = self.cache.update(&key, &prune).await {
                            warn!(error = %e, "Cache write failed");
                        }
                    }
                    if !bundle.is_empty() {
                        info!(step = %step.step_title, discipline = %step.discipline, "Cache hit");
                        bundle.from_cache = true;
                        return Ok(bundle);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Cache read failed, treating as miss"),
            }
        }

        let (candidates, discovery_error) = match self.discover(step).await {
            Ok(found) => (found, None),
            Err(e) => {
                warn!(error = %e, "Discovery failed, falling back");
                (Vec::new(), Some(e))
            }
        };
        let discovered = candidates.len();

        let candidates = dedupe(without_blocked(candidates, &blocked));
        let mut resources = self.validator.validate(candidates).await;
        let validated = resources.len();

        let enriched = self.extractor.enrich(&mut resources).await;

        if !resources.iter().any(|r| r.kind == ResourceKind::Reading) {
            if let Some(readings) = self.fallback_readings(step, &blocked).await {
                resources.extend(readings);
            }
        }

        for r in &mut resources {
            r.score = scoring::score(r);
        }
        let bundle = curate(
            &step.step_title,
            &step.discipline,
            resources,
            self.max_alternatives,
        );

        info!(
            step = %step.step_title,
            discipline = %step.discipline,
            discovered,
            validated,
            enriched,
            total = bundle.all().count(),
            "Step resources curated"
        );

        if bundle.is_empty() {
            if let Some(e) = discovery_error {
                return Err(e);
            }
            return Ok(bundle);
        }

        if let Err(e) = self.cache.put(&key, &bundle).await {
            warn!(error = %e, "Cache write failed");
        }

        Ok(bundle)
    }

    /// One more resource of a given kind that the learner hasn't seen.
    /// Appended to the cached bundle's alternatives when one exists.
    pub async fn find_additional_resource(
        &self,
        request: &AdditionalResourceRequest,
    ) -> Result<Option<Resource>> {
        let step = &request.step;
        step.validate()?;
        let key = step.key();

        let cached = match self.cache.get(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Cache read failed");
                None
            }
        };

        let mut excluded = self.blocked_urls().await;
        excluded.extend(request.exclude_urls.iter().map(|u| canonical_or_raw(u)));
        if let Some(bundle) = &cached {
            for r in bundle.all() {
                excluded.extend(r.url.iter().map(|u| canonical_or_raw(u)));
                excluded.extend(r.archived_from.iter().map(|u| canonical_or_raw(u)));
            }
        }
        let mut exclude_list: Vec<String> = excluded.iter().cloned().collect();
        exclude_list.sort();

        let mut errors = Vec::new();
        let mut found = Vec::new();
        for discoverer in &self.discoverers {
            match discoverer
                .find_additional(step, request.kind, &exclude_list)
                .await
            {
                Ok(candidates) => {
                    let candidates: Vec<Resource> = candidates
                        .into_iter()
                        .filter(|r| r.kind == request.kind)
                        .collect();
                    let candidates = dedupe(without_blocked(candidates, &excluded));
                    found = self.validator.validate(candidates).await;
                    if !found.is_empty() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(backend = discoverer.name(), error = %e, "Additional discovery failed");
                    errors.push(format!("{}: {e:#}", discoverer.name()));
                }
            }
        }

        if found.is_empty() && request.kind == ResourceKind::Reading {
            if let Some(r) = self.oer.lookup(step).await {
                found = without_blocked(vec![r], &excluded);
            }
        }

        if found.is_empty() && !errors.is_empty() && errors.len() == self.discoverers.len() {
            return Err(ResourceError::DiscoveryFailed(errors.join("; ")));
        }

        // Links reported while discovery ran.
        let blocked = self.blocked_urls().await;
        let mut found = without_blocked(found, &blocked);

        self.extractor.enrich(&mut found).await;
        for r in &mut found {
            r.score = scoring::score(r);
        }
        let Some(best) = found.into_iter().max_by(|a, b| a.score.total_cmp(&b.score)) else {
            info!(step = %step.step_title, kind = %request.kind, "No additional resource found");
            return Ok(None);
        };

        let max_alternatives = self.max_alternatives;
        let append = |bundle: &mut CuratedStepResources| {
            let pruned = bundle.remove_blocked(&blocked);
            bundle.push_alternative(best.clone(), max_alternatives) || pruned
        };
        if let Err(e) = self.cache.update(&key, &append).await {
            warn!(error = %e, "Cache write failed");
        }

        info!(step = %step.step_title, kind = %request.kind, title = %best.title, "Additional resource found");
        Ok(Some(best))
    }

    /// Blacklist a URL and drop it from the named step's cached bundle.
    pub async fn report_broken_link(&self, report: &BrokenLinkReport) -> Result<()> {
        validate_url(&report.url)?;

        self.blacklist.report(report).await?;

        if let Some(key) = report.step_key() {
            match self.cache.remove_url(&key, &report.url).await {
                Ok(removed) => info!(url = %report.url, removed, "Broken link reported"),
                Err(e) => warn!(url = %report.url, error = %e, "Failed to update cached bundle"),
            }
        } else {
            info!(url = %report.url, "Broken link reported");
        }

        Ok(())
    }

    /// Reshape a stored or foreign payload into the unified bundle.
    pub fn normalize(
        &self,
        step_title: &str,
        discipline: &str,
        payload: &Value,
    ) -> Result<CuratedStepResources> {
        StepContext {
            step_title: step_title.to_string(),
            discipline: discipline.to_string(),
            ..Default::default()
        }
        .validate()?;
        Ok(normalize_payload(
            step_title,
            discipline,
            payload,
            self.max_alternatives,
        ))
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn blocked_urls(&self) -> HashSet<String> {
        self.blacklist.blocked_urls().await.unwrap_or_else(|e| {
            warn!(error = %e, "Blacklist read failed");
            HashSet::new()
        })
    }

    /// First backend that yields candidates wins. Fails only when every
    /// backend failed.
    async fn discover(&self, step: &StepContext) -> Result<Vec<Resource>> {
        let mut errors = Vec::new();

        for discoverer in &self.discoverers {
            match discoverer.discover(step).await {
                Ok(found) if !found.is_empty() => {
                    info!(backend = discoverer.name(), candidates = found.len(), "Discovery succeeded");
                    return Ok(found);
                }
                Ok(_) => info!(backend = discoverer.name(), "Discovery returned nothing"),
                Err(e) => {
                    warn!(backend = discoverer.name(), error = %e, "Discovery backend failed");
                    errors.push(format!("{}: {e:#}", discoverer.name()));
                }
            }
        }

        if !errors.is_empty() && errors.len() == self.discoverers.len() {
            return Err(ResourceError::DiscoveryFailed(errors.join("; ")));
        }
        Ok(Vec::new())
    }

    /// Extraction, then OER search, then synthesis. Stops at the first tier
    /// that produces a reading.
    async fn fallback_readings(
        &self,
        step: &StepContext,
        blocked: &HashSet<String>,
    ) -> Option<Vec<Resource>> {
        let extracted = self.extract_sources(step, blocked).await;
        if !extracted.is_empty() {
            info!(count = extracted.len(), tier = "extraction", "Reading fallback");
            return Some(extracted);
        }

        if let Some(r) = self.oer.lookup(step).await {
            if !is_blocked(&r, blocked) {
                info!(title = %r.title, tier = "oer_search", "Reading fallback");
                return Some(vec![r]);
            }
        }

        let synthesizer = self.synthesizer.as_ref()?;
        match synthesizer.synthesize(step).await {
            Ok(Some(r)) => {
                info!(tier = "synthesis", "Reading fallback");
                Some(vec![r])
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Reading synthesis failed");
                None
            }
        }
    }

    async fn extract_sources(
        &self,
        step: &StepContext,
        blocked: &HashSet<String>,
    ) -> Vec<Resource> {
        let mut out = Vec::new();
        for url in &step.source_urls {
            if blocked.contains(&canonical_or_raw(url)) {
                continue;
            }
            let Some(page) = self.extractor.extract(url).await else {
                continue;
            };
            let title = page
                .title
                .unwrap_or_else(|| step.step_title.trim().to_string());
            let mut r = Resource::new(ResourceKind::Reading, title)
                .with_url(url.clone())
                .with_tier(DiscoveryTier::Extraction);
            r.source = domain_of(url);
            r.embedded_content = Some(page.snippet);
            r.verified = true;
            out.push(r);
        }
        out
    }
}

fn is_blocked(resource: &Resource, blocked: &HashSet<String>) -> bool {
    [resource.url.as_deref(), resource.archived_from.as_deref()]
        .into_iter()
        .flatten()
        .any(|u| blocked.contains(&canonical_or_raw(u)))
}

fn without_blocked(resources: Vec<Resource>, blocked: &HashSet<String>) -> Vec<Resource> {
    if blocked.is_empty() {
        return resources;
    }
    resources
        .into_iter()
        .filter(|r| !is_blocked(r, blocked))
        .collect()
}
