// In-process store, used when no database is configured and in tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use autodidact_common::{canonical_or_raw, BrokenLinkReport, CuratedStepResources, StepKey};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::{BundleEdit, LinkBlacklist, ResourceCache};

#[derive(Default)]
pub struct MemoryStore {
    bundles: RwLock<HashMap<StepKey, CuratedStepResources>>,
    reports: RwLock<Vec<BrokenLinkReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<BrokenLinkReport> {
        self.reports.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.bundles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bundles.read().await.is_empty()
    }
}

#[async_trait]
impl ResourceCache for MemoryStore {
    async fn get(&self, key: &StepKey) -> Result<Option<CuratedStepResources>> {
        Ok(self.bundles.read().await.get(key).cloned())
    }

    async fn put(&self, key: &StepKey, bundle: &CuratedStepResources) -> Result<()> {
        self.bundles
            .write()
            .await
            .insert(key.clone(), bundle.clone());
        Ok(())
    }

    async fn update(&self, key: &StepKey, edit: BundleEdit<'_>) -> Result<bool> {
        let mut bundles = self.bundles.write().await;
        let Some(bundle) = bundles.get_mut(key) else {
            return Ok(false);
        };
        let changed = edit(bundle);
        if changed {
            bundle.from_cache = false;
        }
        Ok(changed)
    }
}

#[async_trait]
impl LinkBlacklist for MemoryStore {
    async fn blocked_urls(&self) -> Result<HashSet<String>> {
        Ok(self
            .reports
            .read()
            .await
            .iter()
            .map(|r| canonical_or_raw(&r.url))
            .collect())
    }

    async fn report(&self, report: &BrokenLinkReport) -> Result<()> {
        self.reports.write().await.push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodidact_common::{Resource, ResourceKind};

    #[tokio::test]
    async fn cache_round_trip_and_removal() {
        let store = MemoryStore::new();
        let mut bundle = CuratedStepResources::empty("Modal Logic", "Philosophy");
        bundle.primary_reading = Some(
            Resource::new(ResourceKind::Reading, "SEP")
                .with_url("https://plato.stanford.edu/entries/logic-modal/"),
        );
        let key = bundle.key();

        store.put(&key, &bundle).await.unwrap();
        let lookup = StepKey::new(" modal  logic", "PHILOSOPHY");
        assert_eq!(store.get(&lookup).await.unwrap(), Some(bundle));

        assert!(store
            .remove_url(&key, "http://plato.stanford.edu/entries/logic-modal")
            .await
            .unwrap());
        assert!(store.get(&key).await.unwrap().unwrap().is_empty());
        assert!(!store.remove_url(&StepKey::new("x", "y"), "https://a.org").await.unwrap());
    }

    #[tokio::test]
    async fn update_edits_in_place() {
        let store = MemoryStore::new();
        let bundle = CuratedStepResources::empty("Modal Logic", "Philosophy");
        let key = bundle.key();
        store.put(&key, &bundle).await.unwrap();

        let extra = Resource::new(ResourceKind::Book, "Modal Logic for Philosophers");
        assert!(store
            .update(&key, &|b: &mut CuratedStepResources| b.push_alternative(extra.clone(), 4))
            .await
            .unwrap());
        assert!(!store.update(&key, &|_: &mut CuratedStepResources| false).await.unwrap());
        assert!(!store
            .update(&StepKey::new("x", "y"), &|_: &mut CuratedStepResources| true)
            .await
            .unwrap());

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.alternatives.len(), 1);
    }

    #[tokio::test]
    async fn blacklist_is_canonical() {
        let store = MemoryStore::new();
        store
            .report(&BrokenLinkReport {
                url: "http://www.example.edu/notes/?utm_source=x".into(),
                step_title: None,
                discipline: None,
                reason: Some("404".into()),
            })
            .await
            .unwrap();

        let blocked = store.blocked_urls().await.unwrap();
        assert!(blocked.contains("https://example.edu/notes"));
        assert_eq!(store.reports().await.len(), 1);
    }
}
