use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autodidact_common::{
    BrokenLinkReport, CuratedStepResources, DiscoveryTier, Resource, ResourceKind, StepKey,
};
use autodidact_resources::{
    AdditionalResourceRequest, ContentExtractor, KnownSource, LinkBlacklist, LinkValidator,
    MemoryStore, OerSearch, ReadingSynthesizer, ResourceCache, ResourceDiscoverer,
    ResourceError, ResourcePipeline, StepContext, StepResourcesRequest,
};
use tokio::sync::Notify;
use wayback_client::WaybackClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// --- Stubs ---

struct StubDiscoverer {
    name: &'static str,
    found: Vec<Resource>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubDiscoverer {
    fn returning(name: &'static str, found: Vec<Resource>) -> Arc<Self> {
        Arc::new(Self {
            name,
            found,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            found: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceDiscoverer for StubDiscoverer {
    fn name(&self) -> &str {
        self.name
    }

    async fn discover(&self, _step: &StepContext) -> anyhow::Result<Vec<Resource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(self.found.clone())
    }

    async fn find_additional(
        &self,
        step: &StepContext,
        _kind: ResourceKind,
        _exclude_urls: &[String],
    ) -> anyhow::Result<Vec<Resource>> {
        self.discover(step).await
    }
}

/// Holds `find_additional` open until released, so other operations can run
/// in between.
struct GatedDiscoverer {
    found: Vec<Resource>,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ResourceDiscoverer for GatedDiscoverer {
    fn name(&self) -> &str {
        "gated"
    }

    async fn discover(&self, _step: &StepContext) -> anyhow::Result<Vec<Resource>> {
        Ok(self.found.clone())
    }

    async fn find_additional(
        &self,
        _step: &StepContext,
        _kind: ResourceKind,
        _exclude_urls: &[String],
    ) -> anyhow::Result<Vec<Resource>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.found.clone())
    }
}

struct StubSynthesizer;

#[async_trait]
impl ReadingSynthesizer for StubSynthesizer {
    async fn synthesize(&self, step: &StepContext) -> anyhow::Result<Option<Resource>> {
        let mut r = Resource::new(ResourceKind::Reading, format!("{}: a primer", step.step_title))
            .with_tier(DiscoveryTier::Synthesis);
        r.synthesized = true;
        r.embedded_content = Some("A short primer.".into());
        Ok(Some(r))
    }
}

// --- Harness ---

const WIKI_PAGE: &str = r#"<html><head><title>Modal logic - Wikipedia</title></head><body>
<div class="mw-parser-output"><p><b>Modal logic</b> is a kind of logic used to represent
statements about necessity and possibility.</p></div></body></html>"#;

fn pipeline(server: &MockServer, store: &Arc<MemoryStore>) -> ResourcePipeline {
    let timeout = Duration::from_secs(2);
    ResourcePipeline::new(
        LinkValidator::new(
            WaybackClient::new(&server.uri()),
            &format!("{}/oembed", server.uri()),
            timeout,
            4,
        ),
        ContentExtractor::new(timeout, 1200).with_host("127.0.0.1", KnownSource::Wikipedia),
        OerSearch::new(&server.uri(), timeout, 1200),
        store.clone(),
        store.clone(),
    )
    .with_max_alternatives(4)
}

async fn mount_live(server: &MockServer, route: &str) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn mount_dead(server: &MockServer, route: &str) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn step(source_urls: Vec<String>) -> StepContext {
    StepContext {
        step_title: "Modal Logic".into(),
        discipline: "Philosophy".into(),
        source_urls,
        ..Default::default()
    }
}

fn request(step: StepContext, force_refresh: bool) -> StepResourcesRequest {
    StepResourcesRequest {
        step,
        force_refresh,
    }
}

fn reading(title: &str, url: String) -> Resource {
    Resource::new(ResourceKind::Reading, title).with_url(url)
}

// --- fetch_step_resources ---

#[tokio::test]
async fn curates_validated_resources_and_caches_them() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_live(&server, "/primer").await;
    mount_dead(&server, "/dead").await;
    Mock::given(method("GET"))
        .and(path("/oembed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"title": "t"})))
        .mount(&server)
        .await;

    let discoverer = StubDiscoverer::returning(
        "stub",
        vec![
            Resource::new(ResourceKind::Video, "Possible worlds")
                .with_url("https://www.youtube.com/watch?v=abcdefghijk"),
            reading("Primer", format!("{base}/primer")),
            reading("Dead", format!("{base}/dead")),
            Resource::new(ResourceKind::Book, "Modal Logic for Philosophers")
                .with_author("James Garson"),
        ],
    );
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store).with_discoverer(discoverer.clone());

    let bundle = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();

    assert!(!bundle.from_cache);
    assert!(bundle.primary_video.as_ref().unwrap().verified);
    let primary = bundle.primary_reading.as_ref().unwrap();
    assert_eq!(primary.title, "Primer");
    assert!(primary.verified);
    assert!(primary.score > 0.5);
    assert_eq!(bundle.book.as_ref().unwrap().author.as_deref(), Some("James Garson"));
    assert!(!bundle.contains_url(&format!("{base}/dead")));

    // Second call is served from the cache without discovery.
    let again = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();
    assert!(again.from_cache);
    assert_eq!(again.primary_reading, bundle.primary_reading);
    assert_eq!(discoverer.calls(), 1);

    // force_refresh bypasses it.
    pipeline
        .fetch_step_resources(&request(step(vec![]), true))
        .await
        .unwrap();
    assert_eq!(discoverer.calls(), 2);
}

#[tokio::test]
async fn backends_are_tried_in_order() {
    let server = MockServer::start().await;
    mount_live(&server, "/primer").await;

    let down = StubDiscoverer::failing("down");
    let up = StubDiscoverer::returning("up", vec![reading("Primer", format!("{}/primer", server.uri()))]);
    let unused = StubDiscoverer::returning("unused", vec![]);
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store)
        .with_discoverer(down.clone())
        .with_discoverer(up.clone())
        .with_discoverer(unused.clone());

    let bundle = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();

    assert_eq!(bundle.primary_reading.unwrap().title, "Primer");
    assert_eq!((down.calls(), up.calls(), unused.calls()), (1, 1, 0));
}

#[tokio::test]
async fn all_backends_failing_with_no_fallback_is_an_error() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store)
        .with_discoverer(StubDiscoverer::failing("a"))
        .with_discoverer(StubDiscoverer::failing("b"));

    let err = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap_err();
    match err {
        ResourceError::DiscoveryFailed(message) => {
            assert!(message.contains("a is down"));
            assert!(message.contains("b is down"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_results_are_not_cached() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store).with_discoverer(StubDiscoverer::returning("empty", vec![]));

    let bundle = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();
    assert!(bundle.is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn blank_step_is_rejected() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store);

    let mut bad = step(vec![]);
    bad.discipline = "  ".into();
    let err = pipeline
        .fetch_step_resources(&request(bad, false))
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::InvalidRequest(_)));
}

// --- Reading fallback tiers ---

#[tokio::test]
async fn extraction_tier_reads_step_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/Modal_logic"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WIKI_PAGE))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store).with_discoverer(StubDiscoverer::returning("empty", vec![]));

    let source = format!("{}/wiki/Modal_logic", server.uri());
    let bundle = pipeline
        .fetch_step_resources(&request(step(vec![source.clone()]), false))
        .await
        .unwrap();

    let r = bundle.primary_reading.unwrap();
    assert_eq!(r.tier, DiscoveryTier::Extraction);
    assert_eq!(r.title, "Modal logic");
    assert_eq!(r.url.as_deref(), Some(source.as_str()));
    assert!(r
        .embedded_content
        .unwrap()
        .starts_with("Modal logic is a kind of logic"));
}

#[tokio::test]
async fn oer_tier_when_no_sources_extract() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rest_v1/page/summary/Modal_Logic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "standard",
            "title": "Modal logic",
            "extract": "Modal logic is a kind of logic used to represent statements about necessity and possibility.",
            "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Modal_logic"}}
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store)
        .with_discoverer(StubDiscoverer::returning("empty", vec![]))
        .with_synthesizer(Arc::new(StubSynthesizer));

    let bundle = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();

    let r = bundle.primary_reading.unwrap();
    assert_eq!(r.tier, DiscoveryTier::OerSearch);
    assert_eq!(r.url.as_deref(), Some("https://en.wikipedia.org/wiki/Modal_logic"));
    assert!(bundle.alternatives.is_empty());
}

#[tokio::test]
async fn synthesis_is_the_last_resort() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store)
        .with_discoverer(StubDiscoverer::failing("down"))
        .with_synthesizer(Arc::new(StubSynthesizer));

    let bundle = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();

    let r = bundle.primary_reading.as_ref().unwrap();
    assert!(r.synthesized);
    assert!(r.url.is_none());
    assert_eq!(r.tier, DiscoveryTier::Synthesis);
    assert_eq!(r.score, 0.2);
    assert!(!store.is_empty().await);
}

// --- Blacklist ---

#[tokio::test]
async fn reported_links_leave_cache_and_future_results() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_live(&server, "/bad").await;
    mount_live(&server, "/good").await;

    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store).with_discoverer(StubDiscoverer::returning(
        "stub",
        vec![
            reading("Bad", format!("{base}/bad")),
            reading("Good", format!("{base}/good")),
        ],
    ));

    let bundle = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();
    assert!(bundle.contains_url(&format!("{base}/bad")));

    pipeline
        .report_broken_link(&BrokenLinkReport {
            url: format!("{base}/bad/"),
            step_title: Some("modal logic".into()),
            discipline: Some("PHILOSOPHY".into()),
            reason: Some("404".into()),
        })
        .await
        .unwrap();

    let cached = store
        .get(&StepKey::new("Modal Logic", "Philosophy"))
        .await
        .unwrap()
        .unwrap();
    assert!(!cached.contains_url(&format!("{base}/bad")));
    assert!(cached.contains_url(&format!("{base}/good")));
    assert_eq!(store.blocked_urls().await.unwrap().len(), 1);

    let fresh = pipeline
        .fetch_step_resources(&request(step(vec![]), true))
        .await
        .unwrap();
    assert!(!fresh.contains_url(&format!("{base}/bad")));
    assert_eq!(fresh.all().count(), 1);
}

#[tokio::test]
async fn cache_hits_drop_links_reported_without_a_step() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_live(&server, "/bad").await;
    mount_live(&server, "/good").await;

    let discoverer = StubDiscoverer::returning(
        "stub",
        vec![
            reading("Bad", format!("{base}/bad")),
            reading("Good", format!("{base}/good")),
        ],
    );
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store).with_discoverer(discoverer.clone());

    let bundle = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();
    assert!(bundle.contains_url(&format!("{base}/bad")));

    pipeline
        .report_broken_link(&BrokenLinkReport {
            url: format!("{base}/bad"),
            step_title: None,
            discipline: None,
            reason: None,
        })
        .await
        .unwrap();

    let hit = pipeline
        .fetch_step_resources(&request(step(vec![]), false))
        .await
        .unwrap();
    assert!(hit.from_cache);
    assert!(!hit.contains_url(&format!("{base}/bad")));
    assert_eq!(hit.primary_reading.as_ref().unwrap().title, "Good");
    assert_eq!(discoverer.calls(), 1);

    let stored = store
        .get(&StepKey::new("Modal Logic", "Philosophy"))
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.contains_url(&format!("{base}/bad")));
}

#[tokio::test]
async fn report_during_additional_search_is_not_undone() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_live(&server, "/fresh").await;

    let store = Arc::new(MemoryStore::new());
    let mut cached = CuratedStepResources::empty("Modal Logic", "Philosophy");
    cached.primary_reading = Some(reading("Bad", format!("{base}/bad")));
    cached.alternatives = vec![reading("Good", format!("{base}/good"))];
    store.put(&cached.key(), &cached).await.unwrap();

    let gate = Arc::new(GatedDiscoverer {
        found: vec![reading("Fresh", format!("{base}/fresh"))],
        entered: Notify::new(),
        release: Notify::new(),
    });
    let pipeline = pipeline(&server, &store).with_discoverer(gate.clone());

    let additional_request = AdditionalResourceRequest {
        step: step(vec![]),
        kind: ResourceKind::Reading,
        exclude_urls: vec![],
    };
    let report = async {
        gate.entered.notified().await;
        pipeline
            .report_broken_link(&BrokenLinkReport {
                url: format!("{base}/bad"),
                step_title: Some("Modal Logic".into()),
                discipline: Some("Philosophy".into()),
                reason: None,
            })
            .await
            .unwrap();
        gate.release.notify_one();
    };
    let (found, ()) = tokio::join!(pipeline.find_additional_resource(&additional_request), report);

    assert_eq!(found.unwrap().unwrap().title, "Fresh");
    let stored = store.get(&cached.key()).await.unwrap().unwrap();
    assert!(!stored.contains_url(&format!("{base}/bad")));
    assert_eq!(stored.primary_reading.as_ref().unwrap().title, "Good");
    assert!(stored.contains_url(&format!("{base}/fresh")));
}

#[tokio::test]
async fn report_requires_http_url() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store);

    let err = pipeline
        .report_broken_link(&BrokenLinkReport {
            url: "ftp://example.com/file".into(),
            step_title: None,
            discipline: None,
            reason: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::InvalidRequest(_)));
    assert!(store.reports().await.is_empty());
}

// --- find_additional_resource ---

#[tokio::test]
async fn additional_resource_skips_known_urls_and_extends_cache() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_live(&server, "/seen").await;
    mount_live(&server, "/excluded").await;
    mount_live(&server, "/fresh").await;

    let store = Arc::new(MemoryStore::new());
    let mut cached = CuratedStepResources::empty("Modal Logic", "Philosophy");
    cached.primary_reading = Some(reading("Seen", format!("{base}/seen")));
    store.put(&cached.key(), &cached).await.unwrap();

    let pipeline = pipeline(&server, &store).with_discoverer(StubDiscoverer::returning(
        "stub",
        vec![
            reading("Seen again", format!("{base}/seen")),
            reading("Excluded", format!("{base}/excluded")),
            reading("Fresh", format!("{base}/fresh")),
            Resource::new(ResourceKind::Video, "Wrong kind")
                .with_url("https://www.youtube.com/watch?v=abcdefghijk"),
        ],
    ));

    let found = pipeline
        .find_additional_resource(&AdditionalResourceRequest {
            step: step(vec![]),
            kind: ResourceKind::Reading,
            exclude_urls: vec![format!("{base}/excluded")],
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.title, "Fresh");
    assert!(found.verified);

    let cached = store.get(&cached.key()).await.unwrap().unwrap();
    assert_eq!(cached.alternatives.len(), 1);
    assert_eq!(cached.alternatives[0].title, "Fresh");
}

#[tokio::test]
async fn additional_resource_none_found() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store).with_discoverer(StubDiscoverer::returning("empty", vec![]));

    let found = pipeline
        .find_additional_resource(&AdditionalResourceRequest {
            step: step(vec![]),
            kind: ResourceKind::Mooc,
            exclude_urls: vec![],
        })
        .await
        .unwrap();
    assert!(found.is_none());
}

// --- normalize ---

#[tokio::test]
async fn normalize_reshapes_legacy_payloads() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&server, &store);

    let bundle = pipeline
        .normalize(
            "Modal Logic",
            "Philosophy",
            &serde_json::json!({
                "readings": [{"title": "SEP", "url": "https://plato.stanford.edu/entries/logic-modal/"}],
                "videos": [{"title": "Lecture", "link": "https://youtu.be/abcdefghijk"}]
            }),
        )
        .unwrap();
    assert_eq!(bundle.primary_reading.unwrap().title, "SEP");
    assert_eq!(bundle.primary_video.unwrap().title, "Lecture");

    assert!(matches!(
        pipeline.normalize("", "Philosophy", &serde_json::json!({})),
        Err(ResourceError::InvalidRequest(_))
    ));
}
