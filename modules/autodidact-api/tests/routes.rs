use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autodidact_api::{router, AppState};
use autodidact_common::{Resource, ResourceKind};
use autodidact_resources::{
    ContentExtractor, LinkValidator, MemoryStore, OerSearch, ResourceDiscoverer,
    ResourcePipeline, StepContext,
};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wayback_client::WaybackClient;
use wiremock::MockServer;

struct DownDiscoverer;

#[async_trait]
impl ResourceDiscoverer for DownDiscoverer {
    fn name(&self) -> &str {
        "down"
    }

    async fn discover(&self, _step: &StepContext) -> anyhow::Result<Vec<Resource>> {
        anyhow::bail!("upstream unavailable")
    }

    async fn find_additional(
        &self,
        _step: &StepContext,
        _kind: ResourceKind,
        _exclude_urls: &[String],
    ) -> anyhow::Result<Vec<Resource>> {
        Ok(Vec::new())
    }
}

/// Router over an in-memory store. Every outbound call lands on `server`,
/// which answers 404 to anything not mocked.
fn app(server: &MockServer, discoverer: Option<Arc<dyn ResourceDiscoverer>>) -> (Router, Arc<MemoryStore>) {
    let timeout = Duration::from_secs(2);
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = ResourcePipeline::new(
        LinkValidator::new(
            WaybackClient::new(&server.uri()),
            &format!("{}/oembed", server.uri()),
            timeout,
            2,
        ),
        ContentExtractor::new(timeout, 500),
        OerSearch::new(&server.uri(), timeout, 500),
        store.clone(),
        store.clone(),
    );
    if let Some(d) = discoverer {
        pipeline = pipeline.with_discoverer(d);
    }
    (router(Arc::new(AppState { pipeline })), store)
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_check() {
    let server = MockServer::start().await;
    let (app, _) = app(&server, None);
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn blank_step_is_bad_request() {
    let server = MockServer::start().await;
    let (app, _) = app(&server, None);
    let (status, body) = post(
        app,
        "/api/step-resources",
        json!({"step_title": "", "discipline": "Philosophy"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("step_title"));
}

#[tokio::test]
async fn step_without_results_is_empty_bundle() {
    let server = MockServer::start().await;
    let (app, _) = app(&server, None);
    let (status, body) = post(
        app,
        "/api/step-resources",
        json!({"step_title": "Modal Logic", "discipline": "Philosophy"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["step_title"], "Modal Logic");
    assert_eq!(body["alternatives"], json!([]));
    assert_eq!(body["from_cache"], false);
}

#[tokio::test]
async fn failing_discovery_is_bad_gateway() {
    let server = MockServer::start().await;
    let (app, _) = app(&server, Some(Arc::new(DownDiscoverer)));
    let (status, body) = post(
        app,
        "/api/step-resources",
        json!({"step_title": "Modal Logic", "discipline": "Philosophy"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("upstream unavailable"));
}

#[tokio::test]
async fn no_additional_resource_is_not_found() {
    let server = MockServer::start().await;
    let (app, _) = app(&server, Some(Arc::new(DownDiscoverer)));
    let (status, body) = post(
        app,
        "/api/step-resources/additional",
        json!({
            "step_title": "Modal Logic",
            "discipline": "Philosophy",
            "kind": "mooc",
            "exclude_urls": ["https://www.edx.org/course/logic"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No additional mooc found");
}

#[tokio::test]
async fn normalize_endpoint() {
    let server = MockServer::start().await;
    let (app, _) = app(&server, None);
    let (status, body) = post(
        app,
        "/api/step-resources/normalize",
        json!({
            "step_title": "Ethics",
            "discipline": "Philosophy",
            "resources": {
                "books": [{"title": "Nicomachean Ethics", "authors": ["Aristotle"]}]
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["title"], "Nicomachean Ethics");
    assert_eq!(body["book"]["author"], "Aristotle");
}

#[tokio::test]
async fn broken_link_report_is_accepted() {
    let server = MockServer::start().await;
    let (app, store) = app(&server, None);
    let (status, _) = post(
        app.clone(),
        "/api/broken-links",
        json!({"url": "https://example.edu/gone", "reason": "404"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(store.reports().await.len(), 1);

    let (status, _) = post(app, "/api/broken-links", json!({"url": "not a url"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn prune_endpoint() {
    let server = MockServer::start().await;
    let (app, _) = app(&server, None);
    let (status, body) = post(
        app,
        "/api/syllabus/prune",
        json!({
            "syllabus": {
                "discipline": "Philosophy",
                "provenance": "web_sourced",
                "modules": [{
                    "title": "Foundations",
                    "steps": [
                        {"title": "Arguments", "estimated_minutes": 30, "depth": "core"},
                        {"title": "History", "estimated_minutes": 60, "depth": "deep"}
                    ]
                }]
            },
            "depth": "recommended"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let steps = body["modules"][0]["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["title"], "Arguments");
    assert_eq!(body["provenance"], "web_sourced");
}
