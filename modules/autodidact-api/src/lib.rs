use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

use autodidact_resources::ResourcePipeline;

pub mod error;
pub mod rest;

pub use error::ApiError;

pub struct AppState {
    pub pipeline: ResourcePipeline,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Step resources
        .route("/api/step-resources", post(rest::api_step_resources))
        .route(
            "/api/step-resources/additional",
            post(rest::api_additional_resource),
        )
        .route(
            "/api/step-resources/normalize",
            post(rest::api_normalize_resources),
        )
        .route("/api/broken-links", post(rest::api_report_broken_link))
        // Syllabus
        .route("/api/syllabus/prune", post(rest::api_prune_syllabus))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Curated bundles change under reports; clients must not cache them.
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
