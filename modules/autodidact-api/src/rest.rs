use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::Value;

use autodidact_common::{
    prune_syllabus, BrokenLinkReport, CuratedStepResources, PruneOptions, Resource, Syllabus,
};
use autodidact_resources::{AdditionalResourceRequest, StepResourcesRequest};

use crate::{ApiError, AppState};

pub async fn api_step_resources(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StepResourcesRequest>,
) -> Result<Json<CuratedStepResources>, ApiError> {
    let bundle = state.pipeline.fetch_step_resources(&body).await?;
    Ok(Json(bundle))
}

pub async fn api_additional_resource(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AdditionalResourceRequest>,
) -> Result<Json<Resource>, ApiError> {
    state
        .pipeline
        .find_additional_resource(&body)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No additional {} found", body.kind)))
}

#[derive(Deserialize)]
pub struct NormalizeRequest {
    step_title: String,
    discipline: String,
    #[serde(alias = "resources")]
    payload: Value,
}

pub async fn api_normalize_resources(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NormalizeRequest>,
) -> Result<Json<CuratedStepResources>, ApiError> {
    let bundle = state
        .pipeline
        .normalize(&body.step_title, &body.discipline, &body.payload)?;
    Ok(Json(bundle))
}

pub async fn api_report_broken_link(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BrokenLinkReport>,
) -> Result<impl IntoResponse, ApiError> {
    state.pipeline.report_broken_link(&body).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "reported" })),
    ))
}

#[derive(Deserialize)]
pub struct PruneRequest {
    syllabus: Syllabus,
    #[serde(flatten)]
    options: PruneOptions,
}

pub async fn api_prune_syllabus(Json(body): Json<PruneRequest>) -> Json<Syllabus> {
    Json(prune_syllabus(&body.syllabus, &body.options))
}
