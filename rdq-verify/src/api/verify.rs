//! Triggered verification endpoint
//!
//! POST /api/resources/:id/verify runs checks, decision and persistence for
//! one resource synchronously and returns the run with the updated resource.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiResult;
use crate::pipeline::{PipelineOutcome, ResourceSnapshot};
use crate::AppState;

/// Request body; every field is optional, `{}` verifies unconditionally
#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    /// `row_version` the caller last saw
    #[serde(default)]
    pub row_version: Option<i64>,
    /// Website the caller last saw
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// POST /api/resources/:id/verify
pub async fn verify_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<PipelineOutcome>> {
    info!(resource_id = %id, dry_run = request.dry_run, "Triggered verification requested");

    let snapshot = ResourceSnapshot {
        row_version: request.row_version,
        website: request.website,
    };
    let outcome = state
        .pipeline
        .verify_triggered(&id, &snapshot, request.dry_run)
        .await?;

    Ok(Json(outcome))
}
