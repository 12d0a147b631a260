//! Run history endpoint
//!
//! GET /api/runs?resource_id=&from=&to=&limit=
//! `from`/`to` are RFC 3339 timestamps, inclusive bounds on `completed_at`.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rdq_common::db::VerificationRun;
use serde::{Deserialize, Serialize};

use crate::audit::{query_runs, RunQuery};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RunsParams {
    pub resource_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub count: usize,
    pub runs: Vec<VerificationRun>,
}

fn parse_bound(name: &str, value: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ApiError::BadRequest(format!("{} is not an RFC 3339 timestamp: {}", name, e)))
        })
        .transpose()
}

/// GET /api/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<RunsParams>,
) -> ApiResult<Json<RunsResponse>> {
    let query = RunQuery {
        resource_id: params.resource_id,
        from: parse_bound("from", params.from.as_deref())?,
        to: parse_bound("to", params.to.as_deref())?,
        limit: params.limit,
    };

    let runs = query_runs(&state.db, &query).await?;
    Ok(Json(RunsResponse {
        count: runs.len(),
        runs,
    }))
}
