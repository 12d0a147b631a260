//! Review queue and correction endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rdq_common::time;

use crate::error::ApiResult;
use crate::review::{CorrectionOutcome, CorrectionSubmission};
use crate::AppState;

/// GET /api/review/next
///
/// Exactly one candidate, or 204 when nothing needs review.
pub async fn next_review_candidate(State(state): State<AppState>) -> ApiResult<Response> {
    match state.review.next_candidate(time::now()).await? {
        Some(candidate) => Ok(Json(candidate).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /api/review/corrections
pub async fn submit_correction(
    State(state): State<AppState>,
    Json(submission): Json<CorrectionSubmission>,
) -> ApiResult<(StatusCode, Json<CorrectionOutcome>)> {
    let outcome = state.review.submit_correction(submission, time::now()).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
