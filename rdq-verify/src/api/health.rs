//! Liveness endpoint
//!
//! Reports the running build and whether the shared database answers. A
//! database that does not answer makes the service unusable for every other
//! route, so that case is reported as 503.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::agent::AGENT_VERSION;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok` or `degraded`
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    /// Recorded as `agent_version` on runs written by this build
    pub agent_version: &'static str,
    pub database: &'static str,
}

/// GET /health
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database_ok = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Health check could not reach the database");
            false
        }
    };

    let report = HealthReport {
        status: if database_ok { "ok" } else { "degraded" },
        module: "rdq-verify",
        version: env!("CARGO_PKG_VERSION"),
        agent_version: AGENT_VERSION,
        database: if database_ok { "ok" } else { "unreachable" },
    };
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
