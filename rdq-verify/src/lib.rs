//! rdq-verify library - automated data-quality verification
//!
//! Periodically re-checks directory entries, scores them, decides between
//! auto-approval and human review, schedules the next check, and records
//! every run in an append-only audit log. Also exposes a one-at-a-time
//! human review gateway.
//!
//! Control flow: scheduler → agent (checks + anomaly classifier) → policy →
//! pipeline (transactional write) → audit.

use axum::Router;
use rdq_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod agent;
pub mod anomaly;
pub mod api;
pub mod audit;
pub mod batch;
pub mod checks;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod review;
pub mod scheduler;

use agent::VerificationAgent;
use checks::{BrowserLauncher, CheckRegistry};
use pipeline::VerificationPipeline;
use policy::DecisionPolicy;
use review::ReviewGateway;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub pipeline: Arc<VerificationPipeline>,
    pub review: Arc<ReviewGateway>,
}

impl AppState {
    /// Wire the pipeline and review gateway from configuration
    pub fn new(db: SqlitePool, config: &TomlConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let pipeline = build_pipeline(db.clone(), config, launcher);
        let review = ReviewGateway::new(db.clone(), config.review.clone(), config.verification.clone());
        Self {
            db,
            pipeline: Arc::new(pipeline),
            review: Arc::new(review),
        }
    }
}

/// Verification pipeline with every built-in check registered
pub fn build_pipeline(
    db: SqlitePool,
    config: &TomlConfig,
    launcher: Arc<dyn BrowserLauncher>,
) -> VerificationPipeline {
    let registry = CheckRegistry::with_defaults(&config.verification, launcher);
    let agent = VerificationAgent::new(registry, DecisionPolicy::new(config.verification.clone()));
    VerificationPipeline::new(db, agent)
}

/// Initialize the tracing subscriber; `RUST_LOG` overrides `default_level`
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info,sqlx=warn", default_level)));

    // Already initialized is fine (tests, repeated calls)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let api = Router::new()
        .route("/api/resources/:id/verify", post(api::verify_resource))
        .route("/api/review/next", get(api::next_review_candidate))
        .route("/api/review/corrections", post(api::submit_correction))
        .route("/api/runs", get(api::list_runs));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
