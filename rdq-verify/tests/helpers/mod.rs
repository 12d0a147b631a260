//! Shared fixtures for rdq-verify integration tests
//!
//! - `FakeLauncher`: scripted browser backend keyed by host, counting
//!   opened and closed contexts
//! - in-memory single-connection database with the full schema
//! - resource seeding helpers

#![allow(dead_code)]

use async_trait::async_trait;
use rdq_common::config::TomlConfig;
use rdq_common::db::{init_schema, Resource};
use rdq_common::time;
use rdq_verify::checks::{BrowserContext, BrowserLauncher, ContextProfile, Navigation, RenderError};
use rdq_verify::db::insert_resource;
use rdq_verify::pipeline::VerificationPipeline;
use rdq_verify::build_pipeline;
use reqwest::Url;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const OK_SITE: &str = "https://ok.example.org";
pub const BLOCKED_SITE: &str = "https://blocked.example.org";
pub const GONE_SITE: &str = "https://gone.example.org";
pub const SLOW_SITE: &str = "https://slow.example.org";

/// Scripted rendering launcher; every navigation reports `rendered`
///
/// | host                  | navigation result        |
/// |-----------------------|--------------------------|
/// | `ok.example.org`      | 200                      |
/// | `blocked.example.org` | 403                      |
/// | `gone.example.org`    | 404                      |
/// | `slow.example.org`    | never settles            |
/// | anything else         | connection refused error |
#[derive(Default)]
pub struct FakeLauncher {
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

struct FakeContext {
    closed: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn open_context(&self, _profile: &ContextProfile) -> Result<Box<dyn BrowserContext>, RenderError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            closed: self.closed.clone(),
        }))
    }
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn navigate(&mut self, url: &Url) -> Result<Navigation, RenderError> {
        let status_code = match url.host_str() {
            Some("ok.example.org") => 200,
            Some("blocked.example.org") => 403,
            Some("gone.example.org") => 404,
            Some("slow.example.org") => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                200
            }
            _ => return Err(RenderError::Navigation("connection refused".to_string())),
        };
        Ok(Navigation {
            status_code,
            final_url: url.to_string(),
            rendered: true,
        })
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory database; one connection that is never recycled, so every
/// query sees the same database
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory database");
    init_schema(&pool).await.expect("init schema");
    pool
}

/// Default configuration with a one-second page cap
pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.verification.url_timeout_secs = 1;
    config
}

pub fn test_pipeline(pool: &SqlitePool, launcher: Arc<FakeLauncher>) -> Arc<VerificationPipeline> {
    Arc::new(build_pipeline(pool.clone(), &test_config(), launcher))
}

/// Resource with every review-relevant field populated
pub fn complete_resource(name: &str, website: Option<&str>) -> Resource {
    let mut resource = Resource::new(name, time::now());
    resource.website = website.map(str::to_string);
    resource.email = Some(format!("{}@example.org", name.to_lowercase()));
    resource.phone = Some("555-0100".to_string());
    resource.verification_source = Some("https://registry.example.org/search".to_string());
    resource
}

pub async fn seed(pool: &SqlitePool, resource: &Resource) {
    insert_resource(pool, resource).await.expect("insert resource");
}

/// Row the model cannot decode (unparsable timestamps)
pub async fn seed_malformed(pool: &SqlitePool, id: &str) {
    sqlx::query(
        "INSERT INTO resources (id, name, created_at, updated_at) VALUES (?, 'Broken', 'garbage', 'garbage')",
    )
    .bind(id)
    .execute(pool)
    .await
    .expect("insert malformed row");
}

pub async fn run_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM verification_runs")
        .fetch_one(pool)
        .await
        .expect("count runs")
}
