//! Database initialization
//!
//! Creates the schema idempotently on every startup, except for read-only
//! opens. `verification_runs` is append-only at the storage layer: triggers
//! abort any UPDATE or DELETE.

use crate::{Error, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Open (creating if needed) the database file and initialize the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the HTTP service read while a batch run writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Open an existing database file without write access
///
/// Never creates the file and runs no schema DDL. Used by dry runs, which must
/// leave the store exactly as they found it.
pub async fn open_database_read_only(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.is_file() {
        return Err(Error::NotFound(format!("database {}", db_path.display())));
    }

    let db_url = format!("sqlite://{}?mode=ro", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    info!("Opened database read-only: {}", db_path.display());
    Ok(pool)
}

/// Create all tables, indexes and triggers if missing
///
/// Safe to call repeatedly; also used directly by tests on in-memory pools.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_schema_version_table(pool).await?;
    create_resources_table(pool).await?;
    create_verification_runs_table(pool).await?;
    create_resource_corrections_table(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the resources table
///
/// The table-level CHECK makes `flagged` without `human_review_required`
/// unrepresentable.
async fn create_resources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            website TEXT,
            email TEXT,
            phone TEXT,
            address TEXT,
            services TEXT,
            hours TEXT,
            verification_source TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            verification_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (verification_status IN ('pending', 'verified', 'flagged')),
            verification_confidence REAL
                CHECK (verification_confidence IS NULL OR (verification_confidence >= 0 AND verification_confidence <= 1)),
            last_verified_at TEXT,
            next_verification_at TEXT,
            human_review_required INTEGER NOT NULL DEFAULT 0,
            human_reviewed_at TEXT,
            row_version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (verification_status <> 'flagged' OR human_review_required = 1)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_resources_next_verification ON resources(active, next_verification_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_verification_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_runs (
            id TEXT PRIMARY KEY,
            resource_id TEXT NOT NULL REFERENCES resources(id),
            verification_type TEXT NOT NULL
                CHECK (verification_type IN ('triggered', 'periodic')),
            agent_version TEXT NOT NULL,
            overall_score REAL
                CHECK (overall_score IS NULL OR (overall_score >= 0 AND overall_score <= 1)),
            checks_performed TEXT NOT NULL,
            decision TEXT NOT NULL
                CHECK (decision IN ('auto_approve', 'flag_for_human', 'auto_reject', 'skipped')),
            decision_reason TEXT NOT NULL,
            conflicts_found TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_verification_runs_resource ON verification_runs(resource_id, completed_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_verification_runs_completed ON verification_runs(completed_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS verification_runs_no_update
        BEFORE UPDATE ON verification_runs
        BEGIN
            SELECT RAISE(ABORT, 'verification_runs is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS verification_runs_no_delete
        BEFORE DELETE ON verification_runs
        BEGIN
            SELECT RAISE(ABORT, 'verification_runs is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Human corrections submitted through the review gateway
async fn create_resource_corrections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_corrections (
            id TEXT PRIMARY KEY,
            resource_id TEXT NOT NULL REFERENCES resources(id),
            corrections TEXT NOT NULL,
            verification_source TEXT NOT NULL CHECK (length(trim(verification_source)) > 0),
            reviewer_notes TEXT,
            submitted_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_resource_corrections_resource ON resource_corrections(resource_id, submitted_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
