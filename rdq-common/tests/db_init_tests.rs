//! Integration tests for database initialization
//!
//! Tests cover:
//! - Automatic database file creation
//! - Idempotent schema creation
//! - Read-only opens for dry runs
//! - Storage-level constraints (flagged ⇒ review flag, append-only runs)

use rdq_common::db::{init_database, init_schema, open_database_read_only};
use rdq_common::Error;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

async fn insert_resource(pool: &SqlitePool, id: &str, status: &str, review: bool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO resources (id, name, verification_status, human_review_required, created_at, updated_at)
        VALUES (?, 'Test', ?, ?, '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(review)
    .execute(pool)
    .await
    .map(|_| ())
}

async fn insert_run(pool: &SqlitePool, id: &str, resource_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO verification_runs (
            id, resource_id, verification_type, agent_version, overall_score,
            checks_performed, decision, decision_reason, conflicts_found,
            started_at, completed_at, duration_ms
        ) VALUES (?, ?, 'periodic', 'test', 1.0, '{}', 'auto_approve', 'ok', NULL,
                  '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:01.000Z', 1000)
        "#,
    )
    .bind(id)
    .bind(resource_id)
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_init_database_creates_file_and_parent_dirs() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("rdq.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in ["resource_corrections", "resources", "schema_version", "verification_runs"] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_init_database_is_idempotent() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("rdq.db");

    let pool = init_database(&db_path).await.unwrap();
    insert_resource(&pool, "r1", "pending", false).await.unwrap();
    pool.close().await;

    // Reopening must keep existing rows
    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resources")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, rdq_common::db::SCHEMA_VERSION);
}

#[tokio::test]
async fn test_read_only_open_never_creates_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("missing.db");

    let result = open_database_read_only(&db_path).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(!db_path.exists());
}

#[tokio::test]
async fn test_read_only_open_rejects_writes() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("rdq.db");

    let writer = init_database(&db_path).await.unwrap();
    insert_resource(&writer, "r1", "pending", false).await.unwrap();

    let reader = open_database_read_only(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resources")
        .fetch_one(&reader)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert!(insert_resource(&reader, "r2", "pending", false).await.is_err());

    reader.close().await;
    writer.close().await;
}

#[tokio::test]
async fn test_flagged_requires_human_review() {
    let pool = memory_pool().await;

    assert!(insert_resource(&pool, "bad", "flagged", false).await.is_err());
    assert!(insert_resource(&pool, "good", "flagged", true).await.is_ok());
}

#[tokio::test]
async fn test_unknown_status_rejected() {
    let pool = memory_pool().await;
    assert!(insert_resource(&pool, "r1", "approved", false).await.is_err());
}

#[tokio::test]
async fn test_verification_runs_are_append_only() {
    let pool = memory_pool().await;
    insert_resource(&pool, "r1", "verified", false).await.unwrap();
    insert_run(&pool, "run-1", "r1").await.unwrap();

    let update = sqlx::query("UPDATE verification_runs SET decision_reason = 'edited' WHERE id = 'run-1'")
        .execute(&pool)
        .await;
    assert!(update.is_err(), "UPDATE on verification_runs must abort");

    let delete = sqlx::query("DELETE FROM verification_runs WHERE id = 'run-1'")
        .execute(&pool)
        .await;
    assert!(delete.is_err(), "DELETE on verification_runs must abort");

    let reason: String = sqlx::query_scalar("SELECT decision_reason FROM verification_runs WHERE id = 'run-1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(reason, "ok");
}

#[tokio::test]
async fn test_run_requires_existing_resource() {
    let pool = memory_pool().await;
    assert!(insert_run(&pool, "run-1", "missing").await.is_err());
}
