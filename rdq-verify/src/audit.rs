//! Audit log of verification runs
//!
//! `verification_runs` is insert-only: the storage layer aborts any UPDATE
//! or DELETE, and nothing here issues one. A run row carries the full
//! `checks_performed` map so any decision can be replayed from the row alone.

use chrono::{DateTime, Utc};
use rdq_common::db::VerificationRun;
use rdq_common::time;
use rdq_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use uuid::Uuid;

/// Default page size for run history queries
pub const DEFAULT_RUN_LIMIT: i64 = 100;

/// Upper bound on one run history page
pub const MAX_RUN_LIMIT: i64 = 1000;

const RUN_COLUMNS: &str = "id, resource_id, verification_type, agent_version, overall_score, \
    checks_performed, decision, decision_reason, conflicts_found, started_at, completed_at, duration_ms";

/// Filter for run history; every field is optional
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    pub resource_id: Option<String>,
    /// Inclusive lower bound on `completed_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `completed_at`
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Append one run
pub async fn record_run<'e, E>(executor: E, run: &VerificationRun) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let checks = serde_json::to_string(&run.checks_performed)
        .map_err(|e| Error::Internal(format!("Serialize checks_performed failed: {}", e)))?;
    let conflicts = run.conflicts_found.as_ref().map(|v| v.to_string());

    sqlx::query(
        r#"
        INSERT INTO verification_runs (
            id, resource_id, verification_type, agent_version, overall_score,
            checks_performed, decision, decision_reason, conflicts_found,
            started_at, completed_at, duration_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run.id.to_string())
    .bind(&run.resource_id)
    .bind(run.verification_type.as_str())
    .bind(&run.agent_version)
    .bind(run.overall_score)
    .bind(checks)
    .bind(run.decision.as_str())
    .bind(&run.decision_reason)
    .bind(conflicts)
    .bind(time::to_db(&run.started_at))
    .bind(time::to_db(&run.completed_at))
    .bind(run.duration_ms)
    .execute(executor)
    .await?;

    Ok(())
}

/// Decode one `verification_runs` row
pub fn run_from_row(row: &SqliteRow) -> Result<VerificationRun> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("verification_type")?;
    let decision: String = row.try_get("decision")?;
    let checks: String = row.try_get("checks_performed")?;
    let conflicts: Option<String> = row.try_get("conflicts_found")?;

    Ok(VerificationRun {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid run id '{}': {}", id, e)))?,
        resource_id: row.try_get("resource_id")?,
        verification_type: kind.parse()?,
        agent_version: row.try_get("agent_version")?,
        overall_score: row.try_get("overall_score")?,
        checks_performed: serde_json::from_str(&checks)
            .map_err(|e| Error::Internal(format!("Invalid checks_performed for run {}: {}", id, e)))?,
        decision: decision.parse()?,
        decision_reason: row.try_get("decision_reason")?,
        conflicts_found: conflicts
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("Invalid conflicts_found for run {}: {}", id, e)))?,
        started_at: time::from_db(&row.try_get::<String, _>("started_at")?)?,
        completed_at: time::from_db(&row.try_get::<String, _>("completed_at")?)?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

/// Run history, oldest first
pub async fn query_runs(pool: &SqlitePool, query: &RunQuery) -> Result<Vec<VerificationRun>> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(Error::InvalidInput(format!(
                "from ({}) is after to ({})",
                time::to_db(&from),
                time::to_db(&to)
            )));
        }
    }
    let limit = query.limit.unwrap_or(DEFAULT_RUN_LIMIT);
    if !(1..=MAX_RUN_LIMIT).contains(&limit) {
        return Err(Error::InvalidInput(format!(
            "limit must be within 1..={}, got {}",
            MAX_RUN_LIMIT, limit
        )));
    }

    let from = query.from.as_ref().map(time::to_db);
    let to = query.to.as_ref().map(time::to_db);

    let sql = format!(
        r#"
        SELECT {}
        FROM verification_runs
        WHERE (? IS NULL OR resource_id = ?)
          AND (? IS NULL OR completed_at >= ?)
          AND (? IS NULL OR completed_at <= ?)
        ORDER BY completed_at ASC, rowid ASC
        LIMIT ?
        "#,
        RUN_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(&query.resource_id)
        .bind(&query.resource_id)
        .bind(&from)
        .bind(&from)
        .bind(&to)
        .bind(&to)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(run_from_row).collect()
}

/// Every run for one resource, oldest first
pub async fn runs_for_resource(pool: &SqlitePool, resource_id: &str) -> Result<Vec<VerificationRun>> {
    query_runs(
        pool,
        &RunQuery {
            resource_id: Some(resource_id.to_string()),
            limit: Some(MAX_RUN_LIMIT),
            ..Default::default()
        },
    )
    .await
}

/// Most recent run for a resource
pub async fn latest_run<'e, E>(executor: E, resource_id: &str) -> Result<Option<VerificationRun>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM verification_runs WHERE resource_id = ? ORDER BY completed_at DESC, rowid DESC LIMIT 1",
        RUN_COLUMNS
    );
    let row = sqlx::query(&sql).bind(resource_id).fetch_optional(executor).await?;
    row.as_ref().map(run_from_row).transpose()
}
