//! Due-set selection
//!
//! Picks up to `limit` active resources whose `next_verification_at` is unset
//! or not after `now`. Never-checked resources come first, then the most
//! overdue; `created_at` and `id` break ties so the order is total.

use crate::db::resources::{resource_from_row, RESOURCE_COLUMNS};
use chrono::{DateTime, Utc};
use rdq_common::db::Resource;
use rdq_common::time;
use rdq_common::Result;
use sqlx::{Row, SqlitePool};

/// One selected row; decoding is deferred so a malformed row is reported per
/// resource instead of failing the whole selection
#[derive(Debug)]
pub struct DueItem {
    pub id: String,
    pub decoded: Result<Resource>,
}

pub async fn select_due(pool: &SqlitePool, now: DateTime<Utc>, limit: usize) -> Result<Vec<DueItem>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM resources
        WHERE active = 1
          AND (next_verification_at IS NULL OR next_verification_at <= ?)
        ORDER BY next_verification_at IS NOT NULL, next_verification_at ASC, created_at ASC, id ASC
        LIMIT ?
        "#,
        RESOURCE_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(time::to_db(&now))
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| DueItem {
            id: row.try_get::<String, _>("id").unwrap_or_default(),
            decoded: resource_from_row(row),
        })
        .collect())
}

/// Push back the due date of a row that cannot be decoded
///
/// Touches `next_verification_at` only, by id, so it works on rows the model
/// rejects. Without it such a row would stay at the head of every selection.
pub async fn defer_undecodable(pool: &SqlitePool, id: &str, until: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE resources SET next_verification_at = ? WHERE id = ?")
        .bind(time::to_db(&until))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
