//! Human correction audit trail (`resource_corrections`)

use chrono::{DateTime, Utc};
use rdq_common::time;
use rdq_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;

/// One accepted correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub id: Uuid,
    pub resource_id: String,
    /// Field name → new value, only the fields the reviewer changed
    pub corrections: serde_json::Value,
    pub verification_source: String,
    pub reviewer_notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

pub async fn record_correction<'e, E>(executor: E, record: &CorrectionRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO resource_corrections (
            id, resource_id, corrections, verification_source, reviewer_notes, submitted_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(&record.resource_id)
    .bind(record.corrections.to_string())
    .bind(&record.verification_source)
    .bind(&record.reviewer_notes)
    .bind(time::to_db(&record.submitted_at))
    .execute(executor)
    .await?;

    Ok(())
}

/// Corrections for a resource, oldest first
pub async fn corrections_for_resource<'e, E>(
    executor: E,
    resource_id: &str,
) -> Result<Vec<CorrectionRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, resource_id, corrections, verification_source, reviewer_notes, submitted_at
        FROM resource_corrections
        WHERE resource_id = ?
        ORDER BY submitted_at ASC, id ASC
        "#,
    )
    .bind(resource_id)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| -> Result<CorrectionRecord> {
            let id: String = row.try_get("id")?;
            let corrections: String = row.try_get("corrections")?;
            Ok(CorrectionRecord {
                id: Uuid::parse_str(&id).map_err(|e| {
                    rdq_common::Error::Internal(format!("Invalid correction id '{}': {}", id, e))
                })?,
                resource_id: row.try_get("resource_id")?,
                corrections: serde_json::from_str(&corrections).map_err(|e| {
                    rdq_common::Error::Internal(format!("Invalid corrections JSON: {}", e))
                })?,
                verification_source: row.try_get("verification_source")?,
                reviewer_notes: row.try_get("reviewer_notes")?,
                submitted_at: time::from_db(&row.try_get::<String, _>("submitted_at")?)?,
            })
        })
        .collect()
}
