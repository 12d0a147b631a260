//! Resource row access
//!
//! Status writes are a compare-and-swap on `row_version`: an UPDATE that
//! matches zero rows means another writer got there first and is reported as
//! [`Error::Conflict`].

use rdq_common::db::{Resource, VerificationStatus};
use rdq_common::time;
use rdq_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

/// Column list shared by every resource SELECT
pub const RESOURCE_COLUMNS: &str = "id, name, website, email, phone, address, services, hours, \
    verification_source, active, verification_status, verification_confidence, \
    last_verified_at, next_verification_at, human_review_required, human_reviewed_at, \
    row_version, created_at, updated_at";

/// Decode one `resources` row
///
/// Malformed stored values (unknown status text, unparsable timestamps)
/// are `Error::Internal`.
pub fn resource_from_row(row: &SqliteRow) -> Result<Resource> {
    let status: String = row.try_get("verification_status")?;

    Ok(Resource {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        website: row.try_get("website")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        services: row.try_get("services")?,
        hours: row.try_get("hours")?,
        verification_source: row.try_get("verification_source")?,
        active: row.try_get("active")?,
        verification_status: status.parse::<VerificationStatus>()?,
        verification_confidence: row.try_get("verification_confidence")?,
        last_verified_at: time::from_db_opt(row.try_get("last_verified_at")?)?,
        next_verification_at: time::from_db_opt(row.try_get("next_verification_at")?)?,
        human_review_required: row.try_get("human_review_required")?,
        human_reviewed_at: time::from_db_opt(row.try_get("human_reviewed_at")?)?,
        row_version: row.try_get("row_version")?,
        created_at: time::from_db(&row.try_get::<String, _>("created_at")?)?,
        updated_at: time::from_db(&row.try_get::<String, _>("updated_at")?)?,
    })
}

/// Load a resource by id
pub async fn load_resource<'e, E>(executor: E, id: &str) -> Result<Option<Resource>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM resources WHERE id = ?", RESOURCE_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    row.as_ref().map(resource_from_row).transpose()
}

/// Insert a new resource row
pub async fn insert_resource<'e, E>(executor: E, resource: &Resource) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO resources (
            id, name, website, email, phone, address, services, hours,
            verification_source, active, verification_status, verification_confidence,
            last_verified_at, next_verification_at, human_review_required, human_reviewed_at,
            row_version, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&resource.id)
    .bind(&resource.name)
    .bind(&resource.website)
    .bind(&resource.email)
    .bind(&resource.phone)
    .bind(&resource.address)
    .bind(&resource.services)
    .bind(&resource.hours)
    .bind(&resource.verification_source)
    .bind(resource.active)
    .bind(resource.verification_status.as_str())
    .bind(resource.verification_confidence)
    .bind(resource.last_verified_at.as_ref().map(time::to_db))
    .bind(resource.next_verification_at.as_ref().map(time::to_db))
    .bind(resource.human_review_required)
    .bind(resource.human_reviewed_at.as_ref().map(time::to_db))
    .bind(resource.row_version)
    .bind(time::to_db(&resource.created_at))
    .bind(time::to_db(&resource.updated_at))
    .execute(executor)
    .await?;

    Ok(())
}

/// Write all mutable fields of `resource` if the stored row is still at
/// `expected_version`; the stored version becomes `expected_version + 1`
pub async fn write_resource_state<'e, E>(
    executor: E,
    resource: &Resource,
    expected_version: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE resources SET
            website = ?,
            email = ?,
            phone = ?,
            address = ?,
            services = ?,
            hours = ?,
            verification_source = ?,
            verification_status = ?,
            verification_confidence = ?,
            last_verified_at = ?,
            next_verification_at = ?,
            human_review_required = ?,
            human_reviewed_at = ?,
            updated_at = ?,
            row_version = row_version + 1
        WHERE id = ? AND row_version = ?
        "#,
    )
    .bind(&resource.website)
    .bind(&resource.email)
    .bind(&resource.phone)
    .bind(&resource.address)
    .bind(&resource.services)
    .bind(&resource.hours)
    .bind(&resource.verification_source)
    .bind(resource.verification_status.as_str())
    .bind(resource.verification_confidence)
    .bind(resource.last_verified_at.as_ref().map(time::to_db))
    .bind(resource.next_verification_at.as_ref().map(time::to_db))
    .bind(resource.human_review_required)
    .bind(resource.human_reviewed_at.as_ref().map(time::to_db))
    .bind(time::to_db(&resource.updated_at))
    .bind(&resource.id)
    .bind(expected_version)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!(
            "resource {} is no longer at row_version {}",
            resource.id, expected_version
        )));
    }
    Ok(())
}
