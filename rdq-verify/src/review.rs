//! Single-item review gateway
//!
//! Hands a human reviewer exactly one resource per call, never a list, and
//! keeps no cursor: calling twice without a correction in between returns the
//! same candidate. Corrections must cite the evidence they were made from
//! (`verification_source`); submissions without it are rejected before the
//! database is touched.
//!
//! # Priority tiers (first match wins)
//! 1. contact email missing
//! 2. no documented verification source
//! 3. no phone and no website
//! 4. routine: review requested, or last verification older than
//!    `reverify_after_days`
//!
//! Ties go to the oldest `created_at`, then `id`. Resources corrected within
//! `review_cooldown_days` are not offered unless a later automated run asked
//! for human review again.

use crate::audit;
use crate::db::{load_resource, record_correction, resource_from_row, write_resource_state, CorrectionRecord};
use crate::db::resources::RESOURCE_COLUMNS;
use chrono::{DateTime, Utc};
use rdq_common::config::{ReviewSettings, VerificationSettings};
use rdq_common::db::{Resource, VerificationRun, VerificationStatus};
use rdq_common::time;
use rdq_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

/// Fields a reviewer may need to confirm by hand, in presentation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewField {
    Website,
    Phone,
    Address,
    Services,
    Hours,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    MissingEmail,
    MissingSource,
    NoContact,
    Routine,
}

impl PriorityTier {
    fn from_index(index: i64) -> Result<Self> {
        match index {
            1 => Ok(PriorityTier::MissingEmail),
            2 => Ok(PriorityTier::MissingSource),
            3 => Ok(PriorityTier::NoContact),
            4 => Ok(PriorityTier::Routine),
            other => Err(Error::Internal(format!("Unknown review tier {}", other))),
        }
    }

    pub fn priority(&self, settings: &ReviewSettings) -> i64 {
        match self {
            PriorityTier::MissingEmail => settings.missing_email_priority,
            PriorityTier::MissingSource => settings.missing_source_priority,
            PriorityTier::NoContact => settings.no_contact_priority,
            PriorityTier::Routine => settings.routine_priority,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            PriorityTier::MissingEmail => "Missing contact email",
            PriorityTier::MissingSource => "No documented verification source",
            PriorityTier::NoContact => "No phone or website on record",
            PriorityTier::Routine => "Routine re-verification due",
        }
    }
}

/// Everything a reviewer needs to verify one resource by hand
#[derive(Debug, Clone, Serialize)]
pub struct ReviewCandidate {
    pub resource: Resource,
    pub tier: PriorityTier,
    pub priority: i64,
    pub priority_reason: String,
    /// Most recent automated run, if any
    pub last_run: Option<VerificationRun>,
    pub checks_needed: Vec<ReviewField>,
}

/// New values for the fields a reviewer corrected; an empty string clears
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldCorrections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
}

impl FieldCorrections {
    fn apply_to(&self, resource: &mut Resource) {
        let fields = [
            (&self.website, &mut resource.website),
            (&self.email, &mut resource.email),
            (&self.phone, &mut resource.phone),
            (&self.address, &mut resource.address),
            (&self.services, &mut resource.services),
            (&self.hours, &mut resource.hours),
        ];
        for (correction, field) in fields {
            if let Some(value) = correction {
                let value = value.trim();
                *field = (!value.is_empty()).then(|| value.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionSubmission {
    pub resource_id: String,
    #[serde(default)]
    pub corrections: FieldCorrections,
    /// URL or search query the corrections were verified against; mandatory
    #[serde(default)]
    pub verification_source: Option<String>,
    #[serde(default)]
    pub reviewer_notes: Option<String>,
    /// Version the reviewer was shown; a mismatch is a conflict
    #[serde(default)]
    pub row_version: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionOutcome {
    pub resource: Resource,
    pub correction: CorrectionRecord,
}

pub struct ReviewGateway {
    pool: SqlitePool,
    review: ReviewSettings,
    verification: VerificationSettings,
}

impl ReviewGateway {
    pub fn new(pool: SqlitePool, review: ReviewSettings, verification: VerificationSettings) -> Self {
        Self {
            pool,
            review,
            verification,
        }
    }

    /// The single highest-priority candidate, `None` when the queue is empty
    pub async fn next_candidate(&self, now: DateTime<Utc>) -> Result<Option<ReviewCandidate>> {
        let reverify_cutoff = time::to_db(&time::add_days(now, -self.review.reverify_after_days));
        let cooldown_cutoff = time::to_db(&time::add_days(now, -self.review.review_cooldown_days));

        let sql = format!(
            r#"
            SELECT {columns}, tier
            FROM (
                SELECT {columns},
                    CASE
                        WHEN TRIM(COALESCE(email, '')) = '' THEN 1
                        WHEN TRIM(COALESCE(verification_source, '')) = '' THEN 2
                        WHEN TRIM(COALESCE(phone, '')) = '' AND TRIM(COALESCE(website, '')) = '' THEN 3
                        WHEN human_review_required = 1
                            OR last_verified_at IS NULL
                            OR last_verified_at < ? THEN 4
                        ELSE 0
                    END AS tier
                FROM resources
                WHERE active = 1
                  AND (human_review_required = 1
                       OR human_reviewed_at IS NULL
                       OR human_reviewed_at < ?)
            )
            WHERE tier > 0
            ORDER BY
                CASE tier WHEN 1 THEN ? WHEN 2 THEN ? WHEN 3 THEN ? ELSE ? END DESC,
                created_at ASC,
                id ASC
            LIMIT 1
            "#,
            columns = RESOURCE_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(reverify_cutoff)
            .bind(cooldown_cutoff)
            .bind(self.review.missing_email_priority)
            .bind(self.review.missing_source_priority)
            .bind(self.review.no_contact_priority)
            .bind(self.review.routine_priority)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let resource = resource_from_row(&row)?;
        let tier = PriorityTier::from_index(row.try_get("tier")?)?;
        let last_run = audit::latest_run(&self.pool, &resource.id).await?;
        let checks_needed = checks_needed(&resource, last_run.as_ref());

        Ok(Some(ReviewCandidate {
            priority: tier.priority(&self.review),
            priority_reason: tier.reason().to_string(),
            tier,
            resource,
            last_run,
            checks_needed,
        }))
    }

    /// Accept a correction; the resource becomes human-verified
    pub async fn submit_correction(
        &self,
        submission: CorrectionSubmission,
        now: DateTime<Utc>,
    ) -> Result<CorrectionOutcome> {
        let source = submission
            .verification_source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(
                    "verification_source is required: cite the URL or search query used".to_string(),
                )
            })?
            .to_string();

        let current = load_resource(&self.pool, &submission.resource_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("resource {}", submission.resource_id)))?;

        if let Some(version) = submission.row_version {
            if version != current.row_version {
                return Err(Error::Conflict(format!(
                    "resource {} is at row_version {}, correction was made against {}",
                    current.id, current.row_version, version
                )));
            }
        }

        let mut updated = current.clone();
        submission.corrections.apply_to(&mut updated);
        updated.verification_source = Some(source.clone());
        updated.verification_status = VerificationStatus::Verified;
        updated.verification_confidence = Some(1.0);
        updated.human_review_required = false;
        updated.human_reviewed_at = Some(now);
        updated.last_verified_at = Some(now);
        updated.next_verification_at = Some(time::add_days(now, self.verification.verified_interval_days));
        updated.updated_at = now;

        let corrections = serde_json::to_value(&submission.corrections)
            .map_err(|e| Error::Internal(format!("Serialize corrections failed: {}", e)))?;
        let record = CorrectionRecord {
            id: Uuid::new_v4(),
            resource_id: current.id.clone(),
            corrections,
            verification_source: source,
            reviewer_notes: submission.reviewer_notes.filter(|n| !n.trim().is_empty()),
            submitted_at: now,
        };

        let mut tx = self.pool.begin().await?;
        write_resource_state(&mut *tx, &updated, current.row_version).await?;
        record_correction(&mut *tx, &record).await?;
        tx.commit().await?;
        updated.row_version = current.row_version + 1;

        info!(
            resource_id = %updated.id,
            source = %record.verification_source,
            "Correction accepted"
        );

        Ok(CorrectionOutcome {
            resource: updated,
            correction: record,
        })
    }
}

/// Fields still lacking a passing automated check or a human confirmation
pub fn checks_needed(resource: &Resource, last_run: Option<&VerificationRun>) -> Vec<ReviewField> {
    let human_confirmed = resource.human_reviewed_at.is_some();

    let website_passed = last_run
        .and_then(|run| run.checks_performed.get(crate::checks::url_reachability::CHECK_NAME))
        .is_some_and(|result| result.pass);
    let corrected_since_run = match (resource.human_reviewed_at, last_run) {
        (Some(reviewed), Some(run)) => reviewed > run.completed_at,
        (Some(_), None) => true,
        (None, _) => false,
    };

    let mut needed = Vec::new();
    if !website_passed && !corrected_since_run {
        needed.push(ReviewField::Website);
    }
    if !human_confirmed {
        needed.extend([
            ReviewField::Phone,
            ReviewField::Address,
            ReviewField::Services,
            ReviewField::Hours,
        ]);
    }
    needed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdq_common::db::{CheckResult, ChecksPerformed, Decision, VerificationType};

    fn run_at(completed_at: DateTime<Utc>, website_pass: bool) -> VerificationRun {
        let mut checks = ChecksPerformed::new();
        let result = if website_pass {
            CheckResult::passed(completed_at, 1, Some(200))
        } else {
            CheckResult::failed(completed_at, 1, Some(404), "HTTP 404 Not Found")
        };
        checks.insert("website".to_string(), result);
        VerificationRun {
            id: Uuid::new_v4(),
            resource_id: "r1".to_string(),
            verification_type: VerificationType::Periodic,
            agent_version: "test".to_string(),
            overall_score: Some(if website_pass { 1.0 } else { 0.0 }),
            checks_performed: checks,
            decision: if website_pass { Decision::AutoApprove } else { Decision::FlagForHuman },
            decision_reason: String::new(),
            conflicts_found: None,
            started_at: completed_at,
            completed_at,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_everything_needed_without_history() {
        let resource = Resource::new("Pantry", time::now());
        assert_eq!(
            checks_needed(&resource, None),
            vec![
                ReviewField::Website,
                ReviewField::Phone,
                ReviewField::Address,
                ReviewField::Services,
                ReviewField::Hours
            ]
        );
    }

    #[test]
    fn test_passing_website_run_confirms_website() {
        let resource = Resource::new("Pantry", time::now());
        let run = run_at(time::now(), true);
        let needed = checks_needed(&resource, Some(&run));
        assert!(!needed.contains(&ReviewField::Website));
        assert!(needed.contains(&ReviewField::Phone));
    }

    #[test]
    fn test_human_review_newer_than_failed_run_confirms_all() {
        let now = time::now();
        let mut resource = Resource::new("Pantry", now);
        resource.human_reviewed_at = Some(now);
        let run = run_at(time::add_days(now, -1), false);
        assert!(checks_needed(&resource, Some(&run)).is_empty());
    }

    #[test]
    fn test_failed_run_after_human_review_needs_website_again() {
        let now = time::now();
        let mut resource = Resource::new("Pantry", now);
        resource.human_reviewed_at = Some(time::add_days(now, -3));
        let run = run_at(now, false);
        assert_eq!(checks_needed(&resource, Some(&run)), vec![ReviewField::Website]);
    }

    #[test]
    fn test_field_corrections_trim_and_clear() {
        let mut resource = Resource::new("Pantry", time::now());
        resource.phone = Some("555-0100".to_string());
        resource.hours = Some("Mon-Fri".to_string());

        let corrections = FieldCorrections {
            email: Some(" info@pantry.example.org ".to_string()),
            phone: Some("".to_string()),
            ..Default::default()
        };
        corrections.apply_to(&mut resource);

        assert_eq!(resource.email.as_deref(), Some("info@pantry.example.org"));
        assert_eq!(resource.phone, None);
        assert_eq!(resource.hours.as_deref(), Some("Mon-Fri"));
    }

    #[test]
    fn test_unknown_correction_field_rejected() {
        let parsed: std::result::Result<FieldCorrections, _> =
            serde_json::from_str(r#"{"verification_status": "verified"}"#);
        assert!(parsed.is_err());
    }
}
