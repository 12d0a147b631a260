//! Verify-then-persist for one resource
//!
//! Shared by the batch job and the triggered endpoint. The resource update
//! and the run insert commit in one transaction; the update is a
//! compare-and-swap on the `row_version` read before the checks started, so
//! a concurrent writer makes this run fail with `Error::Conflict` and
//! neither row is written.

use crate::agent::VerificationAgent;
use crate::anomaly::IpBlockAnomaly;
use crate::audit;
use crate::db::{load_resource, write_resource_state};
use crate::scheduler;
use chrono::{DateTime, Utc};
use rdq_common::db::{populated, Decision, Resource, VerificationRun, VerificationType};
use rdq_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// What one pipeline pass produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run: VerificationRun,
    /// Resource state after the run (what was written, or would have been)
    pub resource: Resource,
    pub anomalies: Vec<IpBlockAnomaly>,
    /// `false` for dry runs
    pub persisted: bool,
}

/// Caller's view of a resource for a triggered run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceSnapshot {
    pub row_version: Option<i64>,
    /// Empty string means "no website on record"
    pub website: Option<String>,
}

pub struct VerificationPipeline {
    pool: SqlitePool,
    agent: VerificationAgent,
}

impl VerificationPipeline {
    pub fn new(pool: SqlitePool, agent: VerificationAgent) -> Self {
        Self { pool, agent }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Take a row the model cannot decode out of the due set for one
    /// flagged interval; returns the new due date
    pub async fn defer_undecodable(&self, id: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let until = self.agent.policy().next_check_at(Decision::FlagForHuman, now);
        scheduler::defer_undecodable(&self.pool, id, until).await?;
        Ok(until)
    }

    /// Run checks, decide, and (unless `dry_run`) persist
    pub async fn verify(
        &self,
        resource: &Resource,
        kind: VerificationType,
        dry_run: bool,
    ) -> Result<PipelineOutcome> {
        let output = self.agent.verify(resource, kind).await;
        let mut updated = self.agent.policy().apply(resource, &output.run);

        if dry_run {
            debug!(resource_id = %resource.id, decision = %output.run.decision, "Dry run, nothing written");
            return Ok(PipelineOutcome {
                run: output.run,
                resource: updated,
                anomalies: output.anomalies,
                persisted: false,
            });
        }

        let mut tx = self.pool.begin().await?;
        write_resource_state(&mut *tx, &updated, resource.row_version).await?;
        audit::record_run(&mut *tx, &output.run).await?;
        tx.commit().await?;
        updated.row_version = resource.row_version + 1;

        info!(
            resource_id = %resource.id,
            decision = %output.run.decision,
            score = ?output.run.overall_score,
            "Verification run recorded"
        );

        Ok(PipelineOutcome {
            run: output.run,
            resource: updated,
            anomalies: output.anomalies,
            persisted: true,
        })
    }

    /// Triggered verification of one resource by id
    ///
    /// A snapshot that no longer matches the stored row is a conflict: the
    /// caller is looking at stale data.
    pub async fn verify_triggered(
        &self,
        id: &str,
        snapshot: &ResourceSnapshot,
        dry_run: bool,
    ) -> Result<PipelineOutcome> {
        let resource = load_resource(&self.pool, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("resource {}", id)))?;

        if let Some(version) = snapshot.row_version {
            if version != resource.row_version {
                return Err(Error::Conflict(format!(
                    "resource {} is at row_version {}, snapshot has {}",
                    id, resource.row_version, version
                )));
            }
        }
        if let Some(website) = &snapshot.website {
            let submitted = website.trim();
            let submitted = (!submitted.is_empty()).then_some(submitted);
            if submitted != populated(&resource.website) {
                return Err(Error::Conflict(format!(
                    "resource {} website changed since snapshot",
                    id
                )));
            }
        }

        self.verify(&resource, VerificationType::Triggered, dry_run).await
    }
}
