//! Periodic batch run
//!
//! Resources are verified strictly one at a time. Every per-resource failure
//! (malformed row, persistence error, lost write race, panic) is logged with
//! the resource id, tallied, and the loop moves on; only failing to read the
//! due set at all aborts the run. A malformed row is deferred by one flagged
//! interval so it cannot hold the head of the due set.

use crate::anomaly::IpBlockAnomaly;
use crate::pipeline::VerificationPipeline;
use crate::scheduler::select_due;
use rdq_common::db::{Decision, VerificationType};
use rdq_common::time;
use rdq_common::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Maximum resources processed in this invocation
    pub limit: usize,
    /// Run the full pipeline but write nothing
    pub dry_run: bool,
}

/// Tallies printed at the end of every batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub dry_run: bool,
    pub selected: usize,
    pub verified: usize,
    pub flagged: usize,
    pub skipped: usize,
    /// Resources that could not be processed (malformed data, aborted task)
    pub errors: usize,
    /// Resources whose run could not be written; retried next run
    pub write_failures: usize,
    /// Resources changed by another writer while being checked
    pub conflicts: usize,
    pub anomalies: Vec<IpBlockAnomaly>,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Verification batch complete{}",
            if self.dry_run { " (dry run, nothing written)" } else { "" }
        )?;
        writeln!(f, "  selected:       {}", self.selected)?;
        writeln!(f, "  verified:       {}", self.verified)?;
        writeln!(f, "  flagged:        {}", self.flagged)?;
        writeln!(f, "  skipped:        {}", self.skipped)?;
        writeln!(f, "  errors:         {}", self.errors)?;
        writeln!(f, "  write failures: {}", self.write_failures)?;
        writeln!(f, "  conflicts:      {}", self.conflicts)?;
        write!(f, "  anomalies:      {}", self.anomalies.len())?;
        for anomaly in &self.anomalies {
            write!(
                f,
                "\n    ip_block resource={} url={} status={} at={}",
                anomaly.resource_id,
                anomaly.url.as_deref().unwrap_or("-"),
                anomaly.status_code,
                time::to_db(&anomaly.detected_at)
            )?;
        }
        Ok(())
    }
}

pub async fn run_batch(pipeline: Arc<VerificationPipeline>, options: BatchOptions) -> Result<BatchSummary> {
    let due = select_due(pipeline.pool(), time::now(), options.limit).await?;
    info!(selected = due.len(), limit = options.limit, dry_run = options.dry_run, "Starting verification batch");

    let mut summary = BatchSummary {
        dry_run: options.dry_run,
        selected: due.len(),
        ..Default::default()
    };

    for item in due {
        let resource = match item.decoded {
            Ok(resource) => resource,
            Err(e) => {
                error!(resource_id = %item.id, error = %e, "Cannot decode resource, skipping");
                summary.errors += 1;
                if !options.dry_run {
                    match pipeline.defer_undecodable(&item.id, time::now()).await {
                        Ok(until) => warn!(
                            resource_id = %item.id,
                            until = %time::to_db(&until),
                            "Undecodable resource deferred"
                        ),
                        Err(e) => {
                            error!(resource_id = %item.id, error = %e, "Failed to defer undecodable resource");
                            summary.write_failures += 1;
                        }
                    }
                }
                continue;
            }
        };

        let task_pipeline = pipeline.clone();
        let dry_run = options.dry_run;
        let handle = tokio::spawn(async move {
            task_pipeline
                .verify(&resource, VerificationType::Periodic, dry_run)
                .await
        });

        match handle.await {
            Ok(Ok(outcome)) => {
                match outcome.run.decision {
                    Decision::AutoApprove => summary.verified += 1,
                    Decision::FlagForHuman | Decision::AutoReject => summary.flagged += 1,
                    Decision::Skipped => summary.skipped += 1,
                }
                summary.anomalies.extend(outcome.anomalies);
            }
            Ok(Err(Error::Conflict(msg))) => {
                warn!(resource_id = %item.id, "Resource changed during verification, run discarded: {}", msg);
                summary.conflicts += 1;
            }
            Ok(Err(e)) => {
                error!(resource_id = %item.id, error = %e, "Failed to persist verification run");
                summary.write_failures += 1;
            }
            Err(e) => {
                error!(resource_id = %item.id, error = %e, "Verification task aborted");
                summary.errors += 1;
            }
        }
    }

    info!(
        verified = summary.verified,
        flagged = summary.flagged,
        skipped = summary.skipped,
        errors = summary.errors,
        write_failures = summary.write_failures,
        conflicts = summary.conflicts,
        anomalies = summary.anomalies.len(),
        "Verification batch finished"
    );
    Ok(summary)
}
