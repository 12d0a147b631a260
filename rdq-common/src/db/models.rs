//! Persisted domain model
//!
//! Status, decision and run-kind fields are closed enumerations; they are
//! stored as lowercase snake_case text and parsed back on read.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Verification state of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Never decided (new entries)
    Pending,
    /// Passed automated or human verification
    Verified,
    /// Failed a check; always paired with `human_review_required`
    Flagged,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Flagged => "flagged",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "flagged" => Ok(VerificationStatus::Flagged),
            other => Err(Error::Internal(format!("Unknown verification_status '{}'", other))),
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What initiated a verification run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    /// Ad hoc run for one resource from an admin action
    Triggered,
    /// Scheduled batch run
    Periodic,
}

impl VerificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationType::Triggered => "triggered",
            VerificationType::Periodic => "periodic",
        }
    }
}

impl FromStr for VerificationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "triggered" => Ok(VerificationType::Triggered),
            "periodic" => Ok(VerificationType::Periodic),
            other => Err(Error::Internal(format!("Unknown verification_type '{}'", other))),
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on a verification run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoApprove,
    FlagForHuman,
    AutoReject,
    /// Nothing was checkable; resource status left untouched
    Skipped,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoApprove => "auto_approve",
            Decision::FlagForHuman => "flag_for_human",
            Decision::AutoReject => "auto_reject",
            Decision::Skipped => "skipped",
        }
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto_approve" => Ok(Decision::AutoApprove),
            "flag_for_human" => Ok(Decision::FlagForHuman),
            "auto_reject" => Ok(Decision::AutoReject),
            "skipped" => Ok(Decision::Skipped),
            other => Err(Error::Internal(format!("Unknown decision '{}'", other))),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory entry, restricted to the fields the verification pipeline reads or writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub services: Option<String>,
    pub hours: Option<String>,
    /// Evidence cited by the last human correction (URL or search query)
    pub verification_source: Option<String>,
    pub active: bool,
    pub verification_status: VerificationStatus,
    pub verification_confidence: Option<f64>,
    pub last_verified_at: Option<DateTime<Utc>>,
    /// `None` means never checked: eligible immediately
    pub next_verification_at: Option<DateTime<Utc>>,
    pub human_review_required: bool,
    pub human_reviewed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency token, bumped on every status write
    pub row_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// New pending resource with no contact fields
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            website: None,
            email: None,
            phone: None,
            address: None,
            services: None,
            hours: None,
            verification_source: None,
            active: true,
            verification_status: VerificationStatus::Pending,
            verification_confidence: None,
            last_verified_at: None,
            next_verification_at: None,
            human_review_required: false,
            human_reviewed_at: None,
            row_version: 0,
            created_at,
            updated_at: created_at,
        }
    }

    /// Website value if populated (blank counts as absent)
    pub fn website_url(&self) -> Option<&str> {
        populated(&self.website)
    }

    pub fn has_email(&self) -> bool {
        populated(&self.email).is_some()
    }

    pub fn has_phone(&self) -> bool {
        populated(&self.phone).is_some()
    }

    pub fn has_verification_source(&self) -> bool {
        populated(&self.verification_source).is_some()
    }
}

/// Trimmed value of an optional text field, `None` when absent or blank
pub fn populated(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Outcome of one check strategy
///
/// `diagnostics` carries free-form sub-results (e.g. `direct_check`,
/// `redundant_check`) and is flattened into the serialized object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub pass: bool,
    pub checked_at: DateTime<Utc>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set by the anomaly classifier; never changes `pass`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ip_block_detected: bool,
    #[serde(flatten)]
    pub diagnostics: BTreeMap<String, serde_json::Value>,
}

impl CheckResult {
    pub fn passed(checked_at: DateTime<Utc>, latency_ms: u64, status_code: Option<u16>) -> Self {
        Self {
            pass: true,
            checked_at,
            latency_ms,
            status_code,
            error: None,
            ip_block_detected: false,
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn failed(
        checked_at: DateTime<Utc>,
        latency_ms: u64,
        status_code: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            pass: false,
            checked_at,
            latency_ms,
            status_code,
            error: Some(error.into()),
            ip_block_detected: false,
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn with_diagnostic(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.diagnostics.insert(key.into(), value);
        self
    }
}

/// Check name → result for one run; iteration order is by check name
pub type ChecksPerformed = BTreeMap<String, CheckResult>;

/// Append-only record of one verification execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRun {
    pub id: Uuid,
    pub resource_id: String,
    pub verification_type: VerificationType,
    pub agent_version: String,
    /// `passed / total`, or `None` when no check ran
    pub overall_score: Option<f64>,
    pub checks_performed: ChecksPerformed,
    pub decision: Decision,
    pub decision_reason: String,
    pub conflicts_found: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}
