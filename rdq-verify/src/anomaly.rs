//! Anomaly classification
//!
//! A failed check can mean the listed organisation is gone, or that the
//! checker itself was refused. A website answering HTTP 403 to a fully
//! rendered navigation is treated as the second case: the result is
//! annotated with `ip_block_detected` and an [`IpBlockAnomaly`] is raised for
//! admin attention. Classification is annotation only; `pass` is never
//! changed, so scoring and the flagged decision are unaffected.

use chrono::{DateTime, Utc};
use rdq_common::db::CheckResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Status a bot filter answers with when it rejects a rendered client
pub const IP_BLOCK_STATUS: u16 = 403;

/// Diagnostic key a browser-based check sets when the probe was rendered
pub const RENDERED_DIAGNOSTIC: &str = "rendered";

/// Bot-block evidence, recorded apart from the flag reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpBlockAnomaly {
    pub resource_id: String,
    pub check: String,
    pub url: Option<String>,
    pub status_code: u16,
    pub detected_at: DateTime<Utc>,
}

/// Stateless classifier applied to every check result of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyClassifier;

impl AnomalyClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Annotate `result` in place; returns the anomaly if one was detected
    pub fn classify(
        &self,
        resource_id: &str,
        check_name: &str,
        result: &mut CheckResult,
    ) -> Option<IpBlockAnomaly> {
        if result.pass || result.status_code != Some(IP_BLOCK_STATUS) || !was_rendered(result) {
            return None;
        }

        result.ip_block_detected = true;

        let anomaly = IpBlockAnomaly {
            resource_id: resource_id.to_string(),
            check: check_name.to_string(),
            url: result
                .diagnostics
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string),
            status_code: IP_BLOCK_STATUS,
            detected_at: result.checked_at,
        };

        warn!(
            resource_id = %anomaly.resource_id,
            check = %anomaly.check,
            url = anomaly.url.as_deref().unwrap_or("-"),
            "IP block suspected: HTTP 403 despite full rendering"
        );

        Some(anomaly)
    }
}

fn was_rendered(result: &CheckResult) -> bool {
    result
        .diagnostics
        .get(RENDERED_DIAGNOSTIC)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// `conflicts_found` payload for a run, `None` when nothing was detected
pub fn conflicts_json(anomalies: &[IpBlockAnomaly]) -> Option<Value> {
    if anomalies.is_empty() {
        None
    } else {
        Some(json!({ "ip_block": anomalies }))
    }
}
