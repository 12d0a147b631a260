//! Decision and cadence policy
//!
//! A deterministic function of `(checks_performed, overall_score)`:
//!
//! | Outcome                         | Decision         | Status    | Next check          |
//! |---------------------------------|------------------|-----------|---------------------|
//! | any check failed                | `flag_for_human` | `flagged` | +flagged interval   |
//! | no failure, score >= threshold  | `auto_approve`   | `verified`| +verified interval  |
//! | zero checks                     | `skipped`        | unchanged | +skipped interval   |
//!
//! All numbers come from [`VerificationSettings`].

use chrono::{DateTime, Utc};
use rdq_common::config::VerificationSettings;
use rdq_common::db::{ChecksPerformed, Decision, Resource, VerificationRun, VerificationStatus};
use rdq_common::time;

/// Decision plus its human-readable reason
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    settings: VerificationSettings,
}

impl DecisionPolicy {
    pub fn new(settings: VerificationSettings) -> Self {
        Self { settings }
    }

    /// Decide the outcome of one run
    ///
    /// On failure the reason restates the first failing check (in check-name
    /// order). A detected IP block is always called out in the reason.
    pub fn decide(&self, checks: &ChecksPerformed, overall_score: Option<f64>) -> Verdict {
        let Some(score) = overall_score else {
            return Verdict {
                decision: Decision::Skipped,
                reason: "No checkable fields; status left unchanged".to_string(),
            };
        };

        let ip_block = checks.values().any(|r| r.ip_block_detected);

        let mut verdict = if let Some((name, result)) = checks.iter().find(|(_, r)| !r.pass) {
            let detail = result.error.as_deref().unwrap_or("check failed");
            Verdict {
                decision: Decision::FlagForHuman,
                reason: format!("{} check failed: {}", name, detail),
            }
        } else if score >= self.settings.approve_threshold {
            Verdict {
                decision: Decision::AutoApprove,
                reason: format!("All {} checks passed (score {:.2})", checks.len(), score),
            }
        } else {
            Verdict {
                decision: Decision::FlagForHuman,
                reason: format!(
                    "Score {:.2} below approve threshold {:.2}",
                    score, self.settings.approve_threshold
                ),
            }
        };

        if ip_block {
            verdict
                .reason
                .push_str("; anomaly: HTTP 403 under full rendering, possible IP block rather than a dead site");
        }
        verdict
    }

    /// Next due date for a decision made at `completed_at`
    pub fn next_check_at(&self, decision: Decision, completed_at: DateTime<Utc>) -> DateTime<Utc> {
        let days = match decision {
            Decision::AutoApprove => self.settings.verified_interval_days,
            Decision::FlagForHuman | Decision::AutoReject => self.settings.flagged_interval_days,
            Decision::Skipped => self.settings.skipped_interval_days,
        };
        time::add_days(completed_at, days)
    }

    /// Resource state after `run`; `row_version` is left for the writer to bump
    pub fn apply(&self, resource: &Resource, run: &VerificationRun) -> Resource {
        let mut next = resource.clone();
        let completed_at = run.completed_at;

        match run.decision {
            Decision::AutoApprove => {
                next.verification_status = VerificationStatus::Verified;
                next.verification_confidence = run.overall_score;
                next.human_review_required = false;
                next.last_verified_at = Some(completed_at);
            }
            Decision::FlagForHuman | Decision::AutoReject => {
                next.verification_status = VerificationStatus::Flagged;
                next.verification_confidence = run.overall_score;
                next.human_review_required = true;
                next.last_verified_at = Some(completed_at);
            }
            Decision::Skipped => {}
        }

        next.next_verification_at = Some(self.next_check_at(run.decision, completed_at));
        next.updated_at = completed_at;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdq_common::db::{CheckResult, VerificationType};
    use uuid::Uuid;

    fn policy() -> DecisionPolicy {
        DecisionPolicy::new(VerificationSettings::default())
    }

    fn checks(results: Vec<(&str, CheckResult)>) -> ChecksPerformed {
        results.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn run_with(decision: Decision, score: Option<f64>) -> VerificationRun {
        let now = time::now();
        VerificationRun {
            id: Uuid::new_v4(),
            resource_id: "r1".to_string(),
            verification_type: VerificationType::Periodic,
            agent_version: "test".to_string(),
            overall_score: score,
            checks_performed: ChecksPerformed::new(),
            decision,
            decision_reason: String::new(),
            conflicts_found: None,
            started_at: now,
            completed_at: now,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_all_passed_auto_approves() {
        let c = checks(vec![("website", CheckResult::passed(time::now(), 10, Some(200)))]);
        let verdict = policy().decide(&c, Some(1.0));
        assert_eq!(verdict.decision, Decision::AutoApprove);
    }

    #[test]
    fn test_any_failure_flags_with_first_failing_reason() {
        let c = checks(vec![
            ("address", CheckResult::passed(time::now(), 1, None)),
            ("phone", CheckResult::failed(time::now(), 1, None, "disconnected")),
            ("website", CheckResult::failed(time::now(), 1, Some(404), "HTTP 404 Not Found")),
        ]);
        let verdict = policy().decide(&c, Some(1.0 / 3.0));
        assert_eq!(verdict.decision, Decision::FlagForHuman);
        assert_eq!(verdict.reason, "phone check failed: disconnected");
    }

    #[test]
    fn test_ip_block_noted_in_reason() {
        let mut blocked = CheckResult::failed(time::now(), 1, Some(403), "HTTP 403 Forbidden");
        blocked.ip_block_detected = true;
        let verdict = policy().decide(&checks(vec![("website", blocked)]), Some(0.0));
        assert_eq!(verdict.decision, Decision::FlagForHuman);
        assert!(verdict.reason.starts_with("website check failed: HTTP 403 Forbidden"));
        assert!(verdict.reason.contains("IP block"));
    }

    #[test]
    fn test_zero_checks_skipped() {
        let verdict = policy().decide(&ChecksPerformed::new(), None);
        assert_eq!(verdict.decision, Decision::Skipped);
    }

    #[test]
    fn test_cadence_is_asymmetric() {
        let p = policy();
        let at = time::now();
        assert_eq!(p.next_check_at(Decision::AutoApprove, at), time::add_days(at, 60));
        assert_eq!(p.next_check_at(Decision::FlagForHuman, at), time::add_days(at, 7));
        assert!(p.next_check_at(Decision::Skipped, at) > at);
    }

    #[test]
    fn test_apply_flagged_requires_review() {
        let resource = Resource::new("Shelter", time::now());
        let run = run_with(Decision::FlagForHuman, Some(0.0));
        let next = policy().apply(&resource, &run);

        assert_eq!(next.verification_status, VerificationStatus::Flagged);
        assert!(next.human_review_required);
        assert_eq!(next.verification_confidence, Some(0.0));
        assert_eq!(next.next_verification_at, Some(time::add_days(run.completed_at, 7)));
    }

    #[test]
    fn test_apply_approve_sets_confidence_and_cadence() {
        let mut resource = Resource::new("Shelter", time::now());
        resource.verification_status = VerificationStatus::Flagged;
        resource.human_review_required = true;
        let run = run_with(Decision::AutoApprove, Some(1.0));
        let next = policy().apply(&resource, &run);

        assert_eq!(next.verification_status, VerificationStatus::Verified);
        assert!(!next.human_review_required);
        assert_eq!(next.verification_confidence, Some(1.0));
        assert_eq!(next.last_verified_at, Some(run.completed_at));
        assert_eq!(next.next_verification_at, Some(time::add_days(run.completed_at, 60)));
    }

    #[test]
    fn test_apply_skipped_leaves_status_unchanged() {
        let mut resource = Resource::new("Shelter", time::now());
        resource.verification_status = VerificationStatus::Verified;
        resource.verification_confidence = Some(0.9);
        let run = run_with(Decision::Skipped, None);
        let next = policy().apply(&resource, &run);

        assert_eq!(next.verification_status, VerificationStatus::Verified);
        assert_eq!(next.verification_confidence, Some(0.9));
        assert_eq!(next.last_verified_at, None);
        assert!(next.next_verification_at.unwrap() > run.completed_at);
    }
}
