//! Verification agent
//!
//! Runs every applicable registered check for one resource, annotates the
//! results with the anomaly classifier, scores them and builds the
//! [`VerificationRun`]. The agent never touches persisted state.
//!
//! Checks execute one after another. Each runs in its own task so that a
//! panicking strategy is recorded as a failed check instead of taking the
//! batch down with it.

use crate::anomaly::{conflicts_json, AnomalyClassifier, IpBlockAnomaly};
use crate::checks::CheckRegistry;
use crate::policy::DecisionPolicy;
use rdq_common::db::{CheckResult, ChecksPerformed, Resource, VerificationRun, VerificationType};
use rdq_common::time;
use std::time::Instant;
use tracing::{debug, error};
use uuid::Uuid;

/// Recorded in every run's `agent_version`
pub const AGENT_VERSION: &str = concat!("rdq-verify/", env!("CARGO_PKG_VERSION"));

/// Run record plus the anomalies raised while producing it
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub run: VerificationRun,
    pub anomalies: Vec<IpBlockAnomaly>,
}

pub struct VerificationAgent {
    registry: CheckRegistry,
    classifier: AnomalyClassifier,
    policy: DecisionPolicy,
}

impl VerificationAgent {
    pub fn new(registry: CheckRegistry, policy: DecisionPolicy) -> Self {
        Self {
            registry,
            classifier: AnomalyClassifier::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Execute all applicable checks and produce the (unpersisted) run
    pub async fn verify(&self, resource: &Resource, kind: VerificationType) -> AgentOutput {
        let started_at = time::now();
        let clock = Instant::now();

        let mut checks = ChecksPerformed::new();
        let mut anomalies = Vec::new();

        for (strategy, target) in self.registry.applicable(resource) {
            let name = strategy.name();
            let handle = tokio::spawn(async move { strategy.run(&target).await });

            let mut result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(resource_id = %resource.id, check = name, error = %e, "Check task aborted");
                    CheckResult::failed(time::now(), 0, None, format!("check aborted: {}", e))
                }
            };

            if let Some(anomaly) = self.classifier.classify(&resource.id, name, &mut result) {
                anomalies.push(anomaly);
            }

            debug!(
                resource_id = %resource.id,
                check = name,
                pass = result.pass,
                status = ?result.status_code,
                latency_ms = result.latency_ms,
                "Check complete"
            );
            checks.insert(name.to_string(), result);
        }

        let overall_score = overall_score(&checks);
        let verdict = self.policy.decide(&checks, overall_score);

        let completed_at = time::now().max(started_at);
        let run = VerificationRun {
            id: Uuid::new_v4(),
            resource_id: resource.id.clone(),
            verification_type: kind,
            agent_version: AGENT_VERSION.to_string(),
            overall_score,
            checks_performed: checks,
            decision: verdict.decision,
            decision_reason: verdict.reason,
            conflicts_found: conflicts_json(&anomalies),
            started_at,
            completed_at,
            duration_ms: clock.elapsed().as_millis() as i64,
        };

        AgentOutput { run, anomalies }
    }
}

/// `passed / total`, `None` when no check ran
pub fn overall_score(checks: &ChecksPerformed) -> Option<f64> {
    if checks.is_empty() {
        return None;
    }
    let passed = checks.values().filter(|r| r.pass).count();
    Some(passed as f64 / checks.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckStrategy;
    use async_trait::async_trait;
    use rdq_common::config::VerificationSettings;
    use rdq_common::db::{Decision, VerificationStatus};
    use serde_json::json;
    use std::sync::Arc;

    enum Behaviour {
        Pass,
        Fail(Option<u16>),
        Panic,
    }

    struct StubCheck {
        name: &'static str,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl CheckStrategy for StubCheck {
        fn name(&self) -> &'static str {
            self.name
        }

        fn target<'a>(&self, resource: &'a Resource) -> Option<&'a str> {
            match self.name {
                "phone" => resource.phone.as_deref(),
                _ => resource.website_url(),
            }
        }

        async fn run(&self, target: &str) -> CheckResult {
            match self.behaviour {
                Behaviour::Pass => CheckResult::passed(time::now(), 3, Some(200)),
                Behaviour::Fail(status) => CheckResult::failed(time::now(), 3, status, "HTTP 403 Forbidden")
                    .with_diagnostic("url", json!(target))
                    .with_diagnostic("rendered", json!(true)),
                Behaviour::Panic => panic!("strategy bug"),
            }
        }
    }

    fn agent(checks: Vec<StubCheck>) -> VerificationAgent {
        let registry = checks
            .into_iter()
            .fold(CheckRegistry::new(), |r, c| r.register(Arc::new(c)));
        VerificationAgent::new(registry, DecisionPolicy::new(VerificationSettings::default()))
    }

    fn resource_with_website() -> Resource {
        let mut resource = Resource::new("Library", time::now());
        resource.website = Some("https://library.example.org".to_string());
        resource
    }

    #[test]
    fn test_overall_score() {
        let mut checks = ChecksPerformed::new();
        assert_eq!(overall_score(&checks), None);
        checks.insert("a".into(), CheckResult::passed(time::now(), 1, None));
        checks.insert("b".into(), CheckResult::failed(time::now(), 1, None, "x"));
        assert_eq!(overall_score(&checks), Some(0.5));
    }

    #[tokio::test]
    async fn test_no_populated_fields_yields_zero_checks() {
        let agent = agent(vec![StubCheck { name: "website", behaviour: Behaviour::Pass }]);
        let resource = Resource::new("Library", time::now());
        let output = agent.verify(&resource, VerificationType::Periodic).await;

        assert!(output.run.checks_performed.is_empty());
        assert_eq!(output.run.overall_score, None);
        assert_eq!(output.run.decision, Decision::Skipped);
        assert_eq!(resource.verification_status, VerificationStatus::Pending);
    }

    #[tokio::test]
    async fn test_passing_check_auto_approves() {
        let agent = agent(vec![StubCheck { name: "website", behaviour: Behaviour::Pass }]);
        let output = agent.verify(&resource_with_website(), VerificationType::Triggered).await;

        assert_eq!(output.run.overall_score, Some(1.0));
        assert_eq!(output.run.decision, Decision::AutoApprove);
        assert_eq!(output.run.verification_type, VerificationType::Triggered);
        assert_eq!(output.run.agent_version, AGENT_VERSION);
        assert!(output.run.completed_at >= output.run.started_at);
    }

    #[tokio::test]
    async fn test_rendered_403_records_anomaly_and_flags() {
        let agent = agent(vec![StubCheck { name: "website", behaviour: Behaviour::Fail(Some(403)) }]);
        let output = agent.verify(&resource_with_website(), VerificationType::Periodic).await;

        assert_eq!(output.run.overall_score, Some(0.0));
        assert_eq!(output.run.decision, Decision::FlagForHuman);
        assert!(output.run.checks_performed["website"].ip_block_detected);
        assert_eq!(output.anomalies.len(), 1);
        let conflicts = output.run.conflicts_found.unwrap();
        assert_eq!(conflicts["ip_block"][0]["url"], "https://library.example.org");
    }

    #[tokio::test]
    async fn test_panicking_check_becomes_failed_result() {
        let agent = agent(vec![
            StubCheck { name: "website", behaviour: Behaviour::Panic },
            StubCheck { name: "phone", behaviour: Behaviour::Pass },
        ]);
        let mut resource = resource_with_website();
        resource.phone = Some("555-0100".to_string());
        let output = agent.verify(&resource, VerificationType::Periodic).await;

        let website = &output.run.checks_performed["website"];
        assert!(!website.pass);
        assert!(website.error.as_deref().unwrap().starts_with("check aborted"));
        assert!(output.run.checks_performed["phone"].pass);
        assert_eq!(output.run.overall_score, Some(0.5));
        assert_eq!(output.run.decision, Decision::FlagForHuman);
    }
}
