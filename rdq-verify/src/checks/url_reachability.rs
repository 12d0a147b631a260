//! URL reachability check
//!
//! Renders the resource's website in a fresh browser context instead of
//! issuing a bare HEAD request; bot protection routinely rejects non-browser
//! clients, which would flag live sites as broken.
//!
//! Probing strategy:
//! - `direct_check`: one rendered navigation, capped at `url_timeout_secs`
//! - `redundant_check`: only after a failed direct probe (and when
//!   `retry_failed_probe` is set), one more navigation in a new context
//!
//! The check passes when either probe ends on a 2xx/3xx document. When both
//! fail, the result reports the probe that got an answer from the site (a
//! status code) over one that got none, so a 403 behind a transient network
//! error still reaches the anomaly classifier.
//!
//! The top-level `rendered` diagnostic is the reporting probe's own
//! `rendered` flag, as told by the browser backend.

use super::browser::{render_page, BrowserLauncher, ContextProfile};
use super::CheckStrategy;
use async_trait::async_trait;
use rdq_common::config::VerificationSettings;
use rdq_common::db::{CheckResult, Resource};
use rdq_common::time;
use reqwest::{StatusCode, Url};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Key of this check in `checks_performed`
pub const CHECK_NAME: &str = "website";

/// Website reachability under full page rendering
pub struct UrlReachabilityCheck {
    launcher: Arc<dyn BrowserLauncher>,
    profile: ContextProfile,
    settle_cap: Duration,
    retry_failed_probe: bool,
}

/// Outcome of one rendered navigation
#[derive(Debug, Clone)]
struct Probe {
    pass: bool,
    status_code: Option<u16>,
    final_url: Option<String>,
    error: Option<String>,
    rendered: bool,
    latency_ms: u64,
}

impl Probe {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "pass": self.pass,
            "status_code": self.status_code,
            "final_url": self.final_url,
            "error": self.error,
            "rendered": self.rendered,
            "latency_ms": self.latency_ms,
        })
    }
}

impl UrlReachabilityCheck {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, settings: &VerificationSettings) -> Self {
        Self {
            launcher,
            profile: ContextProfile {
                user_agent: settings.user_agent.clone(),
            },
            settle_cap: Duration::from_secs(settings.url_timeout_secs),
            retry_failed_probe: settings.retry_failed_probe,
        }
    }

    async fn probe(&self, url: &Url) -> Probe {
        let started = Instant::now();
        let rendered = render_page(self.launcher.as_ref(), &self.profile, url, self.settle_cap).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match rendered {
            Ok(navigation) => {
                let pass = status_passes(navigation.status_code);
                Probe {
                    pass,
                    status_code: Some(navigation.status_code),
                    error: (!pass).then(|| describe_status(navigation.status_code)),
                    final_url: Some(navigation.final_url),
                    rendered: navigation.rendered,
                    latency_ms,
                }
            }
            Err(e) => Probe {
                pass: false,
                status_code: None,
                final_url: None,
                error: Some(e.to_string()),
                rendered: false,
                latency_ms,
            },
        }
    }
}

#[async_trait]
impl CheckStrategy for UrlReachabilityCheck {
    fn name(&self) -> &'static str {
        CHECK_NAME
    }

    fn target<'a>(&self, resource: &'a Resource) -> Option<&'a str> {
        resource.website_url()
    }

    async fn run(&self, target: &str) -> CheckResult {
        let checked_at = time::now();
        let started = Instant::now();

        let url = match normalize_url(target) {
            Ok(url) => url,
            Err(message) => {
                return CheckResult::failed(checked_at, 0, None, message)
                    .with_diagnostic("url", json!(target));
            }
        };

        let direct = self.probe(&url).await;
        debug!(url = %url, pass = direct.pass, status = ?direct.status_code, "Direct probe complete");

        let redundant = if !direct.pass && self.retry_failed_probe {
            let probe = self.probe(&url).await;
            debug!(url = %url, pass = probe.pass, status = ?probe.status_code, "Redundant probe complete");
            Some(probe)
        } else {
            None
        };

        let decisive = decisive_probe(&direct, redundant.as_ref());
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut result = if decisive.pass {
            CheckResult::passed(checked_at, latency_ms, decisive.status_code)
        } else {
            CheckResult::failed(
                checked_at,
                latency_ms,
                decisive.status_code,
                decisive.error.clone().unwrap_or_else(|| "unreachable".to_string()),
            )
        };

        result = result
            .with_diagnostic("url", json!(url.as_str()))
            .with_diagnostic("rendered", json!(decisive.rendered))
            .with_diagnostic("direct_check", direct.to_json());
        if let Some(probe) = &redundant {
            result = result.with_diagnostic("redundant_check", probe.to_json());
        }
        result
    }
}

/// Probe the result reports: a passing one, else one the site answered
fn decisive_probe<'a>(direct: &'a Probe, redundant: Option<&'a Probe>) -> &'a Probe {
    match redundant {
        Some(probe) if probe.pass => probe,
        Some(probe) if direct.status_code.is_none() && probe.status_code.is_some() => probe,
        _ => direct,
    }
}

/// Parse a stored website value, assuming `https://` when no scheme is given
pub fn normalize_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("invalid URL: empty".to_string());
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|e| format!("invalid URL: {} ({})", trimmed, e))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(format!("invalid URL: {} (unsupported scheme or missing host)", trimmed)),
    }
}

fn status_passes(code: u16) -> bool {
    (200..400).contains(&code)
}

fn describe_status(code: u16) -> String {
    match StatusCode::from_u16(code).ok().and_then(|s| s.canonical_reason()) {
        Some(reason) => format!("HTTP {} {}", code, reason),
        None => format!("HTTP {}", code),
    }
}
