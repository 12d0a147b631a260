//! Check Strategy Registry
//!
//! Every check is a named [`CheckStrategy`] registered in a [`CheckRegistry`].
//! The verification agent iterates the registry and only ever sees the
//! uniform [`CheckResult`] shape, so adding a check type (phone validity,
//! address geocodability, ...) is a new implementation plus one `register`
//! call, with no change to aggregation or scoring.
//!
//! # Contract
//! - `target` picks the resource field the strategy checks; `None` means the
//!   field is not populated and the check does not count toward the score.
//! - `run` never fails past its own boundary: network errors, timeouts and
//!   malformed input all come back as `pass = false` with an `error`.
//!
//! # Example
//! ```rust,ignore
//! struct PhoneFormatCheck;
//!
//! #[async_trait::async_trait]
//! impl CheckStrategy for PhoneFormatCheck {
//!     fn name(&self) -> &'static str { "phone" }
//!     fn target<'a>(&self, r: &'a Resource) -> Option<&'a str> { r.phone.as_deref() }
//!     async fn run(&self, phone: &str) -> CheckResult { /* ... */ }
//! }
//!
//! let registry = CheckRegistry::new().register(Arc::new(PhoneFormatCheck));
//! ```

pub mod browser;
pub mod url_reachability;

pub use browser::{
    render_page, BrowserContext, BrowserLauncher, ContextProfile, HttpBrowserLauncher, Navigation,
    RenderError,
};
pub use url_reachability::UrlReachabilityCheck;

use async_trait::async_trait;
use rdq_common::config::VerificationSettings;
use rdq_common::db::{CheckResult, Resource};
use std::sync::Arc;
use tracing::warn;

/// One pluggable automated check
#[async_trait]
pub trait CheckStrategy: Send + Sync {
    /// Key used in `checks_performed`
    fn name(&self) -> &'static str;

    /// Field value to check, `None` when the resource does not populate it
    fn target<'a>(&self, resource: &'a Resource) -> Option<&'a str>;

    /// Execute the check within its own bounded timeout
    async fn run(&self, target: &str) -> CheckResult;
}

/// Ordered table of check strategies, unique by name
#[derive(Clone, Default)]
pub struct CheckRegistry {
    strategies: Vec<Arc<dyn CheckStrategy>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in check
    pub fn with_defaults(settings: &VerificationSettings, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self::new().register(Arc::new(UrlReachabilityCheck::new(launcher, settings)))
    }

    /// Add a strategy; a strategy with the same name is replaced
    pub fn register(mut self, strategy: Arc<dyn CheckStrategy>) -> Self {
        if let Some(existing) = self
            .strategies
            .iter_mut()
            .find(|s| s.name() == strategy.name())
        {
            warn!(check = strategy.name(), "Replacing already registered check strategy");
            *existing = strategy;
        } else {
            self.strategies.push(strategy);
        }
        self
    }

    /// Strategies whose field the resource populates, paired with that field's value
    pub fn applicable(&self, resource: &Resource) -> Vec<(Arc<dyn CheckStrategy>, String)> {
        self.strategies
            .iter()
            .filter_map(|s| s.target(resource).map(|t| (s.clone(), t.to_string())))
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
