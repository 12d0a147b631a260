//! Configuration loading and path resolution
//!
//! Bootstrap configuration comes from a single TOML file. Every section and
//! field is optional; a missing file yields built-in defaults, a malformed
//! file is a fatal configuration error.
//!
//! # File location priority
//! 1. Explicit path (command-line `--config`)
//! 2. `RDQ_CONFIG` environment variable
//! 3. `~/.config/rdq/config.toml`, then `/etc/rdq/config.toml`
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "RDQ_CONFIG";

/// Environment variable naming the database file
pub const DATABASE_ENV_VAR: &str = "RDQ_DATABASE";

/// Environment variable naming the root data folder
pub const ROOT_FOLDER_ENV_VAR: &str = "RDQ_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "rdq.db";

/// Browser user agent presented by the URL reachability check
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Root folder holding the database when `database_path` is unset
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub verification: VerificationSettings,

    #[serde(default)]
    pub review: ReviewSettings,
}

/// HTTP server bind address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Thresholds and cadence for automated verification
///
/// Every tunable of the decision and cadence policy lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// Minimum score for `auto_approve` when no check failed
    pub approve_threshold: f64,
    /// Days until the next check after a verified outcome
    pub verified_interval_days: i64,
    /// Days until the next check after a flagged outcome
    pub flagged_interval_days: i64,
    /// Days until the next check when nothing was checkable
    pub skipped_interval_days: i64,
    /// Resources processed per batch run when `--limit` is not given
    pub default_batch_limit: usize,
    /// Hard cap for one rendered page load
    pub url_timeout_secs: u64,
    /// User agent presented to checked websites
    pub user_agent: String,
    /// Run one redundant probe in a fresh context after a failed direct probe
    pub retry_failed_probe: bool,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            approve_threshold: 0.8,
            verified_interval_days: 60,
            flagged_interval_days: 7,
            skipped_interval_days: 60,
            default_batch_limit: 50,
            url_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry_failed_probe: true,
        }
    }
}

/// Human review queue weights and windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettings {
    pub missing_email_priority: i64,
    pub missing_source_priority: i64,
    pub no_contact_priority: i64,
    pub routine_priority: i64,
    /// Age after which a resource is due for routine human re-verification
    pub reverify_after_days: i64,
    /// A resource corrected within this window is not offered again
    pub review_cooldown_days: i64,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            missing_email_priority: 100,
            missing_source_priority: 90,
            no_contact_priority: 70,
            routine_priority: 50,
            reverify_after_days: 180,
            review_cooldown_days: 30,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the policy cannot work with
    pub fn validate(&self) -> Result<()> {
        let v = &self.verification;
        if !(0.0..=1.0).contains(&v.approve_threshold) {
            return Err(Error::Config(format!(
                "verification.approve_threshold must be within [0, 1], got {}",
                v.approve_threshold
            )));
        }
        for (name, days) in [
            ("verification.verified_interval_days", v.verified_interval_days),
            ("verification.flagged_interval_days", v.flagged_interval_days),
            ("verification.skipped_interval_days", v.skipped_interval_days),
            ("review.reverify_after_days", self.review.reverify_after_days),
        ] {
            if days <= 0 {
                return Err(Error::Config(format!("{} must be positive, got {}", name, days)));
            }
        }
        if self.review.review_cooldown_days < 0 {
            return Err(Error::Config(format!(
                "review.review_cooldown_days must not be negative, got {}",
                self.review.review_cooldown_days
            )));
        }
        if v.url_timeout_secs == 0 {
            return Err(Error::Config("verification.url_timeout_secs must be positive".to_string()));
        }
        if v.default_batch_limit == 0 {
            return Err(Error::Config("verification.default_batch_limit must be positive".to_string()));
        }
        if v.user_agent.trim().is_empty() {
            return Err(Error::Config("verification.user_agent must not be empty".to_string()));
        }

        let r = &self.review;
        let weights = [
            r.missing_email_priority,
            r.missing_source_priority,
            r.no_contact_priority,
            r.routine_priority,
        ];
        if weights.iter().any(|w| *w <= 0) || weights.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(Error::Config(format!(
                "review priorities must be positive and strictly descending, got {:?}",
                weights
            )));
        }
        Ok(())
    }
}

/// Load configuration following the file location priority
///
/// A missing file is not an error: defaults are used and a warning logged.
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    match locate_config_file(cli_path)? {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
            let config = TomlConfig::from_toml_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => {
            warn!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Find the config file to read, if any
///
/// An explicitly requested file (CLI or environment) must exist.
fn locate_config_file(cli_path: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return require_file(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return require_file(PathBuf::from(path));
    }

    // Priority 3: user, then system config file
    let user_config = dirs::config_dir().map(|d| d.join("rdq").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(Some(path));
        }
    }
    let system_config = PathBuf::from("/etc/rdq/config.toml");
    if system_config.exists() {
        return Ok(Some(system_config));
    }

    Ok(None)
}

fn require_file(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.is_file() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

/// Resolve the database file path
///
/// Priority: command-line → `RDQ_DATABASE` → TOML `database_path` →
/// `<root folder>/rdq.db`.
pub fn resolve_database_path(cli_path: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        return PathBuf::from(path);
    }
    if let Some(path) = &config.database_path {
        return path.clone();
    }
    resolve_root_folder(config).join(DATABASE_FILE_NAME)
}

/// Resolve the root data folder
///
/// Priority: `RDQ_ROOT_FOLDER` → TOML `root_folder` → OS default.
pub fn resolve_root_folder(config: &TomlConfig) -> PathBuf {
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        return PathBuf::from(path);
    }
    if let Some(path) = &config.root_folder {
        return path.clone();
    }
    get_default_root_folder()
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/rdq (or /var/lib/rdq for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("rdq"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/rdq"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("rdq"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/rdq"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("rdq"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\rdq"))
    } else {
        PathBuf::from("./rdq_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_policy() {
        let config = TomlConfig::default();
        assert_eq!(config.verification.approve_threshold, 0.8);
        assert_eq!(config.verification.verified_interval_days, 60);
        assert_eq!(config.verification.flagged_interval_days, 7);
        assert_eq!(config.verification.url_timeout_secs, 10);
        assert_eq!(config.review.missing_email_priority, 100);
        assert_eq!(config.review.missing_source_priority, 90);
        assert_eq!(config.review.no_contact_priority, 70);
        assert_eq!(config.review.routine_priority, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.verification, VerificationSettings::default());
        assert_eq!(config.review, ReviewSettings::default());
        assert_eq!(config.server.port, 5780);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [verification]
            flagged_interval_days = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.verification.flagged_interval_days, 3);
        assert_eq!(config.verification.verified_interval_days, 60);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [verification]
            approve_threshold = 1.5
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_non_positive_interval_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [verification]
            verified_interval_days = 0
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_review_priorities_must_descend() {
        let result = TomlConfig::from_toml_str(
            r#"
            [review]
            no_contact_priority = 95
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = TomlConfig::from_toml_str("[verification\napprove_threshold = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
