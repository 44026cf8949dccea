//! Monitor Configuration
//!
//! Loaded once at startup from an optional JSON file, then overridden by
//! environment variables. A missing file yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{self, APP_DIR_NAME, CONFIG_FILE_NAME};
use super::blocklist::default_blocklist_path;
use super::catalog::{default_entries, SignatureCatalog, SignatureEntry};
use super::response::{FirewallBackend, RuleNaming};
use super::traffic::{TrafficPolicy, DEFAULT_NOMINAL_RATE, DEFAULT_UPPER_BOUND};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub scan_interval_secs: u64,
    pub enforcer_timeout_secs: u64,
    /// Highest upload rate (bytes/s) allowed to advance running totals
    pub upload_upper_bound: f64,
    /// Rate charged per connected process when write counters are hidden
    pub nominal_rate: f64,
    pub rule_prefix: String,
    pub blocklist_path: PathBuf,
    pub firewall: FirewallBackend,
    pub catalog: Vec<SignatureEntry>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: constants::DEFAULT_SCAN_INTERVAL,
            enforcer_timeout_secs: constants::DEFAULT_ENFORCER_TIMEOUT,
            upload_upper_bound: DEFAULT_UPPER_BOUND,
            nominal_rate: DEFAULT_NOMINAL_RATE,
            rule_prefix: constants::DEFAULT_RULE_PREFIX.to_string(),
            blocklist_path: default_blocklist_path(),
            firewall: FirewallBackend::Auto,
            catalog: default_entries(),
        }
    }
}

impl MonitorConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn enforcer_timeout(&self) -> Duration {
        Duration::from_secs(self.enforcer_timeout_secs)
    }

    pub fn traffic_policy(&self) -> TrafficPolicy {
        TrafficPolicy {
            upper_bound: self.upload_upper_bound,
            nominal_rate: self.nominal_rate,
        }
    }

    pub fn rule_naming(&self) -> RuleNaming {
        RuleNaming::new(&self.rule_prefix)
    }

    pub fn signature_catalog(&self) -> SignatureCatalog {
        SignatureCatalog::new(self.catalog.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_secs == 0 {
            return Err(ConfigError::Invalid("scan_interval_secs must be > 0".into()));
        }
        if self.enforcer_timeout_secs == 0 {
            return Err(ConfigError::Invalid("enforcer_timeout_secs must be > 0".into()));
        }
        if !(self.upload_upper_bound > 0.0) {
            return Err(ConfigError::Invalid("upload_upper_bound must be > 0".into()));
        }
        if self.nominal_rate < 0.0 {
            return Err(ConfigError::Invalid("nominal_rate must be >= 0".into()));
        }
        if self.rule_prefix.trim().is_empty() || self.rule_prefix.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid("rule_prefix must be a single non-empty word".into()));
        }
        Ok(())
    }

    /// Apply `ANTI_PCDN_*` overrides
    pub fn apply_env(&mut self) {
        if let Some(secs) = constants::get_scan_interval() {
            self.scan_interval_secs = secs;
        }
        if let Some(secs) = constants::get_enforcer_timeout() {
            self.enforcer_timeout_secs = secs;
        }
        if let Some(path) = constants::get_blocklist_path() {
            self.blocklist_path = PathBuf::from(path);
        }
        if let Some(name) = constants::get_firewall_backend() {
            match FirewallBackend::from_str(&name) {
                Some(backend) => self.firewall = backend,
                None => log::warn!("Unknown firewall backend '{}', keeping {:?}", name, self.firewall),
            }
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Get default config path
pub fn default_config_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// Read a config file; `Ok(None)` when it does not exist
pub fn load_config_file(path: &Path) -> Result<Option<MonitorConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(config))
}

/// File (if any), then environment, then validation
pub fn load_config() -> Result<MonitorConfig, ConfigError> {
    let path = constants::get_config_path()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let mut config = match load_config_file(&path)? {
        Some(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        None => MonitorConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.scan_interval(), Duration::from_secs(2));
        assert_eq!(config.enforcer_timeout(), Duration::from_secs(10));
        assert_eq!(config.upload_upper_bound, 100.0 * 1024.0 * 1024.0);
        assert_eq!(config.rule_prefix, "AntiPCDN_Block_PID_");
        assert_eq!(config.firewall, FirewallBackend::Auto);
        assert_eq!(config.catalog.len(), 14);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"scan_interval_secs": 5, "firewall": "none",
                "catalog": [{"identity": "ExampleApp", "executables": ["ExampleApp.exe"]}]}"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap().unwrap();
        assert_eq!(config.scan_interval_secs, 5);
        assert_eq!(config.firewall, FirewallBackend::None);
        assert_eq!(config.enforcer_timeout_secs, 10);
        assert_eq!(config.signature_catalog().resolve("ExampleApp.exe"), Some("ExampleApp"));
        assert_eq!(config.signature_catalog().resolve("WeChat.exe"), None);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_config_file(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = MonitorConfig { scan_interval_secs: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = MonitorConfig { rule_prefix: "Anti PCDN".into(), ..Default::default() };
        assert!(config.validate().is_err());

        let config = MonitorConfig { upload_upper_bound: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_policy_and_naming() {
        let config = MonitorConfig {
            upload_upper_bound: 5_000.0,
            nominal_rate: 12.0,
            rule_prefix: "Test_".into(),
            ..Default::default()
        };
        assert_eq!(config.traffic_policy(), TrafficPolicy { upper_bound: 5_000.0, nominal_rate: 12.0 });
        assert_eq!(config.rule_naming().for_pid(3).name, "Test_3");
    }
}
