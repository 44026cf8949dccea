//! Central Configuration Constants
//!
//! Single source of truth for defaults and the environment variables that
//! override them.

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Anti-PCDN";

/// Directory under the user's local data dir
pub const APP_DIR_NAME: &str = "anti-pcdn";

/// Persisted blocked-pid set
pub const BLOCKLIST_FILE_NAME: &str = "blocked_pids.json";

/// Optional JSON config
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Firewall rule name prefix; rules are `<prefix><pid>`
pub const DEFAULT_RULE_PREFIX: &str = "AntiPCDN_Block_PID_";

/// Scan interval (seconds)
pub const DEFAULT_SCAN_INTERVAL: u64 = 2;

/// Per-command firewall timeout (seconds)
pub const DEFAULT_ENFORCER_TIMEOUT: u64 = 10;

// ============================================
// Helper functions to read from env with fallback
// ============================================

pub const ENV_CONFIG_PATH: &str = "ANTI_PCDN_CONFIG";
pub const ENV_SCAN_INTERVAL: &str = "ANTI_PCDN_SCAN_INTERVAL";
pub const ENV_ENFORCER_TIMEOUT: &str = "ANTI_PCDN_ENFORCER_TIMEOUT";
pub const ENV_BLOCKLIST_PATH: &str = "ANTI_PCDN_BLOCKLIST";
pub const ENV_FIREWALL: &str = "ANTI_PCDN_FIREWALL";

/// Config file path from environment, if set
pub fn get_config_path() -> Option<String> {
    std::env::var(ENV_CONFIG_PATH).ok().filter(|s| !s.trim().is_empty())
}

/// Scan interval override, ignored when zero or unparsable
pub fn get_scan_interval() -> Option<u64> {
    std::env::var(ENV_SCAN_INTERVAL)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|secs| *secs > 0)
}

/// Firewall timeout override, ignored when zero or unparsable
pub fn get_enforcer_timeout() -> Option<u64> {
    std::env::var(ENV_ENFORCER_TIMEOUT)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|secs| *secs > 0)
}

/// Blocklist path override
pub fn get_blocklist_path() -> Option<String> {
    std::env::var(ENV_BLOCKLIST_PATH).ok().filter(|s| !s.trim().is_empty())
}

/// Firewall backend override (`auto`, `netsh`, `iptables`, `none`)
pub fn get_firewall_backend() -> Option<String> {
    std::env::var(ENV_FIREWALL)
        .ok()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}
