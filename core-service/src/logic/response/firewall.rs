//! Rule Enforcer - Host firewall capability
//!
//! The monitor only knows "install rule", "remove rule" and "list our rules";
//! which host firewall does the work is picked once at startup.

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use super::command::CommandRunner;
use super::iptables::IptablesEnforcer;
use super::netsh::NetshEnforcer;
use super::types::{EnforcementError, RuleId, RuleNaming};

pub trait RuleEnforcer: Send {
    fn name(&self) -> &'static str;

    /// Block outbound traffic for the rule's process
    fn install(&mut self, rule: &RuleId, executable: &Path) -> Result<(), EnforcementError>;

    /// Remove the rule; an already absent rule counts as removed
    fn remove(&mut self, rule: &RuleId) -> Result<(), EnforcementError>;

    /// All installed rules matching our naming convention
    fn list_rules(&mut self) -> Result<Vec<RuleId>, EnforcementError>;
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallBackend {
    Auto,
    Netsh,
    Iptables,
    None,
}

impl FirewallBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(FirewallBackend::Auto),
            "netsh" | "windows" => Some(FirewallBackend::Netsh),
            "iptables" | "linux" => Some(FirewallBackend::Iptables),
            "none" | "off" => Some(FirewallBackend::None),
            _ => None,
        }
    }

    /// Concrete backend for this host
    pub fn resolve(self) -> Self {
        match self {
            FirewallBackend::Auto if cfg!(windows) => FirewallBackend::Netsh,
            FirewallBackend::Auto if cfg!(target_os = "linux") => FirewallBackend::Iptables,
            FirewallBackend::Auto => FirewallBackend::None,
            other => other,
        }
    }
}

/// Enforcer used when no firewall backend can run; every call fails
pub struct UnsupportedEnforcer {
    reason: String,
}

impl UnsupportedEnforcer {
    pub fn new(reason: &str) -> Self {
        Self { reason: reason.to_string() }
    }

    fn error(&self) -> EnforcementError {
        EnforcementError::Unsupported(self.reason.clone())
    }
}

impl RuleEnforcer for UnsupportedEnforcer {
    fn name(&self) -> &'static str {
        "none"
    }

    fn install(&mut self, _rule: &RuleId, _executable: &Path) -> Result<(), EnforcementError> {
        Err(self.error())
    }

    fn remove(&mut self, _rule: &RuleId) -> Result<(), EnforcementError> {
        Err(self.error())
    }

    fn list_rules(&mut self) -> Result<Vec<RuleId>, EnforcementError> {
        Err(self.error())
    }
}

pub fn build_enforcer(backend: FirewallBackend, naming: RuleNaming, timeout: Duration) -> Box<dyn RuleEnforcer> {
    let backend = backend.resolve();
    if backend == FirewallBackend::None {
        return Box::new(UnsupportedEnforcer::new("firewall backend disabled or unavailable"));
    }

    let runner = match CommandRunner::new(timeout) {
        Ok(runner) => runner,
        Err(e) => {
            log::error!("Cannot start command runtime: {}", e);
            return Box::new(UnsupportedEnforcer::new(&format!("command runtime: {}", e)));
        }
    };

    match backend {
        FirewallBackend::Netsh => Box::new(NetshEnforcer::new(runner, naming)),
        _ => Box::new(IptablesEnforcer::new(runner, naming)),
    }
}
