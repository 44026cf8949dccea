//! Response Types - Rule names and enforcement errors

use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

use crate::logic::telemetry::Pid;

// ============================================================================
// RULE NAMING
// ============================================================================

/// A firewall rule owned by this tool
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId {
    pub pid: Pid,
    pub name: String,
}

/// Naming convention `<prefix><pid>`, so rules are addressable one by one and
/// sweepable by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleNaming {
    prefix: String,
}

impl RuleNaming {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.to_string() }
    }

    pub fn for_pid(&self, pid: Pid) -> RuleId {
        RuleId {
            pid,
            name: format!("{}{}", self.prefix, pid),
        }
    }

    /// Parse an exact rule name
    pub fn parse(&self, name: &str) -> Option<RuleId> {
        let pid = name.strip_prefix(&self.prefix)?.parse::<Pid>().ok()?;
        Some(self.for_pid(pid)).filter(|rule| rule.name == name)
    }

    /// Every rule name of ours mentioned in a command's output
    pub fn find_in(&self, text: &str) -> Vec<RuleId> {
        let found: BTreeSet<RuleId> = text
            .split(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '=' | ':' | ','))
            .filter_map(|token| self.parse(token))
            .collect();
        found.into_iter().collect()
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EnforcementError {
    /// Command ran and reported failure
    #[error("command '{command}' failed ({exit_code}): {detail}")]
    Failed {
        command: String,
        exit_code: i32,
        detail: String,
    },
    /// Command did not finish in time; treated as a failure
    #[error("command '{command}' timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
    #[error("cannot run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no firewall backend available: {0}")]
    Unsupported(String),
}

impl EnforcementError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EnforcementError::Timeout { .. })
    }
}
