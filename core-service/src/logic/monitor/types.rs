//! Monitor Types - Operator results and errors

use serde::Serialize;

use crate::logic::response::EnforcementError;
use crate::logic::telemetry::Pid;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("process {0} not found")]
    ProcessNotFound(Pid),
    #[error("access denied to process {0}")]
    AccessDenied(Pid),
    #[error("unknown software '{0}'")]
    UnknownIdentity(String),
    #[error("no running processes for '{0}'")]
    NoLiveProcesses(String),
    #[error(transparent)]
    Enforcement(#[from] EnforcementError),
}

/// Result of one pid inside an identity-level request
#[derive(Debug)]
pub struct PidOutcome {
    pub pid: Pid,
    pub result: Result<(), ControlError>,
}

/// Per-pid results of a block/unblock fanned out over an identity
#[derive(Debug)]
pub struct IdentityOutcome {
    pub identity: String,
    pub outcomes: Vec<PidOutcome>,
}

impl IdentityOutcome {
    /// Aggregate verdict: at least one pid succeeded
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.result.is_ok())
    }

    pub fn succeeded_pids(&self) -> Vec<Pid> {
        self.outcomes.iter().filter(|o| o.result.is_ok()).map(|o| o.pid).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (Pid, &ControlError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.pid, e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Pids whose rule was removed
    pub removed: Vec<Pid>,
    pub failed: Vec<(Pid, String)>,
    /// Rule listing failed; only tracked pids were swept
    pub list_error: Option<String>,
    /// Entries dropped from the blocked set
    pub cleared: usize,
}

/// What one reconciliation cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub tracked: usize,
    pub added: usize,
    pub departed: usize,
    /// Blocked pids whose rule was installed this cycle
    pub enforced: Vec<Pid>,
    pub enforce_failures: usize,
    /// Blocked pids dropped because their process is gone
    pub released: Vec<Pid>,
}
