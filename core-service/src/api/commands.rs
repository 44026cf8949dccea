//! Operator Commands - Control surface over the monitor
//!
//! Thin wrappers that turn monitor results into serializable values and
//! errors into `String` messages for the console.

use serde::{Deserialize, Serialize};

use crate::logic::aggregate::{IdentityAggregate, ProcessView};
use crate::logic::monitor::{IdentityOutcome, Monitor, SweepReport};
use crate::logic::telemetry::Pid;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Monitor status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub is_running: bool,
    pub enforcer: String,
    pub cycle: u64,
    pub last_scan_time: Option<String>,
    pub host: Option<String>,
    pub tracked_processes: usize,
    pub identities: usize,
    pub blocked_pids: Vec<Pid>,
    pub last_error: Option<String>,
}

/// Identity-level request result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppActionResult {
    pub identity: String,
    pub success: bool,
    pub succeeded: Vec<Pid>,
    pub failed: Vec<PidFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidFailure {
    pub pid: Pid,
    pub error: String,
}

impl From<IdentityOutcome> for AppActionResult {
    fn from(outcome: IdentityOutcome) -> Self {
        Self {
            success: outcome.succeeded(),
            succeeded: outcome.succeeded_pids(),
            failed: outcome
                .failures()
                .map(|(pid, e)| PidFailure { pid, error: e.to_string() })
                .collect(),
            identity: outcome.identity,
        }
    }
}

// ============================================================================
// STATUS COMMANDS
// ============================================================================

/// Overall status from the latest snapshot
pub fn get_status(monitor: &Monitor) -> MonitorStatus {
    let snapshot = monitor.snapshot();
    MonitorStatus {
        is_running: monitor.is_running(),
        enforcer: monitor.enforcer_name().to_string(),
        cycle: snapshot.cycle,
        last_scan_time: snapshot.generated_at.map(|t| t.to_rfc3339()),
        host: snapshot.host.clone(),
        tracked_processes: snapshot.processes.len(),
        identities: snapshot.identities.len(),
        blocked_pids: snapshot.blocked_pids.clone(),
        last_error: snapshot.last_error.clone(),
    }
}

/// Per-identity totals, highest upload first
pub fn get_apps(monitor: &Monitor) -> Vec<IdentityAggregate> {
    let mut apps = monitor.snapshot().identities.clone();
    apps.sort_by(|a, b| b.upload_rate.total_cmp(&a.upload_rate));
    apps
}

/// Per-process rows ordered by pid
pub fn get_processes(monitor: &Monitor) -> Vec<ProcessView> {
    monitor.snapshot().processes.clone()
}

/// Catalog identity names
pub fn get_known_apps(monitor: &Monitor) -> Vec<String> {
    monitor.identities()
}

// ============================================================================
// BLOCK COMMANDS
// ============================================================================

pub fn block_process(monitor: &Monitor, pid: Pid) -> Result<bool, String> {
    monitor.block_pid(pid).map(|_| true).map_err(|e| e.to_string())
}

pub fn unblock_process(monitor: &Monitor, pid: Pid) -> Result<bool, String> {
    monitor.unblock_pid(pid).map(|_| true).map_err(|e| e.to_string())
}

pub fn block_app(monitor: &Monitor, identity: &str) -> Result<AppActionResult, String> {
    monitor
        .block_identity(identity)
        .map(AppActionResult::from)
        .map_err(|e| e.to_string())
}

pub fn unblock_app(monitor: &Monitor, identity: &str) -> Result<AppActionResult, String> {
    monitor
        .unblock_identity(identity)
        .map(AppActionResult::from)
        .map_err(|e| e.to_string())
}

/// Remove every rule of ours and clear the blocked set
pub fn sweep_rules(monitor: &Monitor) -> SweepReport {
    monitor.sweep_all()
}

// ============================================================================
// RATE LIMIT COMMANDS
// ============================================================================

/// Record an upload limit (KB/s); recorded only, not enforced
pub fn limit_app(monitor: &Monitor, identity: &str, kbps: u32) -> Result<bool, String> {
    if kbps == 0 {
        return Err("limit must be at least 1 KB/s".to_string());
    }
    monitor
        .set_rate_limit(identity, kbps)
        .map(|_| true)
        .map_err(|e| e.to_string())
}

pub fn unlimit_app(monitor: &Monitor, identity: &str) -> Result<bool, String> {
    Ok(monitor.clear_rate_limit(identity))
}

// ============================================================================
// LOOP COMMANDS
// ============================================================================

pub fn start_monitor(monitor: &Monitor) -> Result<bool, String> {
    Ok(monitor.start())
}

pub fn stop_monitor(monitor: &Monitor) -> Result<bool, String> {
    monitor.stop();
    Ok(true)
}
