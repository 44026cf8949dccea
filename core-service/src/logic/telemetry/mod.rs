//! Process Telemetry - OS process and connection source
//!
//! Abstraction over the operating system used by the monitor engine.
//!
//! # Components
//! - `system.rs`: sysinfo-backed source (processes, write counters, exe paths)
//! - `connections.rs`: established TCP connections with owning pid

pub mod connections;
pub mod system;

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

pub use system::SystemTelemetry;

/// OS-assigned process id
pub type Pid = u32;

// ============================================================================
// TYPES
// ============================================================================

/// One live process as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub name: String,
    /// Start time (seconds since epoch), used to detect pid reuse
    pub start_time: u64,
}

/// One established connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub pid: Pid,
}

/// Outcome of a per-process lookup.
///
/// Processes come and go between calls, so "gone" and "not allowed" are
/// ordinary answers rather than errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Found(T),
    NotFound,
    AccessDenied,
}

impl<T> Probe<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Probe::Found(value) => Some(value),
            Probe::NotFound | Probe::AccessDenied => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Probe::Found(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Enumeration failed as a whole (permissions, transient OS error)
    #[error("telemetry unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// Capability the monitor calls into for everything it learns about the OS.
pub trait TelemetrySource: Send {
    /// Refresh and list all live processes
    fn list_processes(&mut self) -> Result<Vec<ProcessEntry>, TelemetryError>;

    /// List established connections with a known owning pid
    fn list_established_connections(&mut self) -> Result<Vec<ConnectionEntry>, TelemetryError>;

    /// Cumulative bytes written by the process, as of the last refresh
    fn write_bytes(&mut self, pid: Pid) -> Probe<u64>;

    /// Full path of the process executable
    fn executable_path(&mut self, pid: Pid) -> Probe<PathBuf>;
}

/// Count established connections per pid
pub fn count_by_pid(connections: &[ConnectionEntry]) -> std::collections::HashMap<Pid, u32> {
    let mut counts = std::collections::HashMap::new();
    for conn in connections {
        *counts.entry(conn.pid).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_by_pid() {
        let conns = vec![
            ConnectionEntry { pid: 10 },
            ConnectionEntry { pid: 10 },
            ConnectionEntry { pid: 11 },
        ];
        let counts = count_by_pid(&conns);
        assert_eq!(counts.get(&10), Some(&2));
        assert_eq!(counts.get(&11), Some(&1));
        assert_eq!(counts.get(&12), None);
    }

    #[test]
    fn test_probe_found() {
        assert_eq!(Probe::Found(5u64).found(), Some(5));
        assert_eq!(Probe::<u64>::AccessDenied.found(), None);
        assert!(!Probe::<u64>::NotFound.is_found());
    }
}
