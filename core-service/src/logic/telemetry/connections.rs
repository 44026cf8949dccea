//! Established Connections - pid-attributed TCP connection listing
//!
//! Linux: `/proc/net/tcp{,6}` rows in state `01` give socket inodes, which are
//! mapped to pids through the `socket:[inode]` links under `/proc/<pid>/fd`.
//! Windows: `netstat -ano` rows in state `ESTABLISHED`, run under the
//! command timeout.

use super::{ConnectionEntry, TelemetryError};
use crate::logic::response::command::CommandRunner;

#[cfg(any(target_os = "linux", test))]
const TCP_ESTABLISHED: &str = "01";

/// List established connections on this host
#[cfg_attr(not(windows), allow(unused_variables))]
pub fn established(runner: &CommandRunner) -> Result<Vec<ConnectionEntry>, TelemetryError> {
    #[cfg(target_os = "linux")]
    {
        linux::established()
    }

    #[cfg(windows)]
    {
        windows::established(runner)
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Err(TelemetryError::Unavailable(
            "connection listing is not supported on this platform".to_string(),
        ))
    }
}

// ============================================================================
// PARSERS
// ============================================================================

/// Socket inodes of established rows in a `/proc/net/tcp` style table
#[cfg(any(target_os = "linux", test))]
fn parse_proc_net_tcp(content: &str) -> Vec<u64> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 10 || cols[3] != TCP_ESTABLISHED {
                return None;
            }
            cols[9].parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// Inode from a `/proc/<pid>/fd` link target such as `socket:[4242]`
#[cfg(any(target_os = "linux", test))]
fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Established rows of `netstat -ano` output
#[cfg(any(windows, test))]
fn parse_netstat(output: &str) -> Vec<ConnectionEntry> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() != 5 || !cols[0].starts_with("TCP") || cols[3] != "ESTABLISHED" {
                return None;
            }
            let pid = cols[4].parse::<u32>().ok()?;
            // pid 0 is the idle process placeholder
            (pid != 0).then_some(ConnectionEntry { pid })
        })
        .collect()
}

/// Run a netstat-style command under the runner's timeout and parse it
#[cfg(any(windows, test))]
fn netstat_connections(
    runner: &CommandRunner,
    program: &str,
    args: &[String],
) -> Result<Vec<ConnectionEntry>, TelemetryError> {
    let output = runner
        .run_checked(program, args)
        .map_err(|e| TelemetryError::Unavailable(format!("{}: {}", program, e)))?;
    Ok(parse_netstat(&output.stdout))
}

// ============================================================================
// PLATFORM IMPLEMENTATIONS
// ============================================================================

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;
    use std::fs;

    use super::{parse_proc_net_tcp, parse_socket_link};
    use crate::logic::telemetry::{ConnectionEntry, TelemetryError};

    const TABLES: [&str; 2] = ["/proc/net/tcp", "/proc/net/tcp6"];

    pub fn established() -> Result<Vec<ConnectionEntry>, TelemetryError> {
        let mut inodes = Vec::new();
        let mut readable = false;
        for table in TABLES {
            // tcp6 is missing when IPv6 is disabled
            if let Ok(content) = fs::read_to_string(table) {
                readable = true;
                inodes.extend(parse_proc_net_tcp(&content));
            }
        }
        if !readable {
            return Err(TelemetryError::Unavailable("cannot read /proc/net/tcp".to_string()));
        }
        if inodes.is_empty() {
            return Ok(Vec::new());
        }

        let owners = socket_owners()?;
        Ok(inodes
            .into_iter()
            .filter_map(|inode| owners.get(&inode).map(|pid| ConnectionEntry { pid: *pid }))
            .collect())
    }

    /// Map socket inode -> pid for every process whose fds we may read
    fn socket_owners() -> Result<HashMap<u64, u32>, TelemetryError> {
        let proc_dir = fs::read_dir("/proc")
            .map_err(|e| TelemetryError::Unavailable(format!("cannot read /proc: {}", e)))?;

        let mut owners = HashMap::new();
        for entry in proc_dir.flatten() {
            let pid = match entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) {
                Some(pid) => pid,
                None => continue,
            };
            // Permission denied or process exited: skip
            let fds = match fs::read_dir(entry.path().join("fd")) {
                Ok(fds) => fds,
                Err(_) => continue,
            };
            for fd in fds.flatten() {
                if let Ok(target) = fs::read_link(fd.path()) {
                    if let Some(inode) = target.to_str().and_then(parse_socket_link) {
                        owners.insert(inode, pid);
                    }
                }
            }
        }
        Ok(owners)
    }
}

#[cfg(windows)]
mod windows {
    use super::netstat_connections;
    use crate::logic::response::command::CommandRunner;
    use crate::logic::telemetry::{ConnectionEntry, TelemetryError};

    pub fn established(runner: &CommandRunner) -> Result<Vec<ConnectionEntry>, TelemetryError> {
        netstat_connections(runner, "netstat", &["-ano".to_string()])
    }
}

// ============================================================================
// TESTS
// ============================================================================
