//! Privilege Check - Whether the process can manage firewall rules
//!
//! Both per-process write counters and firewall changes need an elevated
//! process; without it blocking fails and traffic falls back to estimates.

/// Windows: `net session` only succeeds for administrators
#[cfg(windows)]
pub fn is_elevated() -> bool {
    use std::process::{Command, Stdio};

    Command::new("net")
        .arg("session")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Unix: effective uid 0
#[cfg(unix)]
pub fn is_elevated() -> bool {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| effective_uid(&status))
        .map(|uid| uid == 0)
        .unwrap_or(false)
}

#[cfg(not(any(windows, unix)))]
pub fn is_elevated() -> bool {
    false
}

/// Second field of the `Uid:` line (real, effective, saved, fs)
#[cfg(any(unix, test))]
fn effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().nth(1))
        .and_then(|uid| uid.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_uid() {
        let status = "Name:\tanti-pcdn\nState:\tR (running)\nUid:\t1000\t0\t0\t0\nGid:\t1000\t1000\t1000\t1000\n";
        assert_eq!(effective_uid(status), Some(0));
        assert_eq!(effective_uid("Uid:\t1000\t1000\t1000\t1000"), Some(1000));
        assert_eq!(effective_uid("Name:\tx\n"), None);
    }
}
