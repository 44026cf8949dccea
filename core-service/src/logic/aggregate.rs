//! Aggregator - Per-identity roll-up and published snapshot types
//!
//! Recomputed from the registry every cycle; nothing is carried over, so a
//! departed process stops contributing the cycle after it is reaped.

use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::blocklist::BlockedSet;
use super::registry::ProcessRegistry;
use super::telemetry::Pid;
use super::traffic::CounterSource;

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Upload level thresholds (KB/s)
const HIGH_KBPS: f64 = 100.0;
const MEDIUM_KBPS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficLevel {
    Low,
    Medium,
    High,
}

impl TrafficLevel {
    pub fn from_rate(bytes_per_sec: f64) -> Self {
        let kbps = bytes_per_sec / 1024.0;
        if kbps > HIGH_KBPS {
            TrafficLevel::High
        } else if kbps > MEDIUM_KBPS {
            TrafficLevel::Medium
        } else {
            TrafficLevel::Low
        }
    }
}

/// What the operator asked for an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlState {
    Allowed,
    /// Every live process blocked
    Blocked,
    PartiallyBlocked,
    /// Upload limit recorded (not enforced)
    Limited { kbps: u32 },
}

// ============================================================================
// SNAPSHOT TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAggregate {
    pub identity: String,
    pub process_count: usize,
    pub upload_rate: f64,
    pub cumulative_upload: u64,
    pub connections: u32,
    pub pids: Vec<Pid>,
    pub blocked_count: usize,
    pub control: ControlState,
    pub level: TrafficLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessView {
    pub pid: Pid,
    pub identity: String,
    pub executable_name: String,
    pub upload_rate: f64,
    pub cumulative_upload: u64,
    pub connections: u32,
    pub blocked: bool,
    pub source: CounterSource,
    pub level: TrafficLevel,
}

/// Immutable result of one reconciliation cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub cycle: u64,
    pub generated_at: Option<DateTime<Utc>>,
    pub host: Option<String>,
    pub identities: Vec<IdentityAggregate>,
    pub processes: Vec<ProcessView>,
    pub blocked_pids: Vec<Pid>,
    /// Set when the latest cycle failed and this is the previous data
    pub last_error: Option<String>,
}

#[cfg(test)]
impl MonitorSnapshot {
    pub fn identity(&self, name: &str) -> Option<&IdentityAggregate> {
        self.identities.iter().find(|a| a.identity == name)
    }

    pub fn process(&self, pid: Pid) -> Option<&ProcessView> {
        self.processes.iter().find(|p| p.pid == pid)
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Fold the registry into per-identity totals, ordered by identity name
pub fn aggregate(
    registry: &ProcessRegistry,
    blocked: &BlockedSet,
    rate_limits: &HashMap<String, u32>,
) -> Vec<IdentityAggregate> {
    let mut groups: BTreeMap<&str, IdentityAggregate> = BTreeMap::new();

    for record in registry.records() {
        let entry = groups.entry(record.identity.as_str()).or_insert_with(|| IdentityAggregate {
            identity: record.identity.clone(),
            process_count: 0,
            upload_rate: 0.0,
            cumulative_upload: 0,
            connections: 0,
            pids: Vec::new(),
            blocked_count: 0,
            control: ControlState::Allowed,
            level: TrafficLevel::Low,
        });

        entry.process_count += 1;
        entry.upload_rate += record.traffic.rate;
        entry.cumulative_upload = entry.cumulative_upload.saturating_add(record.traffic.cumulative);
        entry.connections += record.connections;
        entry.pids.push(record.pid);
        if blocked.contains(record.pid) {
            entry.blocked_count += 1;
        }
    }

    groups
        .into_values()
        .map(|mut entry| {
            entry.level = TrafficLevel::from_rate(entry.upload_rate);
            entry.control = control_state(&entry, rate_limits.get(&entry.identity).copied());
            entry
        })
        .collect()
}

fn control_state(entry: &IdentityAggregate, limit: Option<u32>) -> ControlState {
    if entry.blocked_count > 0 && entry.blocked_count == entry.process_count {
        ControlState::Blocked
    } else if entry.blocked_count > 0 {
        ControlState::PartiallyBlocked
    } else if let Some(kbps) = limit {
        ControlState::Limited { kbps }
    } else {
        ControlState::Allowed
    }
}

/// One row per tracked process, ordered by pid
pub fn process_views(registry: &ProcessRegistry, blocked: &BlockedSet) -> Vec<ProcessView> {
    registry
        .records()
        .map(|record| ProcessView {
            pid: record.pid,
            identity: record.identity.clone(),
            executable_name: record.executable_name.clone(),
            upload_rate: record.traffic.rate,
            cumulative_upload: record.traffic.cumulative,
            connections: record.connections,
            blocked: blocked.contains(record.pid),
            source: record.traffic.source,
            level: TrafficLevel::from_rate(record.traffic.rate),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::registry::Observation;
    use crate::logic::traffic::{Reading, TrafficPolicy};
    use chrono::{Duration, TimeZone};

    fn obs(pid: Pid, identity: &str, connections: u32, written: u64) -> Observation {
        Observation {
            pid,
            executable_name: format!("{}.exe", identity),
            identity: identity.to_string(),
            start_time: 1,
            connections,
            reading: Reading::WriteBytes(written),
        }
    }

    fn registry() -> ProcessRegistry {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let policy = TrafficPolicy::default();
        let mut registry = ProcessRegistry::new();
        registry.reconcile(
            vec![obs(1, "WeChat", 2, 0), obs(2, "WeChat", 1, 0), obs(3, "QQ", 0, 0)],
            t0,
            &policy,
        );
        registry.reconcile(
            vec![obs(1, "WeChat", 2, 204_800), obs(2, "WeChat", 1, 1_024), obs(3, "QQ", 0, 0)],
            t0 + Duration::seconds(1),
            &policy,
        );
        registry
    }

    #[test]
    fn test_traffic_level() {
        assert_eq!(TrafficLevel::from_rate(0.0), TrafficLevel::Low);
        assert_eq!(TrafficLevel::from_rate(10.0 * 1024.0), TrafficLevel::Low);
        assert_eq!(TrafficLevel::from_rate(50.0 * 1024.0), TrafficLevel::Medium);
        assert_eq!(TrafficLevel::from_rate(101.0 * 1024.0), TrafficLevel::High);
    }

    #[test]
    fn test_aggregate_sums_per_identity() {
        let aggregates = aggregate(&registry(), &BlockedSet::new(), &HashMap::new());

        assert_eq!(aggregates.len(), 2);
        let qq = &aggregates[0];
        let wechat = &aggregates[1];
        assert_eq!(qq.identity, "QQ");
        assert_eq!(wechat.identity, "WeChat");

        assert_eq!(wechat.process_count, 2);
        assert_eq!(wechat.pids, vec![1, 2]);
        assert_eq!(wechat.connections, 3);
        assert_eq!(wechat.upload_rate, 205_824.0);
        assert_eq!(wechat.cumulative_upload, 205_824);
        assert_eq!(wechat.level, TrafficLevel::High);
        assert_eq!(wechat.control, ControlState::Allowed);

        assert_eq!(qq.process_count, 1);
        assert_eq!(qq.upload_rate, 0.0);
    }

    #[test]
    fn test_control_state() {
        let mut blocked = BlockedSet::new();
        blocked.insert(1, None);
        let mut limits = HashMap::new();
        limits.insert("QQ".to_string(), 64);

        let aggregates = aggregate(&registry(), &blocked, &limits);
        assert_eq!(aggregates[0].control, ControlState::Limited { kbps: 64 });
        assert_eq!(aggregates[1].control, ControlState::PartiallyBlocked);

        blocked.insert(2, None);
        let aggregates = aggregate(&registry(), &blocked, &limits);
        assert_eq!(aggregates[1].control, ControlState::Blocked);
        assert_eq!(aggregates[1].blocked_count, 2);
    }

    #[test]
    fn test_process_views() {
        let mut blocked = BlockedSet::new();
        blocked.insert(3, None);
        let views = process_views(&registry(), &blocked);

        assert_eq!(views.iter().map(|v| v.pid).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(views[2].blocked);
        assert!(!views[0].blocked);
        assert_eq!(views[0].upload_rate, 204_800.0);
        assert_eq!(views[0].level, TrafficLevel::High);
        assert_eq!(views[1].level, TrafficLevel::Low);
    }

    #[test]
    fn test_empty_registry() {
        let aggregates = aggregate(&ProcessRegistry::new(), &BlockedSet::new(), &HashMap::new());
        assert!(aggregates.is_empty());
    }
}
