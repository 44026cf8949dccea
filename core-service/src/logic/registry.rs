//! Process Registry - Live table of tracked processes
//!
//! One record per live pid matched to a known identity. Reconciled every
//! cycle against the latest scan: records are created on first sight,
//! updated while the pid stays, and dropped the cycle the pid disappears.
//! A pid seen with a different start time is a new process and never
//! inherits the old record's history.

use std::collections::{BTreeMap, HashSet};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::telemetry::Pid;
use super::traffic::{Reading, TrafficMeter, TrafficPolicy};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub executable_name: String,
    pub identity: String,
    pub start_time: u64,
    /// Established connections at the latest scan
    pub connections: u32,
    pub traffic: TrafficMeter,
    pub first_seen: DateTime<Utc>,
}

/// A matched process as seen by one scan
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub pid: Pid,
    pub executable_name: String,
    pub identity: String,
    pub start_time: u64,
    pub connections: u32,
    pub reading: Reading,
}

/// Membership changes produced by one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryDelta {
    pub added: Vec<Pid>,
    /// Pid no longer live
    pub removed: Vec<Pid>,
    /// Pid live again under a different start time (old process gone)
    pub replaced: Vec<Pid>,
}

impl RegistryDelta {
    /// Pids whose previous process is gone
    pub fn departed(&self) -> impl Iterator<Item = Pid> + '_ {
        self.removed.iter().chain(self.replaced.iter()).copied()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: BTreeMap<Pid, ProcessRecord>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one scan. `observations` must hold every matched live process.
    pub fn reconcile(
        &mut self,
        observations: Vec<Observation>,
        now: DateTime<Utc>,
        policy: &TrafficPolicy,
    ) -> RegistryDelta {
        let mut delta = RegistryDelta::default();
        let live: HashSet<Pid> = observations.iter().map(|o| o.pid).collect();

        let gone: Vec<Pid> = self.records.keys().filter(|pid| !live.contains(pid)).copied().collect();
        for pid in gone {
            self.records.remove(&pid);
            delta.removed.push(pid);
        }

        for obs in observations {
            match self.records.get_mut(&obs.pid) {
                Some(record) if record.start_time == obs.start_time => {
                    record.connections = obs.connections;
                    record.executable_name = obs.executable_name;
                    record.identity = obs.identity;
                    record.traffic.observe(obs.reading, now, policy);
                }
                Some(_) => {
                    delta.replaced.push(obs.pid);
                    self.records.insert(obs.pid, Self::new_record(obs, now));
                }
                None => {
                    delta.added.push(obs.pid);
                    self.records.insert(obs.pid, Self::new_record(obs, now));
                }
            }
        }

        delta
    }

    fn new_record(obs: Observation, now: DateTime<Utc>) -> ProcessRecord {
        ProcessRecord {
            pid: obs.pid,
            executable_name: obs.executable_name,
            identity: obs.identity,
            start_time: obs.start_time,
            connections: obs.connections,
            traffic: TrafficMeter::start(obs.reading, now),
            first_seen: now,
        }
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    #[cfg(test)]
    pub fn contains(&self, pid: Pid) -> bool {
        self.records.contains_key(&pid)
    }

    /// Records ordered by pid
    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    /// Live pids currently resolved to `identity`
    pub fn pids_of(&self, identity: &str) -> Vec<Pid> {
        self.records
            .values()
            .filter(|r| r.identity == identity)
            .map(|r| r.pid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
