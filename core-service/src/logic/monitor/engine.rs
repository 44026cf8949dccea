//! Monitor Engine - Reconciliation cycle and operator operations
//!
//! Owns the registry and the blocked set. Every method assumes the caller
//! holds the monitor's single lock, so a cycle and an operator request never
//! interleave.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use chrono::{DateTime, Utc};

use crate::logic::aggregate::{self, MonitorSnapshot};
use crate::logic::blocklist::{load_block_state, save_block_state, BlockedSet};
use crate::logic::catalog::SignatureCatalog;
use crate::logic::config::MonitorConfig;
use crate::logic::registry::{Observation, ProcessRegistry};
use crate::logic::response::{RuleEnforcer, RuleId, RuleNaming};
use crate::logic::telemetry::{count_by_pid, Pid, Probe, TelemetryError, TelemetrySource};
use crate::logic::traffic::{Reading, TrafficPolicy};

use super::types::{ControlError, CycleReport, IdentityOutcome, PidOutcome, SweepReport};

pub struct Engine {
    telemetry: Box<dyn TelemetrySource>,
    enforcer: Box<dyn RuleEnforcer>,
    catalog: SignatureCatalog,
    registry: ProcessRegistry,
    blocked: BlockedSet,
    blocklist_path: PathBuf,
    naming: RuleNaming,
    policy: TrafficPolicy,
    /// Blocked pids with a rule confirmed installed during this run
    enforced: HashSet<Pid>,
    /// Recorded upload limits (KB/s); never enforced
    rate_limits: HashMap<String, u32>,
    cycle: u64,
    host: Option<String>,
}

impl Engine {
    /// Build the engine and load the persisted blocked set
    pub fn new(
        telemetry: Box<dyn TelemetrySource>,
        enforcer: Box<dyn RuleEnforcer>,
        config: &MonitorConfig,
    ) -> Self {
        let blocked = match load_block_state(&config.blocklist_path) {
            Ok(set) => {
                if !set.is_empty() {
                    log::info!("Loaded {} blocked pid(s) from {:?}", set.len(), config.blocklist_path);
                }
                set
            }
            Err(e) => {
                log::warn!("Cannot load block state {:?}: {} - starting empty", config.blocklist_path, e);
                BlockedSet::new()
            }
        };

        Self {
            telemetry,
            enforcer,
            catalog: config.signature_catalog(),
            registry: ProcessRegistry::new(),
            blocked,
            blocklist_path: config.blocklist_path.clone(),
            naming: config.rule_naming(),
            policy: config.traffic_policy(),
            enforced: HashSet::new(),
            rate_limits: HashMap::new(),
            cycle: 0,
            host: hostname::get().ok().map(|h| h.to_string_lossy().to_string()),
        }
    }

    #[cfg(test)]
    pub fn blocked(&self) -> &BlockedSet {
        &self.blocked
    }

    #[cfg(test)]
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    pub fn enforcer_name(&self) -> &'static str {
        self.enforcer.name()
    }

    // ========================================================================
    // RECONCILIATION
    // ========================================================================

    /// One scan -> update -> enforce pass. A failed process listing leaves
    /// every piece of state untouched.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, TelemetryError> {
        let processes = self.telemetry.list_processes()?;

        let connections = match self.telemetry.list_established_connections() {
            Ok(list) => count_by_pid(&list),
            Err(e) => {
                log::debug!("Connection listing failed, counting none: {}", e);
                HashMap::new()
            }
        };

        let mut observations = Vec::new();
        for process in &processes {
            let Some(identity) = self.catalog.resolve(&process.name) else {
                continue;
            };
            let connection_count = connections.get(&process.pid).copied().unwrap_or(0);
            let reading = match self.telemetry.write_bytes(process.pid) {
                Probe::Found(bytes) => Reading::WriteBytes(bytes),
                Probe::AccessDenied => Reading::Estimated { connections: connection_count },
                Probe::NotFound => {
                    log::debug!("Process {} vanished during scan", process.pid);
                    continue;
                }
            };
            observations.push(Observation {
                pid: process.pid,
                executable_name: process.name.clone(),
                identity: identity.to_string(),
                start_time: process.start_time,
                connections: connection_count,
                reading,
            });
        }

        let delta = self.registry.reconcile(observations, now, &self.policy);
        self.cycle += 1;

        let mut report = CycleReport {
            cycle: self.cycle,
            tracked: self.registry.len(),
            added: delta.added.len(),
            departed: delta.removed.len() + delta.replaced.len(),
            ..Default::default()
        };
        let mut dirty = false;

        for pid in delta.departed() {
            self.enforced.remove(&pid);
            if self.blocked.remove(pid) {
                log::info!("Blocked process {} exited, dropped from block set", pid);
                report.released.push(pid);
                dirty = true;
            }
        }

        // Blocked pids outside the registry (loaded from disk, or unmatched)
        let live: HashMap<Pid, u64> = processes.iter().map(|p| (p.pid, p.start_time)).collect();
        for pid in self.blocked.pids() {
            let reused = match (live.get(&pid), self.blocked.start_time(pid)) {
                (None, _) => true,
                (Some(current), Some(stamped)) => *current != stamped,
                (Some(_), None) => false,
            };
            if reused {
                self.blocked.remove(pid);
                self.enforced.remove(&pid);
                log::info!("Blocked pid {} no longer names the blocked process, dropped", pid);
                report.released.push(pid);
                dirty = true;
            } else if let Some(start_time) = live.get(&pid) {
                dirty |= self.blocked.stamp(pid, *start_time);
            }
        }

        for pid in self.blocked.pids() {
            if self.enforced.contains(&pid) {
                continue;
            }
            match self.install_rule(pid) {
                Ok(()) => {
                    log::info!("Block rule re-applied for pid {}", pid);
                    self.enforced.insert(pid);
                    report.enforced.push(pid);
                }
                Err(ControlError::ProcessNotFound(_)) => {
                    log::debug!("Blocked pid {} vanished before enforcement", pid);
                }
                Err(e) => {
                    log::warn!("Block rule for pid {} not applied, will retry: {}", pid, e);
                    report.enforce_failures += 1;
                }
            }
        }

        if dirty {
            self.persist();
        }

        log::debug!(
            "Cycle {}: {} tracked, +{} / -{}, {} blocked",
            report.cycle,
            report.tracked,
            report.added,
            report.departed,
            self.blocked.len()
        );
        Ok(report)
    }

    /// Immutable view of the current state
    pub fn snapshot(&self, now: DateTime<Utc>) -> MonitorSnapshot {
        MonitorSnapshot {
            cycle: self.cycle,
            generated_at: Some(now),
            host: self.host.clone(),
            identities: aggregate::aggregate(&self.registry, &self.blocked, &self.rate_limits),
            processes: aggregate::process_views(&self.registry, &self.blocked),
            blocked_pids: self.blocked.pids(),
            last_error: None,
        }
    }

    // ========================================================================
    // OPERATOR REQUESTS
    // ========================================================================

    pub fn request_block(&mut self, pid: Pid) -> Result<(), ControlError> {
        if self.blocked.contains(pid) {
            return Ok(());
        }

        self.install_rule(pid)?;
        let start_time = match self.registry.get(pid) {
            Some(record) => Some(record.start_time),
            None => self.live_start_time(pid),
        };
        self.blocked.insert(pid, start_time);
        self.enforced.insert(pid);
        log::info!("Blocked outbound traffic of pid {}", pid);
        self.persist();
        Ok(())
    }

    pub fn request_unblock(&mut self, pid: Pid) -> Result<(), ControlError> {
        if !self.blocked.contains(pid) {
            return Ok(());
        }

        let rule = self.naming.for_pid(pid);
        self.enforcer.remove(&rule)?;
        self.blocked.remove(pid);
        self.enforced.remove(&pid);
        log::info!("Unblocked pid {}", pid);
        self.persist();
        Ok(())
    }

    pub fn block_identity(&mut self, identity: &str) -> Result<IdentityOutcome, ControlError> {
        let pids = self.identity_pids(identity)?;
        let outcomes = pids
            .into_iter()
            .map(|pid| PidOutcome { pid, result: self.request_block(pid) })
            .collect();
        Ok(IdentityOutcome { identity: identity.to_string(), outcomes })
    }

    pub fn unblock_identity(&mut self, identity: &str) -> Result<IdentityOutcome, ControlError> {
        let pids = self.identity_pids(identity)?;
        let outcomes = pids
            .into_iter()
            .map(|pid| PidOutcome { pid, result: self.request_unblock(pid) })
            .collect();
        Ok(IdentityOutcome { identity: identity.to_string(), outcomes })
    }

    /// Remove every rule of ours, tracked or orphaned, and clear the set
    pub fn sweep_all(&mut self) -> SweepReport {
        let mut report = SweepReport::default();

        let mut rules: BTreeSet<RuleId> = match self.enforcer.list_rules() {
            Ok(found) => found.into_iter().collect(),
            Err(e) => {
                log::warn!("Cannot list firewall rules, sweeping tracked pids only: {}", e);
                report.list_error = Some(e.to_string());
                BTreeSet::new()
            }
        };
        rules.extend(self.blocked.pids().into_iter().map(|pid| self.naming.for_pid(pid)));

        for rule in rules {
            match self.enforcer.remove(&rule) {
                Ok(()) => report.removed.push(rule.pid),
                Err(e) => {
                    log::warn!("Sweep could not remove {}: {}", rule.name, e);
                    report.failed.push((rule.pid, e.to_string()));
                }
            }
        }

        report.cleared = self.blocked.len();
        self.blocked.clear();
        self.enforced.clear();
        self.persist();

        log::info!(
            "Sweep removed {} rule(s), {} failed, cleared {} blocked pid(s)",
            report.removed.len(),
            report.failed.len(),
            report.cleared
        );
        report
    }

    /// Record an upload limit for an identity (not enforced)
    pub fn set_rate_limit(&mut self, identity: &str, kbps: u32) -> Result<(), ControlError> {
        if !self.catalog.contains_identity(identity) {
            return Err(ControlError::UnknownIdentity(identity.to_string()));
        }
        log::info!("Recorded upload limit for {}: {} KB/s (not enforced)", identity, kbps);
        self.rate_limits.insert(identity.to_string(), kbps);
        Ok(())
    }

    /// Returns false when no limit was recorded
    pub fn clear_rate_limit(&mut self, identity: &str) -> bool {
        self.rate_limits.remove(identity).is_some()
    }

    #[cfg(test)]
    pub fn rate_limit(&self, identity: &str) -> Option<u32> {
        self.rate_limits.get(identity).copied()
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn identity_pids(&self, identity: &str) -> Result<Vec<Pid>, ControlError> {
        if !self.catalog.contains_identity(identity) {
            return Err(ControlError::UnknownIdentity(identity.to_string()));
        }
        let pids = self.registry.pids_of(identity);
        if pids.is_empty() {
            return Err(ControlError::NoLiveProcesses(identity.to_string()));
        }
        Ok(pids)
    }

    /// Start time of a pid the registry has not scanned yet
    fn live_start_time(&mut self, pid: Pid) -> Option<u64> {
        match self.telemetry.list_processes() {
            Ok(processes) => processes.into_iter().find(|p| p.pid == pid).map(|p| p.start_time),
            Err(e) => {
                log::debug!("Cannot read start time of pid {}, stamping on next scan: {}", pid, e);
                None
            }
        }
    }

    fn install_rule(&mut self, pid: Pid) -> Result<(), ControlError> {
        let path = match self.telemetry.executable_path(pid) {
            Probe::Found(path) => path,
            Probe::NotFound => return Err(ControlError::ProcessNotFound(pid)),
            Probe::AccessDenied => return Err(ControlError::AccessDenied(pid)),
        };
        let rule = self.naming.for_pid(pid);
        self.enforcer.install(&rule, &path)?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = save_block_state(&self.blocked, &self.blocklist_path) {
            log::warn!("Persisting block state to {:?} failed: {}", self.blocklist_path, e);
        }
    }
}
