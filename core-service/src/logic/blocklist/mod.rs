//! Block State - Durable set of pids the operator wants blocked
//!
//! The set survives restarts through a JSON side file (`storage.rs`), which is
//! replaced whole on every mutation. Each pid may carry the start time of the
//! process it was blocked for, so a reused pid can be told apart later.

pub mod storage;


use std::collections::BTreeMap;

use super::telemetry::Pid;

pub use storage::{default_blocklist_path, load_block_state, save_block_state, BlockStateFile};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockedSet {
    /// pid -> start time of the blocked process, when known
    entries: BTreeMap<Pid, Option<u64>>,
}

impl BlockedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.entries.contains_key(&pid)
    }

    /// Returns false when the pid was already present
    pub fn insert(&mut self, pid: Pid, start_time: Option<u64>) -> bool {
        match self.entries.get_mut(&pid) {
            Some(stamp) => {
                if stamp.is_none() {
                    *stamp = start_time;
                }
                false
            }
            None => {
                self.entries.insert(pid, start_time);
                true
            }
        }
    }

    /// Stamp a pid loaded without a start time, once it is seen live
    pub fn stamp(&mut self, pid: Pid, start_time: u64) -> bool {
        match self.entries.get_mut(&pid) {
            Some(stamp @ None) => {
                *stamp = Some(start_time);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, pid: Pid) -> bool {
        self.entries.remove(&pid).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn start_time(&self, pid: Pid) -> Option<u64> {
        self.entries.get(&pid).copied().flatten()
    }

    /// Pids in ascending order
    pub fn pids(&self) -> Vec<Pid> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_file(&self) -> BlockStateFile {
        BlockStateFile {
            blocked_pids: self.pids(),
            start_times: self
                .entries
                .iter()
                .filter_map(|(pid, stamp)| stamp.map(|s| (*pid, s)))
                .collect(),
        }
    }

    pub fn from_file(file: BlockStateFile) -> Self {
        let mut set = Self::new();
        for pid in file.blocked_pids {
            set.insert(pid, file.start_times.get(&pid).copied());
        }
        set
    }
}
