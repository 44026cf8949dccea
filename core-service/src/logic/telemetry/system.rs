//! System Telemetry - sysinfo-backed process source
//!
//! Process list, start times and exe paths come from sysinfo. Write counters
//! are the per-process I/O totals, which the OS only exposes to a privileged
//! caller; an all-zero counter is reported as `AccessDenied` so the traffic
//! meter falls back to its heuristic.

use std::path::PathBuf;
use std::time::Duration;
use sysinfo::System;

use super::{connections, ConnectionEntry, Pid, Probe, ProcessEntry, TelemetryError, TelemetrySource};
use crate::logic::response::command::CommandRunner;

pub struct SystemTelemetry {
    system: System,
    /// Runs `netstat` where connections come from a command
    runner: CommandRunner,
}

impl SystemTelemetry {
    pub fn new(command_timeout: Duration) -> std::io::Result<Self> {
        Ok(Self {
            system: System::new(),
            runner: CommandRunner::new(command_timeout)?,
        })
    }

    fn process(&self, pid: Pid) -> Option<&sysinfo::Process> {
        self.system.process(sysinfo::Pid::from_u32(pid))
    }
}

impl TelemetrySource for SystemTelemetry {
    fn list_processes(&mut self) -> Result<Vec<ProcessEntry>, TelemetryError> {
        self.system.refresh_processes();

        let processes = self.system.processes();
        if processes.is_empty() {
            return Err(TelemetryError::Unavailable("process table is empty".to_string()));
        }

        Ok(processes
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                start_time: process.start_time(),
            })
            .collect())
    }

    fn list_established_connections(&mut self) -> Result<Vec<ConnectionEntry>, TelemetryError> {
        connections::established(&self.runner)
    }

    fn write_bytes(&mut self, pid: Pid) -> Probe<u64> {
        match self.process(pid) {
            Some(process) => {
                let usage = process.disk_usage();
                if usage.total_written_bytes == 0 && usage.total_read_bytes == 0 {
                    Probe::AccessDenied
                } else {
                    Probe::Found(usage.total_written_bytes)
                }
            }
            None => Probe::NotFound,
        }
    }

    fn executable_path(&mut self, pid: Pid) -> Probe<PathBuf> {
        // Operator requests can name a pid started after the last scan
        if !self.system.refresh_process(sysinfo::Pid::from_u32(pid)) {
            return Probe::NotFound;
        }
        match self.process(pid) {
            Some(process) => match process.exe() {
                Some(path) if !path.as_os_str().is_empty() => Probe::Found(path.to_path_buf()),
                _ => Probe::AccessDenied,
            },
            None => Probe::NotFound,
        }
    }
}
