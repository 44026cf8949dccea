//! Logic Module - Monitoring and blocking engine
//!
//! Leaves first:
//! - `catalog` - software identities and their executable names
//! - `telemetry/` - OS processes, connections and write counters
//! - `traffic` - upload rate and running totals per process
//! - `registry` - live table of tracked processes
//! - `blocklist/` - durable blocked-pid set
//! - `response/` - host firewall rule enforcers
//! - `aggregate` - per-software roll-up and snapshot types
//! - `monitor/` - reconciliation loop and operator requests

pub mod aggregate;
pub mod blocklist;
pub mod catalog;
pub mod config;
pub mod monitor;
pub mod privilege;
pub mod registry;
pub mod response;
pub mod telemetry;
pub mod traffic;
