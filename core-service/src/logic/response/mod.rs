//! Response Module - Firewall rule enforcement
//!
//! # Components
//! - `firewall.rs`: `RuleEnforcer` capability and backend selection
//! - `netsh.rs`: Windows Firewall adapter
//! - `iptables.rs`: Linux netfilter adapter
//! - `command.rs`: external command runner with timeout
//! - `types.rs`: rule naming and enforcement errors

pub mod command;
pub mod firewall;
pub mod iptables;
pub mod netsh;
pub mod types;

pub use firewall::{build_enforcer, FirewallBackend, RuleEnforcer};
pub use types::{EnforcementError, RuleId, RuleNaming};
