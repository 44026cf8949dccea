//! API Module
//!
//! Operator-facing surface over the monitor.
//!
//! Structure:
//! - commands.rs: typed operations returning `Result<T, String>`
//! - console.rs: line-oriented console built on the commands

pub mod commands;
pub mod console;
