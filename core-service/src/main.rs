//! Anti-PCDN - Main Entry Point
//!
//! Watches known desktop software for background upload traffic and lets the
//! operator cut off a process's outbound network access.

mod api;
mod logic;
pub mod constants;

use std::io;

use constants::{APP_NAME, APP_VERSION};
use logic::config::load_config;
use logic::monitor::{Engine, Monitor};
use logic::response::build_enforcer;
use logic::telemetry::SystemTelemetry;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    if !logic::privilege::is_elevated() {
        log::warn!("Not running elevated: write counters hidden (estimating traffic) and blocking will fail");
    }

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    let enforcer = build_enforcer(config.firewall, config.rule_naming(), config.enforcer_timeout());
    log::info!("Firewall backend: {}", enforcer.name());
    log::info!("Block state file: {:?}", config.blocklist_path);

    let telemetry = match SystemTelemetry::new(config.enforcer_timeout()) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            log::error!("Cannot start telemetry: {}", e);
            std::process::exit(1);
        }
    };

    let engine = Engine::new(Box::new(telemetry), enforcer, &config);
    let monitor = Monitor::new(engine, config.scan_interval());
    monitor.start();

    let stdin = io::stdin();
    if let Err(e) = api::console::run(&monitor, stdin.lock(), io::stdout()) {
        log::error!("Console I/O error: {}", e);
    }

    monitor.stop();
    log::info!("{} stopped", APP_NAME);
}
