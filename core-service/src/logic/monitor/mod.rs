//! Monitor Module - Reconciliation loop and operator control surface
//!
//! # Components
//! - `engine.rs`: registry, blocked set and enforcement for one cycle
//! - `scheduler.rs`: background loop thread
//! - `types.rs`: operator results and errors
//!
//! All reads and writes of engine state go through one lock. Each finished
//! cycle publishes a fresh `Arc<MonitorSnapshot>` by replacement, so readers
//! never see a half-updated snapshot.

pub mod engine;
pub mod scheduler;
pub mod types;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::aggregate::MonitorSnapshot;
use super::telemetry::{Pid, TelemetryError};

pub use engine::Engine;
pub use types::{ControlError, CycleReport, IdentityOutcome, SweepReport};

pub(crate) struct Shared {
    engine: Mutex<Engine>,
    snapshot_tx: watch::Sender<Arc<MonitorSnapshot>>,
    running: AtomicBool,
    interval: Duration,
}

impl Shared {
    /// Run one cycle and publish the outcome
    pub(crate) fn tick(&self) -> Result<CycleReport, TelemetryError> {
        let mut engine = self.engine.lock();
        match engine.run_cycle(Utc::now()) {
            Ok(report) => {
                self.snapshot_tx.send_replace(Arc::new(engine.snapshot(Utc::now())));
                Ok(report)
            }
            Err(e) => {
                log::warn!("Scan cycle skipped: {}", e);
                let mut previous = (**self.snapshot_tx.borrow()).clone();
                previous.last_error = Some(e.to_string());
                self.snapshot_tx.send_replace(Arc::new(previous));
                Err(e)
            }
        }
    }

    /// Republish after an operator change so readers see it before the next tick
    fn publish(&self, engine: &Engine) {
        self.snapshot_tx.send_replace(Arc::new(engine.snapshot(Utc::now())));
    }
}

pub struct Monitor {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(engine: Engine, interval: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(engine.snapshot(Utc::now())));
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                snapshot_tx,
                running: AtomicBool::new(false),
                interval,
            }),
            handle: Mutex::new(None),
        }
    }

    // ========================================================================
    // LOOP CONTROL
    // ========================================================================

    /// Start the background loop; false if it is already running
    pub fn start(&self) -> bool {
        let mut handle = self.handle.lock();
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(old) = handle.take() {
            let _ = old.join();
        }
        *handle = Some(scheduler::spawn(Arc::clone(&self.shared)));
        true
    }

    /// Stop the loop and wait for the in-flight cycle to finish
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!("Monitor loop thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Run a single cycle on the calling thread
    #[cfg(test)]
    pub fn tick(&self) -> Result<CycleReport, TelemetryError> {
        self.shared.tick()
    }

    // ========================================================================
    // SNAPSHOT
    // ========================================================================

    pub fn snapshot(&self) -> Arc<MonitorSnapshot> {
        self.shared.snapshot_tx.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<Arc<MonitorSnapshot>> {
        self.shared.snapshot_tx.subscribe()
    }

    // ========================================================================
    // OPERATOR REQUESTS
    // ========================================================================

    pub fn block_pid(&self, pid: Pid) -> Result<(), ControlError> {
        self.with_engine(|engine| engine.request_block(pid))
    }

    pub fn unblock_pid(&self, pid: Pid) -> Result<(), ControlError> {
        self.with_engine(|engine| engine.request_unblock(pid))
    }

    pub fn block_identity(&self, identity: &str) -> Result<IdentityOutcome, ControlError> {
        self.with_engine(|engine| engine.block_identity(identity))
    }

    pub fn unblock_identity(&self, identity: &str) -> Result<IdentityOutcome, ControlError> {
        self.with_engine(|engine| engine.unblock_identity(identity))
    }

    pub fn sweep_all(&self) -> SweepReport {
        self.with_engine(|engine| engine.sweep_all())
    }

    pub fn set_rate_limit(&self, identity: &str, kbps: u32) -> Result<(), ControlError> {
        self.with_engine(|engine| engine.set_rate_limit(identity, kbps))
    }

    pub fn clear_rate_limit(&self, identity: &str) -> bool {
        self.with_engine(|engine| engine.clear_rate_limit(identity))
    }

    pub fn identities(&self) -> Vec<String> {
        self.shared.engine.lock().catalog().identities().map(str::to_string).collect()
    }

    pub fn enforcer_name(&self) -> &'static str {
        self.shared.engine.lock().enforcer_name()
    }

    fn with_engine<T>(&self, op: impl FnOnce(&mut Engine) -> T) -> T {
        let mut engine = self.shared.engine.lock();
        let result = op(&mut engine);
        self.shared.publish(&engine);
        result
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}
