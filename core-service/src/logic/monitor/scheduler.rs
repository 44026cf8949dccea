//! Scheduler - Background reconciliation loop
//!
//! Ticks on a fixed interval on its own thread. No cycle error ends the loop;
//! the stop flag is polled in short slices so `stop()` returns promptly.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::Shared;

const STOP_POLL: Duration = Duration::from_millis(100);

pub(crate) fn spawn(shared: Arc<Shared>) -> JoinHandle<()> {
    thread::spawn(move || {
        log::info!("Monitor loop started (every {:?})", shared.interval);

        while shared.running.load(Ordering::SeqCst) {
            let started = Instant::now();
            // Errors are logged and published by tick()
            let _ = shared.tick();

            while shared.running.load(Ordering::SeqCst) && started.elapsed() < shared.interval {
                let remaining = shared.interval.saturating_sub(started.elapsed());
                thread::sleep(remaining.min(STOP_POLL));
            }
        }

        log::info!("Monitor loop stopped");
    })
}
