//! Traffic Meter - Upload rate and running total per process
//!
//! Derives an upload rate from successive counter snapshots. Samples whose
//! rate falls outside `[0, upper_bound]` are counter resets or noise: the
//! displayed rate may show them, but the running total is never advanced by
//! them, so one bogus sample cannot corrupt the lifetime total.
//!
//! Two counter sources feed the same meter:
//! - real per-process write counters (needs elevated privilege)
//! - a heuristic that charges a fixed nominal rate to any process holding at
//!   least one established connection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Upper bound of a plausible upload rate (100 MiB/s)
pub const DEFAULT_UPPER_BOUND: f64 = 100.0 * 1024.0 * 1024.0;

/// Nominal rate charged by the connection heuristic (bytes/s)
pub const DEFAULT_NOMINAL_RATE: f64 = 1000.0;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterSource {
    WriteCounter,
    ConnectionHeuristic,
}

/// One observation of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Cumulative bytes written, from the OS
    WriteBytes(u64),
    /// No counter visible; only the established connection count
    Estimated { connections: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficPolicy {
    pub upper_bound: f64,
    pub nominal_rate: f64,
}

impl Default for TrafficPolicy {
    fn default() -> Self {
        Self {
            upper_bound: DEFAULT_UPPER_BOUND,
            nominal_rate: DEFAULT_NOMINAL_RATE,
        }
    }
}

impl TrafficPolicy {
    /// Whether a rate sample may advance the running total
    pub fn accepts(&self, rate: f64) -> bool {
        (0.0..=self.upper_bound).contains(&rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Non-positive time delta; nothing changed
    Skipped,
    /// Counter source changed; new baseline, rate reset to 0
    Reseeded,
    /// Rate in band; total advanced
    Accepted { rate: f64 },
    /// Rate out of band; total untouched
    Rejected { rate: f64 },
}

// ============================================================================
// METER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficMeter {
    /// Latest upload rate (bytes/s), clamped at 0
    pub rate: f64,
    /// Running upload total (bytes), never decreases
    pub cumulative: u64,
    pub last_counter: u64,
    pub last_at: DateTime<Utc>,
    pub source: CounterSource,
}

impl TrafficMeter {
    /// Baseline a new process on its first reading; the first rate is always 0
    pub fn start(reading: Reading, at: DateTime<Utc>) -> Self {
        let (last_counter, source) = match reading {
            Reading::WriteBytes(value) => (value, CounterSource::WriteCounter),
            Reading::Estimated { .. } => (0, CounterSource::ConnectionHeuristic),
        };
        Self {
            rate: 0.0,
            cumulative: 0,
            last_counter,
            last_at: at,
            source,
        }
    }

    pub fn observe(&mut self, reading: Reading, now: DateTime<Utc>, policy: &TrafficPolicy) -> SampleOutcome {
        let elapsed = (now - self.last_at).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return SampleOutcome::Skipped;
        }

        let (raw_rate, increment) = match reading {
            Reading::WriteBytes(value) => {
                if self.source != CounterSource::WriteCounter {
                    // Old baseline belongs to the heuristic; start over
                    self.source = CounterSource::WriteCounter;
                    self.last_counter = value;
                    self.last_at = now;
                    self.rate = 0.0;
                    return SampleOutcome::Reseeded;
                }
                let delta = value as i128 - self.last_counter as i128;
                self.last_counter = value;
                (delta as f64 / elapsed, delta.max(0) as u64)
            }
            Reading::Estimated { connections } => {
                self.source = CounterSource::ConnectionHeuristic;
                let rate = if connections > 0 { policy.nominal_rate } else { 0.0 };
                (rate, (rate * elapsed).round() as u64)
            }
        };

        self.last_at = now;
        self.rate = raw_rate.max(0.0);

        if policy.accepts(raw_rate) {
            self.cumulative = self.cumulative.saturating_add(increment);
            SampleOutcome::Accepted { rate: raw_rate }
        } else {
            SampleOutcome::Rejected { rate: raw_rate }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
