//! Statistics tracking for the sinkhole.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Atomic per-outcome counters.
pub struct Stats {
    started: Instant,
    blocked: AtomicU64,
    forwarded: AtomicU64,
    timed_out: AtomicU64,
    dropped: AtomicU64,
    /// Cumulative response time in microseconds of answered queries.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            blocked: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_blocked(&self, elapsed: Duration) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
        self.add_response_time(elapsed);
    }

    pub fn record_forwarded(&self, elapsed: Duration) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.add_response_time(elapsed);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn add_response_time(&self, elapsed: Duration) {
        self.total_response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let blocked = self.blocked.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let timed_out = self.timed_out.swap(0, Ordering::Relaxed);
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let answered = blocked + forwarded;
        let avg_response_ms = if answered > 0 {
            (total_us as f64 / answered as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests: answered + timed_out + dropped,
            blocked,
            forwarded,
            timed_out,
            dropped,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub blocked: u64,
    pub forwarded: u64,
    pub timed_out: u64,
    pub dropped: u64,
    /// Average time to reply, over blocked and forwarded queries.
    pub avg_response_ms: f64,
}
