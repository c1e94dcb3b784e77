//! Pipeline counters for monitoring
//!
//! # Design Principles (KISS)
//! - Lock-free atomic counters for hot path (zero overhead on data path)
//! - Simple snapshot mechanism for reporting
//! - Relaxed ordering throughout: statistics are eventually consistent,
//!   which is acceptable for monitoring

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared between the producer, demultiplexer and loop
#[derive(Debug, Default)]
pub struct PipelineCounters {
    /// Data batches copied out of driver buffers and enqueued
    pub batches_enqueued: AtomicU64,
    /// Data batches routed to field sinks
    pub batches_routed: AtomicU64,
    /// Events routed (sum of batch lengths)
    pub events_routed: AtomicU64,
    /// End-of-measurement sentinels enqueued
    pub sentinels: AtomicU64,
    /// Sink append failures (logged and skipped, never fatal)
    pub sink_errors: AtomicU64,
}

impl PipelineCounters {
    /// Create new zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_batches_enqueued(&self) {
        self.batches_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_batches_routed(&self) {
        self.batches_routed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_events_routed(&self, n: u64) {
        self.events_routed.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_sentinels(&self) {
        self.sentinels.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_sink_errors(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            batches_enqueued: self.batches_enqueued.load(Ordering::Relaxed),
            batches_routed: self.batches_routed.load(Ordering::Relaxed),
            events_routed: self.events_routed.load(Ordering::Relaxed),
            sentinels: self.sentinels.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub batches_enqueued: u64,
    pub batches_routed: u64,
    pub events_routed: u64,
    pub sentinels: u64,
    pub sink_errors: u64,
}

impl CounterSnapshot {
    /// Events per second between two snapshots
    pub fn events_rate_from(&self, prev: &CounterSnapshot, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        (self.events_routed.saturating_sub(prev.events_routed)) as f64 / elapsed_secs
    }

    /// Format an events rate as a human-readable string (K/s, M/s)
    pub fn format_events_rate(rate: f64) -> String {
        if rate >= 1_000_000.0 {
            format!("{:.2} M/s", rate / 1_000_000.0)
        } else if rate >= 1_000.0 {
            format!("{:.2} K/s", rate / 1_000.0)
        } else {
            format!("{:.0} /s", rate)
        }
    }
}
