//! Poller statistics (thread-safe counters shared by scheduler and workers)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PollStats {
    /// Scheduling cycles run
    pub cycles: AtomicU64,

    /// Work items enqueued
    pub enqueued: AtomicU64,

    /// Registered servers skipped as misconfigured
    pub skipped_servers: AtomicU64,

    /// Successful probes
    pub probes_ok: AtomicU64,

    /// Failed probes
    pub probe_failures: AtomicU64,

    /// Snapshots written to the store
    pub writes: AtomicU64,

    /// Snapshots not written because the cache matched
    pub dedup_skips: AtomicU64,

    /// Failed store writes
    pub store_failures: AtomicU64,

    /// Items waiting in the queue
    pending: AtomicU64,
}

impl PollStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_cycle(&self, skipped: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.skipped_servers.fetch_add(skipped, Ordering::Relaxed);
    }

    /// Count an item before it is sent, so a fast worker never dequeues it first
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo [`PollStats::record_enqueued`] for an item the queue refused
    pub fn cancel_enqueued(&self) {
        self.enqueued.fetch_sub(1, Ordering::Relaxed);
        self.record_dequeued();
    }

    pub fn record_dequeued(&self) {
        // Saturates at zero after a reset
        let _ = self
            .pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Forget items left in a queue that was dropped
    pub fn reset_pending(&self) -> u64 {
        self.pending.swap(0, Ordering::Relaxed)
    }

    pub fn record_probe(&self, success: bool) {
        if success {
            self.probes_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.probe_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dedup_skip(&self) {
        self.dedup_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_depth(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> PollStatsSnapshot {
        PollStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            skipped_servers: self.skipped_servers.load(Ordering::Relaxed),
            probes_ok: self.probes_ok.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            dedup_skips: self.dedup_skips.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            queue_depth: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of poller statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStatsSnapshot {
    pub cycles: u64,
    pub enqueued: u64,
    pub skipped_servers: u64,
    pub probes_ok: u64,
    pub probe_failures: u64,
    pub writes: u64,
    pub dedup_skips: u64,
    pub store_failures: u64,
    pub queue_depth: u64,
}

impl PollStatsSnapshot {
    /// Probes finished, successful or not
    pub fn probes_done(&self) -> u64 {
        self.probes_ok + self.probe_failures
    }

    /// Probe success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.probes_done();
        if total == 0 {
            return 1.0;
        }
        self.probes_ok as f64 / total as f64
    }
}
