//! In-memory status cache used to deduplicate store writes
//!
//! The cache remembers, per server, the last snapshot handed to the status
//! store and when that happened. A new probe result is only written when:
//!
//! - no entry exists yet for the server,
//! - the snapshot differs from the cached one, or
//! - the cached entry is older than the refresh window, so the persisted
//!   timestamp keeps advancing for a perfectly stable server.
//!
//! The cache is process-local and owned by the worker pool; a fresh process
//! rebuilds it from its first polling cycle.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use mcpulse::cache::StatusCache;
//! use mcpulse::models::{Players, ServerId, StatusSnapshot};
//!
//! let cache = StatusCache::new(Duration::from_secs(300));
//! let snapshot = StatusSnapshot::online(Players { online: 1, max: 10 }, "1.20.4", 12.0);
//!
//! assert!(cache.should_write(ServerId(1), &snapshot));
//! assert!(!cache.should_write(ServerId(1), &snapshot));
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::models::{ServerId, StatusSnapshot};

/// Last snapshot written for one server
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub snapshot: StatusSnapshot,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.written_at
    }
}

/// Outcome of a dedup check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// First snapshot seen for this server
    New,
    /// Snapshot differs from the cached one
    Changed,
    /// Snapshot unchanged but the refresh window elapsed
    Refresh,
    /// Snapshot unchanged and still fresh
    Skip,
}

impl WriteDecision {
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Skip)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Changed => "changed",
            Self::Refresh => "refresh",
            Self::Skip => "skip",
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Decisions that asked for a write
    pub writes: u64,
    /// Decisions that skipped the write
    pub skips: u64,
}

impl CacheStats {
    /// Fraction of decisions that were skipped
    pub fn skip_rate(&self) -> f64 {
        let total = self.writes + self.skips;
        if total == 0 {
            0.0
        } else {
            self.skips as f64 / total as f64
        }
    }
}

/// Dedup cache keyed by server identifier
#[derive(Debug)]
pub struct StatusCache {
    entries: Mutex<HashMap<ServerId, CacheEntry>>,
    refresh_after: chrono::Duration,
    writes: AtomicU64,
    skips: AtomicU64,
}

impl StatusCache {
    /// Create a cache that forces a rewrite once an entry is older than `refresh_after`
    pub fn new(refresh_after: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            refresh_after: chrono::Duration::from_std(refresh_after)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            writes: AtomicU64::new(0),
            skips: AtomicU64::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ServerId, CacheEntry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check whether `snapshot` should be written, reserving the write if so
    pub fn should_write(&self, server_id: ServerId, snapshot: &StatusSnapshot) -> bool {
        self.decide(server_id, snapshot, Utc::now()).is_write()
    }

    /// Decide whether to write at `now`.
    ///
    /// A write decision records the snapshot immediately, so concurrent callers
    /// with the same snapshot see `Skip`. Call [`StatusCache::forget`] if the
    /// store write then fails.
    pub fn decide(
        &self,
        server_id: ServerId,
        snapshot: &StatusSnapshot,
        now: DateTime<Utc>,
    ) -> WriteDecision {
        let mut entries = self.entries();

        let decision = match entries.get(&server_id) {
            None => WriteDecision::New,
            Some(entry) if entry.snapshot != *snapshot => WriteDecision::Changed,
            Some(entry) if entry.age(now) > self.refresh_after => WriteDecision::Refresh,
            Some(_) => WriteDecision::Skip,
        };

        if decision.is_write() {
            entries.insert(
                server_id,
                CacheEntry {
                    snapshot: snapshot.clone(),
                    written_at: now,
                },
            );
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.skips.fetch_add(1, Ordering::Relaxed);
        }

        decision
    }

    /// Record a snapshot as written at `now`
    pub fn record(&self, server_id: ServerId, snapshot: StatusSnapshot, now: DateTime<Utc>) {
        self.entries().insert(
            server_id,
            CacheEntry {
                snapshot,
                written_at: now,
            },
        );
    }

    /// Drop the entry for a server so the next probe result is written again
    pub fn forget(&self, server_id: ServerId) -> Option<CacheEntry> {
        self.entries().remove(&server_id)
    }

    /// Get the cached entry for a server
    pub fn get(&self, server_id: ServerId) -> Option<CacheEntry> {
        self.entries().get(&server_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            writes: self.writes.load(Ordering::Relaxed),
            skips: self.skips.load(Ordering::Relaxed),
        }
    }
}
