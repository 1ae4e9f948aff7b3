//! Leader lease
//!
//! At most one process polls at a time. The right to poll is a single key in
//! a shared coordination store holding the leader's random token with a TTL:
//!
//! ```text
//!            acquire() ok                 renew() failed / errored
//! Follower ───────────────▶ Leader ────────────────────────────────▶ Follower
//!     │                        │
//!     └──── stop() ────────────┴──────────── stop() ───────────────▶ Stopped
//! ```
//!
//! Every mutation of the key after acquisition compares the stored token with
//! our own inside one atomic store operation, so a process can never extend or
//! delete a lease that expired and was taken by someone else.
//!
//! Leadership fails closed: an error or timeout while acquiring means "not
//! leader", and an error or timeout while renewing means "no longer leader".

mod memory;
mod redis_coordinator;

pub use memory::MemoryCoordinator;
pub use redis_coordinator::RedisCoordinator;

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::LeaseError;
use crate::metrics;

/// Atomic primitives the lease needs from a coordination store
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Set `key` to `value` with `ttl` only if the key does not exist
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, LeaseError>;

    /// Reset the TTL of `key` only if it currently holds `expected`
    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError>;

    /// Delete `key` only if it currently holds `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LeaseError>;

    /// Current value of `key`
    async fn get(&self, key: &str) -> Result<Option<String>, LeaseError>;

    /// Remaining lifetime of `key`, `None` if it does not exist
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, LeaseError>;
}

pub type SharedCoordinationStore = Arc<dyn CoordinationStore>;

/// Leadership state of this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Follower,
    Leader,
    Stopped,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follower => "follower",
            Self::Leader => "leader",
            Self::Stopped => "stopped",
        }
    }
}

/// Why the renewal loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// Renewal failed; leadership is gone
    Lost,
    /// Shutdown was requested while still leader
    Shutdown,
}

/// Lease manager for one process
pub struct LeaderLock {
    store: SharedCoordinationStore,
    key: String,
    token: String,
    ttl: Duration,
    op_timeout: Duration,
    state: Mutex<LeaseState>,
}

impl LeaderLock {
    /// Create a lock with a fresh random token
    pub fn new(store: SharedCoordinationStore, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            token: uuid::Uuid::new_v4().to_string(),
            ttl,
            op_timeout: ttl / 3,
            state: Mutex::new(LeaseState::Follower),
        }
    }

    /// Use a fixed token instead of a random one
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Deadline for a single coordination store call
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn state(&self) -> LeaseState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_leader(&self) -> bool {
        self.state() == LeaseState::Leader
    }

    fn set_state(&self, next: LeaseState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Stopped is terminal
        if *state != LeaseState::Stopped {
            *state = next;
        }
    }

    async fn call<T>(
        &self,
        op: impl Future<Output = Result<T, LeaseError>>,
    ) -> Result<T, LeaseError> {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| LeaseError::Timeout(self.op_timeout))?
    }

    /// Try to become leader. Any error counts as "not acquired".
    pub async fn acquire(&self) -> bool {
        if self.state() == LeaseState::Stopped {
            return false;
        }

        match self
            .call(self.store.set_if_absent(&self.key, &self.token, self.ttl))
            .await
        {
            Ok(true) => {
                self.set_state(LeaseState::Leader);
                tracing::info!(key = %self.key, token = %self.token, ttl = ?self.ttl, "Acquired poller lease");
                metrics::record_lease_event("acquired", true);
                true
            }
            Ok(false) => {
                tracing::debug!(key = %self.key, "Lease held by another process");
                false
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Lease acquire failed, staying follower");
                false
            }
        }
    }

    /// Extend the lease if we still own it. Any error counts as lost leadership.
    pub async fn renew(&self) -> bool {
        if self.state() != LeaseState::Leader {
            return false;
        }

        let result = self
            .call(self.store.compare_and_expire(&self.key, &self.token, self.ttl))
            .await;

        match result {
            Ok(true) => {
                tracing::debug!(key = %self.key, "Lease renewed");
                true
            }
            Ok(false) => {
                tracing::error!(key = %self.key, "Lease is no longer ours, standing down");
                self.mark_lost();
                false
            }
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Lease renewal failed, standing down");
                self.mark_lost();
                false
            }
        }
    }

    fn mark_lost(&self) {
        self.set_state(LeaseState::Follower);
        metrics::record_lease_event("lost", false);
    }

    /// Delete the lease if we still own it; returns whether a key was deleted
    pub async fn release(&self) -> bool {
        let was_leader = self.is_leader();
        self.set_state(LeaseState::Follower);

        match self
            .call(self.store.compare_and_delete(&self.key, &self.token))
            .await
        {
            Ok(true) => {
                tracing::info!(key = %self.key, "Released poller lease");
                metrics::record_lease_event("released", false);
                true
            }
            Ok(false) => {
                if was_leader {
                    tracing::warn!(key = %self.key, "Lease was already gone at release");
                }
                false
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Lease release failed, it will expire on its own");
                false
            }
        }
    }

    /// Release the lease and refuse any further acquisition
    pub async fn stop(&self) -> bool {
        let released = self.release().await;
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = LeaseState::Stopped;
        released
    }

    /// Renew every `interval` until renewal fails or `shutdown` fires
    pub async fn run_renewal(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> RenewalOutcome {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                return RenewalOutcome::Shutdown;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return RenewalOutcome::Shutdown;
                    }
                }
                _ = ticker.tick() => {
                    if !self.renew().await {
                        return RenewalOutcome::Lost;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for LeaderLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderLock")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("ttl", &self.ttl)
            .field("state", &self.state())
            .finish()
    }
}
