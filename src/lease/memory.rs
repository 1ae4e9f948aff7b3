//! In-process coordination store
//!
//! Same semantics as the Redis backend, with expiry driven by the tokio clock.
//! Used by tests and by single-process dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::CoordinationStore;
use crate::error::LeaseError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Coordination store backed by a mutex-guarded map
#[derive(Debug, Default)]
pub struct MemoryCoordinator {
    entries: Mutex<HashMap<String, Entry>>,
    failing: AtomicBool,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Overwrite `key` unconditionally, as another process would after expiry
    pub fn force_set(&self, key: &str, value: &str, ttl: Duration) {
        self.live_entries().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Delete `key` unconditionally
    pub fn force_delete(&self, key: &str) {
        self.live_entries().remove(key);
    }

    fn check(&self) -> Result<(), LeaseError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LeaseError::Unavailable("coordination store offline".to_string()));
        }
        Ok(())
    }

    /// Lock the map with expired keys already evicted
    fn live_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinator {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        self.check()?;
        let mut entries = self.live_entries();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        self.check()?;
        match self.live_entries().get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LeaseError> {
        self.check()?;
        let mut entries = self.live_entries();
        match entries.get(key) {
            Some(entry) if entry.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LeaseError> {
        self.check()?;
        Ok(self.live_entries().get(key).map(|e| e.value.clone()))
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, LeaseError> {
        self.check()?;
        let now = Instant::now();
        Ok(self
            .live_entries()
            .get(key)
            .map(|e| e.expires_at.saturating_duration_since(now)))
    }
}
