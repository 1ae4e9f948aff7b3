//! In-memory registry and status store
//!
//! Used by tests and by `mcpulse run --memory` for a dry run without a
//! database. Failures can be injected to exercise the poller's error paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ServerRegistry, StatusStore, StoredStatus};
use crate::error::StoreError;
use crate::models::{ServerId, ServerRecord, StatusSnapshot};

/// Registry and status store backed by in-process maps
#[derive(Debug, Default)]
pub struct MemoryStore {
    servers: RwLock<Vec<ServerRecord>>,
    statuses: RwLock<HashMap<ServerId, StoredStatus>>,
    failing_writes: RwLock<HashSet<ServerId>>,
    fail_all_writes: AtomicBool,
    fail_listing: AtomicBool,
    upserts: AtomicU64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given servers registered
    pub fn with_servers(servers: Vec<ServerRecord>) -> Self {
        let store = Self::new();
        store.set_servers(servers);
        store
    }

    /// Replace the registered servers
    pub fn set_servers(&self, servers: Vec<ServerRecord>) {
        *write(&self.servers) = servers;
    }

    pub fn add_server(&self, server: ServerRecord) {
        write(&self.servers).push(server);
    }

    /// Make every upsert fail until reset
    pub fn fail_writes(&self, fail: bool) {
        self.fail_all_writes.store(fail, Ordering::SeqCst);
    }

    /// Make upserts for one server fail until reset
    pub fn fail_writes_for(&self, server_id: ServerId, fail: bool) {
        let mut failing = write(&self.failing_writes);
        if fail {
            failing.insert(server_id);
        } else {
            failing.remove(&server_id);
        }
    }

    /// Make `list_servers` fail until reset
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Number of successful upserts
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of servers with a stored snapshot
    pub fn status_count(&self) -> usize {
        read(&self.statuses).len()
    }

    /// Copy of every stored status
    pub fn statuses(&self) -> HashMap<ServerId, StoredStatus> {
        read(&self.statuses).clone()
    }
}

#[async_trait]
impl ServerRegistry for MemoryStore {
    async fn list_servers(&self) -> Result<Vec<ServerRecord>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("registry offline".to_string()));
        }
        Ok(read(&self.servers).clone())
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn upsert(
        &self,
        server_id: ServerId,
        snapshot: &StatusSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.fail_all_writes.load(Ordering::SeqCst)
            || read(&self.failing_writes).contains(&server_id)
        {
            return Err(StoreError::Unavailable(format!(
                "write for server {server_id} rejected"
            )));
        }

        write(&self.statuses).insert(
            server_id,
            StoredStatus {
                server_id,
                snapshot: snapshot.clone(),
                timestamp,
            },
        );
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_latest(&self, server_id: ServerId) -> Result<Option<StoredStatus>, StoreError> {
        Ok(read(&self.statuses).get(&server_id).cloned())
    }
}
