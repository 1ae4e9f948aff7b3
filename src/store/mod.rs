//! Persistence boundary for the poller
//!
//! Two traits, both implemented by every backend:
//!
//! - [`ServerRegistry`] lists the registered servers once per scheduling cycle.
//! - [`StatusStore`] upserts the latest snapshot per server and reads it back.
//!
//! Writes are upserts keyed by server id, so concurrent writers never need
//! row locks and the last write wins.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresStore, StoreConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{ServerId, ServerRecord, StatusSnapshot};

/// Latest persisted status of one server
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStatus {
    pub server_id: ServerId,
    pub snapshot: StatusSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of the registered servers
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// List every registered server, misconfigured rows included
    async fn list_servers(&self) -> Result<Vec<ServerRecord>, StoreError>;
}

/// Latest-status persistence
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert or replace the snapshot for `server_id`
    async fn upsert(
        &self,
        server_id: ServerId,
        snapshot: &StatusSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Latest snapshot for `server_id`, if one was ever written
    async fn get_latest(&self, server_id: ServerId) -> Result<Option<StoredStatus>, StoreError>;
}

pub type SharedRegistry = Arc<dyn ServerRegistry>;
pub type SharedStatusStore = Arc<dyn StatusStore>;
