//! mcpulse - distributed Minecraft server status poller
//!
//! Periodically queries the live status of every registered Java and Bedrock
//! server, deduplicates unchanged results and upserts the latest snapshot per
//! server. When several replicas run, a Redis lease makes sure exactly one of
//! them polls at a time, with failover when that replica dies.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`error`] - Error types per boundary and the unified [`error::Error`]
//! - [`models`] - Server rows, work items and status snapshots
//! - [`probe`] - Java / Bedrock status protocols and MOTD rendering
//! - [`cache`] - Write deduplication
//! - [`store`] - Server registry and status persistence (PostgreSQL, in-memory)
//! - [`lease`] - Leader lease over a coordination store (Redis, in-memory)
//! - [`poller`] - Scheduler, worker pool and the service lifecycle
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcpulse::config::Config;
//! use mcpulse::lease::RedisCoordinator;
//! use mcpulse::poller::PollerService;
//! use mcpulse::probe::MinecraftProbe;
//! use mcpulse::store::{PostgresStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let coordination = Arc::new(RedisCoordinator::connect(&config.redis).await?);
//!     let store = Arc::new(PostgresStore::connect(StoreConfig::from(&config.database)).await?);
//!
//!     let service = PollerService::from_config(
//!         &config,
//!         coordination,
//!         store.clone(),
//!         store,
//!         Arc::new(MinecraftProbe::new()),
//!     );
//!     let handle = service.start();
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod lease;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod probe;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{StatusCache, WriteDecision};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, PulseErrorTrait, Result};
    pub use crate::lease::{CoordinationStore, LeaderLock, LeaseState};
    pub use crate::models::{ServerId, ServerKind, ServerRecord, StatusSnapshot, WorkItem};
    pub use crate::poller::{PollerHandle, PollerService};
    pub use crate::probe::{MinecraftProbe, StatusProbe};
    pub use crate::store::{ServerRegistry, StatusStore};
}

// Direct re-exports for convenience
pub use models::{ServerId, ServerKind, StatusSnapshot};
