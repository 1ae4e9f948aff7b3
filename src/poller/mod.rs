//! Distributed status polling
//!
//! ```text
//!  LeaderLock ──gates──▶ PollScheduler ──mpsc──▶ WorkerPool (N tasks)
//!      │                       │                     │
//!   renew loop           ServerRegistry      StatusProbe → StatusCache → StatusStore
//! ```
//!
//! [`PollerService`] ties the pieces together: it competes for the lease, runs
//! one scheduler and one worker pool per leadership term, and tears both down
//! when the lease is lost or shutdown is requested.

mod scheduler;
mod service;
mod stats;
mod worker;

pub use scheduler::{BatchSummary, PollScheduler};
pub use service::{PollerHandle, PollerService, ServiceSettings};
pub use stats::{PollStats, PollStatsSnapshot};
pub use worker::{SharedProbe, WorkerPool};
