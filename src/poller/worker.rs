//! Worker pool: N consumers sharing one work queue
//!
//! Each worker loops: dequeue one item, probe it, ask the cache whether the
//! result is worth persisting, upsert it if so. Nothing that happens to one
//! item (probe error, store error, even a panic inside the probe) stops the
//! worker from taking the next one.
//!
//! On shutdown a worker stops dequeuing; the probe it is running finishes or
//! hits its own timeout first.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::PollStats;
use crate::cache::StatusCache;
use crate::metrics;
use crate::models::WorkItem;
use crate::probe::StatusProbe;
use crate::store::SharedStatusStore;

pub type SharedProbe = Arc<dyn StatusProbe>;

/// Fixed-size pool of probe workers
#[derive(Clone)]
pub struct WorkerPool {
    worker_count: usize,
    probe_timeout: Duration,
    probe: SharedProbe,
    cache: Arc<StatusCache>,
    store: SharedStatusStore,
    stats: Arc<PollStats>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        probe_timeout: Duration,
        probe: SharedProbe,
        cache: Arc<StatusCache>,
        store: SharedStatusStore,
        stats: Arc<PollStats>,
    ) -> Self {
        Self {
            worker_count: worker_count.max(1),
            probe_timeout,
            probe,
            cache,
            store,
            stats,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    /// Spawn the workers; they exit on shutdown or once the queue is closed and empty
    pub fn spawn(
        &self,
        queue: mpsc::UnboundedReceiver<WorkItem>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let queue = Arc::new(Mutex::new(queue));

        (0..self.worker_count)
            .map(|worker_id| {
                let pool = self.clone();
                let queue = Arc::clone(&queue);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(worker_id, queue, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        queue: Arc<Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let item = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                item = async { queue.lock().await.recv().await } => item,
            };

            let Some(item) = item else {
                break; // Channel closed
            };

            self.stats.record_dequeued();
            metrics::set_queue_depth(self.stats.queue_depth() as usize);

            let server_id = item.server_id;
            if AssertUnwindSafe(self.process(worker_id, item))
                .catch_unwind()
                .await
                .is_err()
            {
                tracing::error!(worker_id, server_id = %server_id, "Worker panicked while processing item");
            }
        }

        tracing::debug!(worker_id, "Worker shutting down");
    }

    /// Probe one server and persist the result if the cache says so
    pub async fn process(&self, worker_id: usize, item: WorkItem) {
        tracing::debug!(worker_id, server_id = %item.server_id, address = %item.address, "Probing");

        let result = {
            let _timer = metrics::start_probe_timer(item.kind);
            self.probe
                .probe(&item.address, item.kind, self.probe_timeout)
                .await
        };

        let snapshot = match result {
            Ok(snapshot) => {
                self.stats.record_probe(true);
                metrics::record_probe(item.kind, true);
                snapshot
            }
            Err(e) => {
                self.stats.record_probe(false);
                metrics::record_probe(item.kind, false);
                tracing::warn!(
                    server_id = %item.server_id,
                    address = %item.address,
                    kind = %item.kind,
                    error = %e,
                    "Probe failed"
                );
                return;
            }
        };

        let now = Utc::now();
        let decision = self.cache.decide(item.server_id, &snapshot, now);
        if !decision.is_write() {
            self.stats.record_dedup_skip();
            metrics::record_write(decision, false);
            tracing::debug!(server_id = %item.server_id, "Snapshot unchanged, skipping write");
            return;
        }

        match self.store.upsert(item.server_id, &snapshot, now).await {
            Ok(()) => {
                self.stats.record_write();
                metrics::record_write(decision, true);
                tracing::debug!(
                    server_id = %item.server_id,
                    decision = decision.as_str(),
                    players = snapshot.players.online,
                    "Snapshot written"
                );
            }
            Err(e) => {
                // Next cycle must write again
                self.cache.forget(item.server_id);
                self.stats.record_store_failure();
                metrics::record_write(decision, false);
                tracing::warn!(server_id = %item.server_id, error = %e, "Status store write failed");
            }
        }
    }
}
