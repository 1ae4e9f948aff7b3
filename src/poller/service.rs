//! Poller lifecycle: lease gating, leadership terms, stand-down

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{PollScheduler, PollStats, PollStatsSnapshot, SharedProbe, WorkerPool};
use crate::cache::StatusCache;
use crate::config::Config;
use crate::lease::{LeaderLock, LeaseState, RenewalOutcome, SharedCoordinationStore};
use crate::store::{SharedRegistry, SharedStatusStore};

/// Timing and sizing knobs for the service
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub poll_interval: Duration,
    pub worker_count: usize,
    pub probe_timeout: Duration,
    pub cache_refresh: Duration,
    pub renew_interval: Duration,
    pub acquire_retry: Duration,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            worker_count: config.poller.worker_count,
            probe_timeout: config.probe_timeout(),
            cache_refresh: config.cache_refresh(),
            renew_interval: config.renew_interval(),
            acquire_retry: config.acquire_retry(),
        }
    }
}

/// Background polling service for one process
///
/// While a follower it retries `acquire` every `acquire_retry`. Once leader it
/// runs the scheduler and worker pool until the lease is lost or shutdown is
/// requested, then drains and goes back to being a follower.
#[derive(Clone)]
pub struct PollerService {
    settings: ServiceSettings,
    lock: Arc<LeaderLock>,
    scheduler: PollScheduler,
    pool: WorkerPool,
    stats: Arc<PollStats>,
}

impl PollerService {
    pub fn new(
        settings: ServiceSettings,
        lock: Arc<LeaderLock>,
        registry: SharedRegistry,
        store: SharedStatusStore,
        probe: SharedProbe,
    ) -> Self {
        let stats = PollStats::new();
        let cache = Arc::new(StatusCache::new(settings.cache_refresh));
        let scheduler = PollScheduler::new(registry, settings.poll_interval, Arc::clone(&stats));
        let pool = WorkerPool::new(
            settings.worker_count,
            settings.probe_timeout,
            probe,
            cache,
            store,
            Arc::clone(&stats),
        );

        Self {
            settings,
            lock,
            scheduler,
            pool,
            stats,
        }
    }

    /// Build the service and its lease from a loaded configuration
    pub fn from_config(
        config: &Config,
        coordination: SharedCoordinationStore,
        registry: SharedRegistry,
        store: SharedStatusStore,
        probe: SharedProbe,
    ) -> Self {
        let lock = Arc::new(LeaderLock::new(
            coordination,
            config.lease.key.clone(),
            config.lease_ttl(),
        ));
        Self::new(ServiceSettings::from(config), lock, registry, store, probe)
    }

    pub fn leader_lock(&self) -> &Arc<LeaderLock> {
        &self.lock
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        self.pool.cache()
    }

    pub fn stats(&self) -> PollStatsSnapshot {
        self.stats.snapshot()
    }

    /// Start competing for leadership in the background
    pub fn start(&self) -> PollerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let service = self.clone();

        tracing::info!(
            workers = self.settings.worker_count,
            poll_interval = ?self.settings.poll_interval,
            token = %self.lock.token(),
            "Starting poller service"
        );

        let task = tokio::spawn(async move { service.run(shutdown_rx).await });

        PollerHandle {
            task,
            shutdown,
            lock: Arc::clone(&self.lock),
            stats: Arc::clone(&self.stats),
        }
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.lock.acquire().await {
                match self.lead(&shutdown).await {
                    RenewalOutcome::Shutdown => break,
                    RenewalOutcome::Lost => {
                        tracing::warn!("Leadership lost, returning to follower");
                    }
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.settings.acquire_retry) => {}
            }
        }

        self.lock.stop().await;
        tracing::info!("Poller service stopped");
    }

    /// One leadership term
    async fn lead(&self, shutdown: &watch::Receiver<bool>) -> RenewalOutcome {
        // Another leader may have written since our last term
        self.pool.cache().clear();

        let (term, term_rx) = watch::channel(false);
        let (queue, queue_rx) = mpsc::unbounded_channel();

        let workers = self.pool.spawn(queue_rx, term_rx.clone());
        let scheduler = {
            let scheduler = self.scheduler.clone();
            tokio::spawn(async move { scheduler.run(queue, term_rx).await })
        };

        let outcome = self
            .lock
            .run_renewal(self.settings.renew_interval, shutdown.clone())
            .await;

        // Stop enqueuing and dequeuing; in-flight probes run to completion
        let _ = term.send(true);
        if let Err(e) = scheduler.await {
            tracing::error!(error = %e, "Scheduler task failed");
        }
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        let dropped = self.stats.reset_pending();
        if dropped > 0 {
            tracing::info!(dropped, "Discarded queued items at end of term");
        }
        crate::metrics::set_queue_depth(0);

        if outcome == RenewalOutcome::Lost {
            // No-op unless the key still holds our token
            self.lock.release().await;
        }

        outcome
    }
}

/// Handle to a running poller service
pub struct PollerHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    lock: Arc<LeaderLock>,
    stats: Arc<PollStats>,
}

impl PollerHandle {
    pub fn state(&self) -> LeaseState {
        self.lock.state()
    }

    pub fn is_leader(&self) -> bool {
        self.lock.is_leader()
    }

    pub fn stats(&self) -> PollStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for the service task to finish
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Poller service task failed");
        }
    }

    /// Cancel polling, let in-flight probes finish, release the lease
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.wait().await;
    }

    /// Like [`PollerHandle::stop`], but release the lease directly if draining
    /// takes longer than `grace`. Returns whether the drain finished in time.
    pub async fn stop_within(self, grace: Duration) -> bool {
        let lock = Arc::clone(&self.lock);
        match tokio::time::timeout(grace, self.stop()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(?grace, "Poller did not drain in time, releasing lease");
                lock.stop().await;
                false
            }
        }
    }
}
