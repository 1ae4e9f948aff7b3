//! Poll scheduler: the single producer of work items

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

use super::PollStats;
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::WorkItem;
use crate::store::SharedRegistry;

/// Outcome of one scheduling cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Items pushed onto the queue
    pub enqueued: usize,
    /// Servers skipped because of invalid configuration
    pub skipped: usize,
}

/// Lists registered servers on a fixed cadence and enqueues one item per server
#[derive(Clone)]
pub struct PollScheduler {
    registry: SharedRegistry,
    interval: Duration,
    stats: Arc<PollStats>,
}

impl PollScheduler {
    pub fn new(registry: SharedRegistry, interval: Duration, stats: Arc<PollStats>) -> Self {
        Self {
            registry,
            interval,
            stats,
        }
    }

    /// Run cycles until `shutdown` fires or the queue closes.
    ///
    /// The first cycle runs immediately. A cycle never waits for the previous
    /// batch to drain.
    pub async fn run(&self, queue: mpsc::UnboundedSender<WorkItem>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.schedule_once(&queue).await {
                        if queue.is_closed() {
                            tracing::debug!("Work queue closed, scheduler exiting");
                            break;
                        }
                        tracing::warn!(error = %e, "Scheduling cycle failed, retrying next cycle");
                    }
                }
            }
        }

        tracing::info!("Poll scheduler stopped");
    }

    /// List servers once and enqueue a work item for each valid one
    pub async fn schedule_once(&self, queue: &mpsc::UnboundedSender<WorkItem>) -> Result<BatchSummary> {
        let backlog = self.stats.queue_depth();
        if backlog > 0 {
            tracing::warn!(backlog, "Previous batch not drained before next cycle");
        }

        let servers = self.registry.list_servers().await?;
        let mut summary = BatchSummary::default();

        for record in &servers {
            let item = match WorkItem::try_from(record) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(server_id = %record.id, error = %e, "Skipping misconfigured server");
                    summary.skipped += 1;
                    continue;
                }
            };

            self.stats.record_enqueued();
            if queue.send(item).is_err() {
                self.stats.cancel_enqueued();
                return Err(Error::other("work queue closed"));
            }
            summary.enqueued += 1;
        }

        self.stats.record_cycle(summary.skipped as u64);
        metrics::record_batch(summary.enqueued, summary.skipped);
        metrics::set_queue_depth(self.stats.queue_depth() as usize);

        tracing::info!(
            enqueued = summary.enqueued,
            skipped = summary.skipped,
            "Scheduled polling batch"
        );

        Ok(summary)
    }
}
