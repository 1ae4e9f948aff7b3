//! Prometheus metrics for the status poller
//!
//! Tracks leadership, scheduling and the probe/dedup/store path.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops. The
//! [`server`] submodule exposes them for scraping.

pub mod server;

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::cache::WriteDecision;
use crate::models::ServerKind;

/// Container for all poller metrics
struct PollerMetrics {
    is_leader: Gauge,
    lease_events: CounterVec,
    queue_depth: Gauge,
    batch_size: Gauge,
    skipped_servers: Counter,
    probes: CounterVec,
    probe_duration: HistogramVec,
    store_writes: CounterVec,
    dedup_skips: Counter,
    store_failures: Counter,
}

static POLLER_METRICS: OnceLock<PollerMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Initialize all Prometheus metrics
///
/// Safe to call more than once. If registration fails, subsequent metric
/// operations become no-ops.
///
/// ```ignore
/// if let Err(e) = mcpulse::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PollerMetrics {
        is_leader: register_gauge!(
            "mcpulse_is_leader",
            "Whether this process holds the poller lease (1 = yes, 0 = no)"
        )?,
        lease_events: register_counter_vec!(
            "mcpulse_lease_events_total",
            "Lease transitions by event",
            &["event"]
        )?,
        queue_depth: register_gauge!(
            "mcpulse_queue_depth",
            "Work items waiting for a worker"
        )?,
        batch_size: register_gauge!(
            "mcpulse_batch_size",
            "Servers enqueued by the last scheduling cycle"
        )?,
        skipped_servers: register_counter!(
            "mcpulse_skipped_servers_total",
            "Registered servers skipped because of invalid configuration"
        )?,
        probes: register_counter_vec!(
            "mcpulse_probes_total",
            "Status probes by server kind and outcome",
            &["kind", "outcome"]
        )?,
        probe_duration: register_histogram_vec!(
            "mcpulse_probe_duration_seconds",
            "Status probe duration in seconds",
            &["kind"],
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
        store_writes: register_counter_vec!(
            "mcpulse_store_writes_total",
            "Snapshots written to the status store by dedup decision",
            &["decision"]
        )?,
        dedup_skips: register_counter!(
            "mcpulse_dedup_skips_total",
            "Snapshots not written because they matched the cache"
        )?,
        store_failures: register_counter!(
            "mcpulse_store_failures_total",
            "Failed status store writes"
        )?,
    };

    POLLER_METRICS
        .set(metrics)
        .map_err(|_| "Poller metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    POLLER_METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a leadership change (`acquired`, `lost`, `released`)
pub fn record_lease_event(event: &str, is_leader: bool) {
    let Some(m) = POLLER_METRICS.get() else {
        return;
    };

    m.lease_events.with_label_values(&[event]).inc();
    m.is_leader.set(if is_leader { 1.0 } else { 0.0 });
}

/// Record one scheduling cycle
pub fn record_batch(enqueued: usize, skipped: usize) {
    let Some(m) = POLLER_METRICS.get() else {
        return;
    };

    m.batch_size.set(enqueued as f64);
    if skipped > 0 {
        m.skipped_servers.inc_by(skipped as f64);
    }
}

pub fn set_queue_depth(depth: usize) {
    if let Some(m) = POLLER_METRICS.get() {
        m.queue_depth.set(depth as f64);
    }
}

/// Record a probe outcome
pub fn record_probe(kind: ServerKind, success: bool) {
    if let Some(m) = POLLER_METRICS.get() {
        let outcome = if success { "ok" } else { "failed" };
        m.probes.with_label_values(&[kind.as_str(), outcome]).inc();
    }
}

/// Record a dedup decision and, for writes, whether the store accepted it
pub fn record_write(decision: WriteDecision, stored: bool) {
    let Some(m) = POLLER_METRICS.get() else {
        return;
    };

    if !decision.is_write() {
        m.dedup_skips.inc();
    } else if stored {
        m.store_writes.with_label_values(&[decision.as_str()]).inc();
    } else {
        m.store_failures.inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a probe timer
pub fn start_probe_timer(kind: ServerKind) -> MetricsTimer {
    match POLLER_METRICS.get() {
        Some(m) => MetricsTimer::new(
            m.probe_duration
                .with_label_values(&[kind.as_str()])
                .start_timer(),
        ),
        None => MetricsTimer::noop(),
    }
}
