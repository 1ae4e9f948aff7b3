//! Poller service tests
//!
//! Full schedule → probe → dedup → store cycles over in-memory backends:
//! 1. Probe isolation and write deduplication
//! 2. Queue accounting under a multi-threaded runtime
//! 3. Stand-down when the lease changes hands
//! 4. Lifecycle across competing services

use mcpulse::cache::StatusCache;
use mcpulse::lease::{CoordinationStore, LeaseState, MemoryCoordinator};
use mcpulse::models::{ServerId, ServerRecord};
use mcpulse::poller::{PollScheduler, PollStats, WorkerPool};
use mcpulse::probe::MinecraftProbe;
use mcpulse::store::{MemoryStore, StatusStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::fixtures::{java_address, java_servers, JAVA_STATUS_JSON};
use crate::common::{
    fast_settings, service, snapshot, spawn_java_server, wait_until, Behavior, ScriptedProbe,
    LEASE_KEY,
};

const WAIT: Duration = Duration::from_secs(3);

fn stable_probe(count: i64) -> Arc<ScriptedProbe> {
    let probe = Arc::new(ScriptedProbe::new());
    for id in 1..=count {
        probe.set(&java_address(id), Behavior::Online(snapshot(id)));
    }
    probe
}

// ============================================================================
// Polling Cycle Tests
// ============================================================================

#[tokio::test]
async fn test_failed_probe_does_not_affect_others() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(10)));
    let probe = stable_probe(10);
    probe.set(&java_address(4), Behavior::Fail);

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || store.status_count() == 9).await);
    handle.stop().await;

    assert!(store.get_latest(ServerId(4)).await.unwrap().is_none());
    for id in [1, 2, 3, 5, 6, 7, 8, 9, 10] {
        let stored = store.get_latest(ServerId(id)).await.unwrap().unwrap();
        assert_eq!(stored.snapshot, snapshot(id));
    }

    let stats = service.stats();
    assert!(stats.probe_failures >= 1);
    assert!(probe.calls_to(&java_address(4)) >= 1);
}

#[tokio::test]
async fn test_unchanged_status_written_once() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(3)));
    let probe = stable_probe(3);

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || handle.stats().probes_ok >= 12).await);
    handle.stop().await;

    let stats = service.stats();
    assert_eq!(store.upsert_count(), 3, "each server is written once per term");
    assert_eq!(stats.writes, 3);
    assert_eq!(stats.probes_ok, stats.writes + stats.dedup_skips + stats.store_failures);
    assert!(stats.dedup_skips >= 9);
}

#[tokio::test]
async fn test_changed_status_is_written() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(2)));
    let probe = stable_probe(2);

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || store.upsert_count() == 2).await);

    probe.set(&java_address(1), Behavior::Online(snapshot(42)));
    assert!(wait_until(WAIT, || store.upsert_count() == 3).await);
    handle.stop().await;

    let stored = store.get_latest(ServerId(1)).await.unwrap().unwrap();
    assert_eq!(stored.snapshot.players.online, 42);
    let untouched = store.get_latest(ServerId(2)).await.unwrap().unwrap();
    assert_eq!(untouched.snapshot, snapshot(2));
}

#[tokio::test]
async fn test_end_to_end_with_real_protocols() {
    let first = spawn_java_server(JAVA_STATUS_JSON).await;
    let second = spawn_java_server(JAVA_STATUS_JSON).await;

    // Bound then dropped, so nothing answers on this port
    let silent = std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(vec![
        ServerRecord::new(1, &first.to_string(), "JAVA"),
        ServerRecord::new(2, &second.to_string(), "JAVA"),
        ServerRecord::new(3, &silent.to_string(), "BEDROCK"),
    ]));

    let mut settings = fast_settings();
    settings.poll_interval = Duration::from_millis(500);
    settings.probe_timeout = Duration::from_millis(300);

    let service = service(&coordination, &store, Arc::new(MinecraftProbe::new()), settings);
    let handle = service.start();

    assert!(
        wait_until(WAIT, || {
            let stats = handle.stats();
            store.status_count() == 2 && stats.probe_failures >= 1
        })
        .await
    );
    handle.stop().await;

    assert!(store.get_latest(ServerId(3)).await.unwrap().is_none());
    for id in [1, 2] {
        let stored = store.get_latest(ServerId(id)).await.unwrap().unwrap();
        let snapshot = stored.snapshot;
        assert!(snapshot.online);
        assert_eq!(snapshot.version, "1.20.4");
        assert_eq!(snapshot.players.online, 3);
        assert_eq!(snapshot.players.max, 20);
        assert!(snapshot.motd.plain.contains("A Minecraft Server"));
        assert!(snapshot.latency.is_some());
        assert!(snapshot.icon.is_none());
    }
}

// ============================================================================
// Queue Accounting Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_queue_depth_returns_to_zero_after_drain() {
    const SERVERS: i64 = 2000;

    for _ in 0..10 {
        let store = Arc::new(MemoryStore::with_servers(java_servers(SERVERS)));
        let stats = PollStats::new();
        let scheduler = PollScheduler::new(store.clone(), Duration::from_secs(60), stats.clone());
        let pool = WorkerPool::new(
            10,
            Duration::from_millis(200),
            stable_probe(SERVERS),
            Arc::new(StatusCache::new(Duration::from_secs(300))),
            store.clone(),
            stats.clone(),
        );

        let (queue, queue_rx) = tokio::sync::mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = tokio::sync::watch::channel(false);
        let workers = pool.spawn(queue_rx, shutdown_rx);

        let summary = scheduler.schedule_once(&queue).await.unwrap();
        assert_eq!(summary.enqueued, SERVERS as usize);

        assert!(wait_until(WAIT, || stats.snapshot().probes_done() == SERVERS as u64).await);
        assert_eq!(stats.queue_depth(), 0, "no backlog once every item was processed");

        shutdown.send(true).unwrap();
        for worker in workers {
            worker.await.unwrap();
        }
    }
}

// ============================================================================
// Stand-Down Tests
// ============================================================================

#[tokio::test]
async fn test_takeover_stops_enqueuing() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(3)));
    let probe = stable_probe(3);

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || handle.stats().cycles >= 2).await);
    assert!(handle.is_leader());

    // Another process now owns the key
    coordination.force_set(LEASE_KEY, "intruder-token", Duration::from_secs(30));

    assert!(wait_until(Duration::from_millis(500), || !handle.is_leader()).await);
    sleep(Duration::from_millis(100)).await;

    let before = handle.stats();
    let calls_before = probe.call_count();
    sleep(Duration::from_millis(300)).await;
    let after = handle.stats();

    assert_eq!(after.cycles, before.cycles, "no cycles while follower");
    assert_eq!(after.enqueued, before.enqueued);
    assert_eq!(probe.call_count(), calls_before);
    assert_eq!(handle.state(), LeaseState::Follower);
    assert!(handle.is_running());

    handle.stop().await;
    assert_eq!(
        coordination.get(LEASE_KEY).await.unwrap().as_deref(),
        Some("intruder-token"),
        "stopping must not delete another process's lease"
    );
}

#[tokio::test]
async fn test_new_term_rewrites_all_servers() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(2)));
    let probe = stable_probe(2);

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || store.upsert_count() == 2 && handle.stats().cycles >= 2).await);

    // Key vanishes; the service stands down, re-acquires and starts a new term
    coordination.force_delete(LEASE_KEY);

    assert!(wait_until(WAIT, || store.upsert_count() == 4).await);
    assert!(wait_until(WAIT, || handle.is_leader()).await);
    handle.stop().await;
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_stop_releases_lease() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(2)));

    let service = service(&coordination, &store, stable_probe(2), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || handle.is_leader()).await);
    assert!(coordination.get(LEASE_KEY).await.unwrap().is_some());

    handle.stop().await;

    assert!(coordination.get(LEASE_KEY).await.unwrap().is_none());
    assert_eq!(service.leader_lock().state(), LeaseState::Stopped);
    assert_eq!(service.stats().queue_depth, 0);
}

#[tokio::test]
async fn test_only_one_service_polls() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(3)));
    let first_probe = stable_probe(3);
    let second_probe = stable_probe(3);

    let first = service(&coordination, &store, first_probe.clone(), fast_settings());
    let second = service(&coordination, &store, second_probe.clone(), fast_settings());
    let first_handle = first.start();
    let second_handle = second.start();

    assert!(wait_until(WAIT, || first_handle.is_leader() || second_handle.is_leader()).await);
    sleep(Duration::from_millis(300)).await;

    assert!(
        first_handle.is_leader() ^ second_handle.is_leader(),
        "exactly one service leads"
    );
    let (leader, leader_probe, follower, follower_probe) = if first_handle.is_leader() {
        (first_handle, first_probe, second_handle, second_probe)
    } else {
        (second_handle, second_probe, first_handle, first_probe)
    };
    assert!(leader_probe.call_count() > 0);
    assert_eq!(follower_probe.call_count(), 0);

    // Failover after a clean shutdown of the leader
    leader.stop().await;
    assert!(wait_until(WAIT, || follower.is_leader()).await);
    assert!(wait_until(WAIT, || follower_probe.call_count() > 0).await);

    follower.stop().await;
    assert!(coordination.get(LEASE_KEY).await.unwrap().is_none());
}
