//! Error handling and recovery scenarios
//!
//! Tests that the poller keeps running through:
//! - Store write failures
//! - Registry outages and misconfigured rows
//! - Panicking and hanging probes
//! - Coordination store outages

use mcpulse::lease::{LeaseState, MemoryCoordinator};
use mcpulse::models::ServerId;
use mcpulse::store::{MemoryStore, StatusStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::fixtures::{java_address, java_servers, mixed_fleet};
use crate::common::{fast_settings, service, snapshot, wait_until, Behavior, ScriptedProbe};

const WAIT: Duration = Duration::from_secs(3);

// ============================================================================
// Store Failure Tests
// ============================================================================

#[tokio::test]
async fn test_failed_write_is_retried_next_cycle() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(2)));
    let probe = Arc::new(ScriptedProbe::new());
    probe.set(&java_address(1), Behavior::Online(snapshot(1)));
    probe.set(&java_address(2), Behavior::Online(snapshot(2)));

    store.fail_writes_for(ServerId(1), true);

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(
        wait_until(WAIT, || handle.stats().store_failures >= 2 && store.status_count() == 1).await
    );
    assert!(store.get_latest(ServerId(1)).await.unwrap().is_none());
    assert!(
        service.cache().get(ServerId(1)).is_none(),
        "a failed write must not be remembered as written"
    );

    // Unchanged snapshot, but the earlier write never landed
    store.fail_writes_for(ServerId(1), false);
    assert!(wait_until(WAIT, || store.status_count() == 2).await);
    handle.stop().await;

    let stored = store.get_latest(ServerId(1)).await.unwrap().unwrap();
    assert_eq!(stored.snapshot, snapshot(1));
}

#[tokio::test]
async fn test_store_outage_keeps_service_alive() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(3)));
    let probe = Arc::new(ScriptedProbe::new());
    for id in 1..=3 {
        probe.set(&java_address(id), Behavior::Online(snapshot(id)));
    }

    store.fail_writes(true);

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || handle.stats().store_failures >= 6).await);
    assert!(handle.is_running());
    assert!(handle.is_leader());
    assert_eq!(store.status_count(), 0);

    store.fail_writes(false);
    assert!(wait_until(WAIT, || store.status_count() == 3).await);
    handle.stop().await;
}

// ============================================================================
// Registry Failure Tests
// ============================================================================

#[tokio::test]
async fn test_registry_outage_skips_cycles() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(2)));
    let probe = Arc::new(ScriptedProbe::new());
    probe.set(&java_address(1), Behavior::Online(snapshot(1)));
    probe.set(&java_address(2), Behavior::Online(snapshot(2)));

    store.fail_listing(true);

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || handle.is_leader()).await);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(probe.call_count(), 0);
    assert_eq!(handle.stats().cycles, 0);
    assert!(handle.is_running());

    store.fail_listing(false);
    assert!(wait_until(WAIT, || store.status_count() == 2).await);
    handle.stop().await;
}

#[tokio::test]
async fn test_misconfigured_servers_are_skipped() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(mixed_fleet()));
    let probe = Arc::new(ScriptedProbe::new());
    probe.set("java.example.net", Behavior::Online(snapshot(1)));
    probe.set("bedrock.example.net", Behavior::Online(snapshot(2)));

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || store.status_count() == 2).await);
    handle.stop().await;

    let stats = service.stats();
    assert!(stats.skipped_servers >= 3);
    for id in [3, 4, 5] {
        assert!(store.get_latest(ServerId(id)).await.unwrap().is_none());
    }

    let calls = probe.calls();
    assert!(calls
        .iter()
        .all(|address| address == "java.example.net" || address == "bedrock.example.net"));
}

// ============================================================================
// Probe Failure Tests
// ============================================================================

#[tokio::test]
async fn test_panicking_probe_does_not_kill_workers() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(2)));
    let probe = Arc::new(ScriptedProbe::new());
    probe.set(&java_address(1), Behavior::Panic);
    probe.set(&java_address(2), Behavior::Online(snapshot(2)));

    let mut settings = fast_settings();
    settings.worker_count = 1;

    let service = service(&coordination, &store, probe.clone(), settings);
    let handle = service.start();

    // A single worker has to survive every panic to keep probing
    assert!(wait_until(WAIT, || probe.calls_to(&java_address(1)) >= 3).await);
    assert!(handle.is_running());
    assert!(handle.is_leader());
    handle.stop().await;

    assert!(store.get_latest(ServerId(1)).await.unwrap().is_none());
    assert!(store.get_latest(ServerId(2)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_hanging_probe_times_out() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(3)));
    let probe = Arc::new(ScriptedProbe::new());
    probe.set(
        &java_address(1),
        Behavior::Slow(Duration::from_secs(60), snapshot(1)),
    );
    probe.set(&java_address(2), Behavior::Online(snapshot(2)));
    probe.set(
        &java_address(3),
        Behavior::Slow(Duration::from_millis(20), snapshot(3)),
    );

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(
        wait_until(WAIT, || store.status_count() == 2 && handle.stats().probe_failures >= 1).await
    );
    handle.stop().await;

    assert!(store.get_latest(ServerId(1)).await.unwrap().is_none());
    assert!(store.get_latest(ServerId(3)).await.unwrap().is_some());
}

// ============================================================================
// Coordination Failure Tests
// ============================================================================

#[tokio::test]
async fn test_coordination_outage_stands_down() {
    let coordination = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(MemoryStore::with_servers(java_servers(2)));
    let probe = Arc::new(ScriptedProbe::new());
    probe.set(&java_address(1), Behavior::Online(snapshot(1)));
    probe.set(&java_address(2), Behavior::Online(snapshot(2)));

    let service = service(&coordination, &store, probe.clone(), fast_settings());
    let handle = service.start();

    assert!(wait_until(WAIT, || handle.stats().cycles >= 1).await);

    coordination.set_failing(true);
    assert!(wait_until(Duration::from_millis(500), || !handle.is_leader()).await);
    sleep(Duration::from_millis(100)).await;

    let cycles = handle.stats().cycles;
    sleep(Duration::from_millis(250)).await;
    assert_eq!(handle.stats().cycles, cycles, "followers never schedule");
    assert_eq!(handle.state(), LeaseState::Follower);

    // The stale key expires and the service takes over again
    coordination.set_failing(false);
    assert!(wait_until(WAIT, || handle.is_leader()).await);
    assert!(wait_until(WAIT, || handle.stats().cycles > cycles).await);

    handle.stop().await;
}
