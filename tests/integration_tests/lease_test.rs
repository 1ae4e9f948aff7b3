//! Leader lease tests across competing processes
//!
//! Every `LeaderLock` below plays one process; they share a coordination
//! store the way replicas share Redis.

use mcpulse::lease::{CoordinationStore, LeaderLock, LeaseState, MemoryCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::common::LEASE_KEY;

fn lock(store: &Arc<MemoryCoordinator>, ttl: Duration) -> Arc<LeaderLock> {
    Arc::new(LeaderLock::new(store.clone(), LEASE_KEY, ttl))
}

// ============================================================================
// Mutual Exclusion Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_acquire_single_winner() {
    let store = Arc::new(MemoryCoordinator::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let contender = lock(&store, Duration::from_secs(30));
            tokio::spawn(async move { (contender.acquire().await, contender) })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let (acquired, contender) = handle.await.unwrap();
        if acquired {
            winners.push(contender);
        } else {
            assert_eq!(contender.state(), LeaseState::Follower);
        }
    }

    assert_eq!(winners.len(), 1, "exactly one process must become leader");
    let holder = store.get(LEASE_KEY).await.unwrap();
    assert_eq!(holder.as_deref(), Some(winners[0].token()));
}

#[tokio::test]
async fn test_follower_cannot_acquire_while_leader_renews() {
    let store = Arc::new(MemoryCoordinator::new());
    let leader = lock(&store, Duration::from_millis(150));
    let follower = lock(&store, Duration::from_millis(150));

    assert!(leader.acquire().await);

    // Renewing keeps the key alive well past its original TTL
    for _ in 0..6 {
        sleep(Duration::from_millis(50)).await;
        assert!(leader.renew().await);
        assert!(!follower.acquire().await);
    }

    assert!(leader.is_leader());
    assert!(!follower.is_leader());
}

#[tokio::test]
async fn test_expired_lease_fails_over() {
    let store = Arc::new(MemoryCoordinator::new());
    let crashed = lock(&store, Duration::from_millis(80));
    let standby = lock(&store, Duration::from_millis(80));

    assert!(crashed.acquire().await);
    assert!(!standby.acquire().await);

    // The first process stops renewing, as if it had died
    sleep(Duration::from_millis(150)).await;

    assert!(standby.acquire().await);
    assert!(
        !crashed.renew().await,
        "a revived process must not extend a lease that changed hands"
    );
    assert_eq!(crashed.state(), LeaseState::Follower);
    assert_eq!(
        store.get(LEASE_KEY).await.unwrap().as_deref(),
        Some(standby.token())
    );
}

// ============================================================================
// Ownership Tests
// ============================================================================

#[tokio::test]
async fn test_renew_and_release_respect_current_owner() {
    let store = Arc::new(MemoryCoordinator::new());
    let original = lock(&store, Duration::from_secs(30));
    assert!(original.acquire().await);

    // Someone else wrote the key after our lease lapsed
    store.force_set(LEASE_KEY, "intruder-token", Duration::from_secs(30));

    assert!(!original.renew().await);
    assert!(!original.release().await);

    assert_eq!(
        store.get(LEASE_KEY).await.unwrap().as_deref(),
        Some("intruder-token"),
        "the new owner's key must survive"
    );
    let ttl = store.remaining_ttl(LEASE_KEY).await.unwrap().unwrap();
    assert!(ttl > Duration::from_secs(20), "TTL must not be touched: {ttl:?}");
}

#[tokio::test]
async fn test_release_lets_next_process_in() {
    let store = Arc::new(MemoryCoordinator::new());
    let first = lock(&store, Duration::from_secs(30));
    let second = lock(&store, Duration::from_secs(30));

    assert!(first.acquire().await);
    assert!(!second.acquire().await);

    assert!(first.release().await);
    assert_eq!(first.state(), LeaseState::Follower);

    assert!(second.acquire().await);
}

#[tokio::test]
async fn test_stopped_lock_never_reacquires() {
    let store = Arc::new(MemoryCoordinator::new());
    let lock = lock(&store, Duration::from_secs(30));

    assert!(lock.acquire().await);
    assert!(lock.stop().await);
    assert_eq!(lock.state(), LeaseState::Stopped);
    assert!(store.get(LEASE_KEY).await.unwrap().is_none());

    assert!(!lock.acquire().await);
    assert_eq!(lock.state(), LeaseState::Stopped);
}

// ============================================================================
// Fail-Closed Tests
// ============================================================================

#[tokio::test]
async fn test_outage_means_not_leader() {
    let store = Arc::new(MemoryCoordinator::new());
    let lock = lock(&store, Duration::from_secs(30));

    store.set_failing(true);
    assert!(!lock.acquire().await);
    assert_eq!(lock.state(), LeaseState::Follower);

    store.set_failing(false);
    assert!(lock.acquire().await);

    store.set_failing(true);
    assert!(!lock.renew().await);
    assert_eq!(lock.state(), LeaseState::Follower);
}

#[tokio::test]
async fn test_renewal_loop_reports_takeover() {
    let store = Arc::new(MemoryCoordinator::new());
    let lock = lock(&store, Duration::from_secs(30));
    assert!(lock.acquire().await);

    let (_shutdown, shutdown_rx) = tokio::sync::watch::channel(false);
    let renewal = {
        let lock = Arc::clone(&lock);
        tokio::spawn(async move { lock.run_renewal(Duration::from_millis(10), shutdown_rx).await })
    };

    sleep(Duration::from_millis(35)).await;
    store.force_delete(LEASE_KEY);

    let outcome = tokio::time::timeout(Duration::from_secs(1), renewal)
        .await
        .expect("renewal loop should notice within one interval")
        .unwrap();
    assert_eq!(outcome, mcpulse::lease::RenewalOutcome::Lost);
    assert!(!lock.is_leader());
}
