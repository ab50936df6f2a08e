//! Refresh scheduler integration tests
//!
//! Freshness window, last-good preservation and event emission.

mod helpers;

use chrono::Duration;
use ctw_common::events::{DashboardEvent, EventBus};
use ctw_dashboard::scheduler::RefreshScheduler;
use helpers::{open_conversation, pipeline, scenario_gateway, secs_before, t0};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const WINDOW_SECS: u64 = 600;

fn scheduler(gateway: Arc<helpers::FakeGateway>, event_bus: EventBus) -> RefreshScheduler {
    RefreshScheduler::new(pipeline(gateway), WINDOW_SECS, event_bus)
}

#[tokio::test]
async fn test_first_call_fetches() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    let scheduler = scheduler(gateway.clone(), EventBus::new(16));

    let outcome = scheduler.current_at(now).await;

    assert!(outcome.refreshed);
    assert!(outcome.error.is_none());
    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.rows.len(), 2);
    assert_eq!(snapshot.generated_at, now);
    assert_eq!(snapshot.expires_at, now + Duration::seconds(600));
    assert_eq!(gateway.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fresh_call_returns_same_snapshot_without_fetching() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    let scheduler = scheduler(gateway.clone(), EventBus::new(16));

    let first = scheduler.current_at(now).await.snapshot.unwrap();
    let calls_after_first = gateway.total_calls();

    let later = now + Duration::seconds(599);
    let second = scheduler.current_at(later).await;

    assert!(!second.refreshed);
    assert!(Arc::ptr_eq(&first, &second.snapshot.unwrap()));
    assert_eq!(gateway.total_calls(), calls_after_first);
}

#[tokio::test]
async fn test_expired_snapshot_refreshes() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    let scheduler = scheduler(gateway.clone(), EventBus::new(16));

    let first = scheduler.current_at(now).await.snapshot.unwrap();

    let expiry = now + Duration::seconds(600);
    gateway.set_conversations(vec![open_conversation(
        "new",
        secs_before(expiry, 60),
        "10",
        None,
    )]);
    let second = scheduler.current_at(expiry).await;

    assert!(second.refreshed);
    let second = second.snapshot.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.rows.len(), 1);
    assert_eq!(gateway.search_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failure_after_expiry_keeps_previous_snapshot() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    let scheduler = scheduler(gateway.clone(), EventBus::new(16));

    let first = scheduler.current_at(now).await.snapshot.unwrap();

    gateway.set_fail_search(true);
    let later = now + Duration::seconds(601);
    let outcome = scheduler.current_at(later).await;

    assert!(!outcome.refreshed);
    let error = outcome.error.unwrap();
    assert!(error.message.contains("connection refused"));
    assert_eq!(error.at, later);
    assert!(Arc::ptr_eq(&first, &outcome.snapshot.unwrap()));

    // the failure stays visible next to the last good snapshot
    let peeked = scheduler.peek().await;
    assert_eq!(peeked.error, Some(error));
    assert!(Arc::ptr_eq(&first, &peeked.snapshot.unwrap()));
}

#[tokio::test]
async fn test_failure_does_not_extend_window() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    let scheduler = scheduler(gateway.clone(), EventBus::new(16));

    scheduler.current_at(now).await;
    gateway.set_fail_search(true);

    let later = now + Duration::seconds(700);
    scheduler.current_at(later).await;
    scheduler.current_at(later + Duration::seconds(1)).await;
    // every stale invocation retries
    assert_eq!(gateway.search_calls.load(Ordering::SeqCst), 3);

    gateway.set_fail_search(false);
    let recovered = scheduler.current_at(later + Duration::seconds(2)).await;
    assert!(recovered.refreshed);
    assert!(recovered.error.is_none());
    assert!(scheduler.peek().await.error.is_none());
}

#[tokio::test]
async fn test_failure_without_previous_snapshot() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    gateway.set_fail_admins(true);
    let scheduler = scheduler(gateway, EventBus::new(16));

    let outcome = scheduler.current_at(now).await;
    assert!(outcome.snapshot.is_none());
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn test_events_emitted_for_success_and_failure() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    let event_bus = EventBus::new(16);
    let mut rx = event_bus.subscribe();
    let scheduler = scheduler(gateway.clone(), event_bus);

    scheduler.current_at(now).await;
    match rx.recv().await.unwrap() {
        DashboardEvent::SnapshotUpdated { rows, generated_at, .. } => {
            assert_eq!(rows, 2);
            assert_eq!(generated_at, now);
        }
        other => panic!("Expected SnapshotUpdated, got {:?}", other),
    }

    gateway.set_fail_search(true);
    scheduler.current_at(now + Duration::seconds(601)).await;
    assert!(matches!(
        rx.recv().await.unwrap(),
        DashboardEvent::RefreshFailed { .. }
    ));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    let scheduler = Arc::new(scheduler(gateway.clone(), EventBus::new(16)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.current_at(now).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().snapshot.is_some());
    }
    assert_eq!(gateway.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_failed_refresh() {
    let now = t0();
    let gateway = Arc::new(scenario_gateway(now));
    gateway.set_fail_search(true);
    gateway.set_search_delay(std::time::Duration::from_millis(50));
    let scheduler = Arc::new(scheduler(gateway.clone(), EventBus::new(16)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.current_at(now).await })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.snapshot.is_none());
        let error = outcome.error.unwrap();
        assert!(error.message.contains("connection refused"));
    }
    assert_eq!(gateway.search_calls.load(Ordering::SeqCst), 1);

    // a later call is a new attempt
    scheduler.current_at(now + Duration::seconds(1)).await;
    assert_eq!(gateway.search_calls.load(Ordering::SeqCst), 2);
}
