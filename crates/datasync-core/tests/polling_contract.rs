//! Behaviour Contract Test: TTL Polling and Retry Timers
//!
//! Constraints verified:
//! - After a fetch at `t0`, polling refetches no earlier than `t0 + ttl`
//!   and no later than `t0 + ttl + 10ms`
//! - An inactive instance re-arms with the retry interval instead of
//!   fetching
//! - The retry timer refetches stale data and keeps checking while inactive
//! - At most one timer is pending at any time
//! - A timer armed before a reset never fetches or re-arms after it
//!
//! If this test fails, sources either hammer the backend or go stale.

mod common;

use common::*;
use datasync_core::source::{ModuleStatus, TimerKind, Transition};
use datasync_core::traits::ActionKind;
use datasync_core::{LocalSession, SourceConfig, TabFlag};
use serde_json::json;
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn fresh_login_fetches_then_polls_at_ttl() {
    let session = Arc::new(LocalSession::new());
    let store = RecordingStore::new();
    let clock = clock_at(0);
    let fetch = ControlledFetch::<serde_json::Value>::new();
    let config = SourceConfig::new("activeCalls")
        .with_ttl(ms(300_000))
        .with_polling(true);
    let source = Arc::new(
        builder(config, fetch.clone(), &session, &store, &clock)
            .build()
            .unwrap(),
    );

    assert_eq!(source.on_state_change().await, Transition::Idle);
    assert_eq!(source.status(), ModuleStatus::Pending);

    session.login("owner-1");
    let init = {
        let source = source.clone();
        tokio::spawn(async move { source.on_state_change().await })
    };
    fetch.wait_for_pending(1).await;
    assert_eq!(fetch.call_count(), 1, "fresh login fetches immediately");

    tokio::time::sleep(ms(1_000)).await;
    fetch.resolve(Ok(json!({ "calls": [{ "sessionId": "s1" }] })));
    assert_eq!(init.await.unwrap(), Transition::Initialized);

    assert_eq!(source.timestamp(), Some(1_000));
    assert_eq!(
        store.actions_of("activeCalls"),
        vec!["init", "fetch", "fetchSuccess", "initSuccess"]
    );
    let timer = source.scheduler().scheduled_timer().expect("poll timer armed");
    assert_eq!(timer.kind, TimerKind::Poll);
    assert_eq!(timer.fires_at, 301_010);

    // Not a millisecond early...
    tokio::time::sleep(ms(300_009)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 1);

    // ...and within the epsilon after expiry.
    tokio::time::sleep(ms(1)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 2);
    assert!(source.scheduler().scheduled_timer().is_none());
}

#[tokio::test(start_paused = true)]
async fn restored_login_with_fresh_data_only_schedules() {
    let session = Arc::new(LocalSession::new());
    session.restore("owner-1");
    let store = RecordingStore::new();
    let clock = clock_at(10_000);
    store
        .memory()
        .hydrate("presenceTimestamp", Arc::new(9_000_i64));
    store.memory().hydrate("presenceData", Arc::new(5_u32));
    let fetch = CountingFetch::ok(6_u32);
    let config = SourceConfig::new("presence")
        .with_ttl(ms(60_000))
        .with_polling(true);
    let source = builder(config, fetch.clone(), &session, &store, &clock)
        .build()
        .unwrap();

    assert_eq!(source.on_state_change().await, Transition::Initialized);
    assert_eq!(fetch.call_count(), 0);
    assert_eq!(source.data().as_deref(), Some(&5));

    let timer = source.scheduler().scheduled_timer().unwrap();
    assert_eq!(timer.kind, TimerKind::Poll);
    assert_eq!(timer.delay, ms(9_000 + 60_000 + 10 - 10_000));
}

#[tokio::test(start_paused = true)]
async fn inactive_tab_rearms_with_retry_interval() {
    let session = Arc::new(LocalSession::new());
    session.login("owner-1");
    let store = RecordingStore::new();
    let clock = clock_at(0);
    let tab = Arc::new(TabFlag::new(true));
    let fetch = CountingFetch::ok(1_u32);
    let config = SourceConfig::new("presence")
        .with_ttl(ms(60_000))
        .with_time_to_retry(ms(5_000))
        .with_polling(true);
    let source = builder(config, fetch.clone(), &session, &store, &clock)
        .tab(tab.clone())
        .build()
        .unwrap();

    source.on_state_change().await;
    assert_eq!(fetch.call_count(), 1);

    // Fresh data, inactive tab: the check re-arms instead of fetching.
    tab.set_active(false);
    source.scheduler().start_polling(Some(ms(1_000)));
    tokio::time::sleep(ms(1_001)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 1);
    let timer = source.scheduler().scheduled_timer().unwrap();
    assert_eq!(timer.kind, TimerKind::Poll);
    assert_eq!(timer.delay, ms(5_000));

    // Expired data, still inactive: keep checking, never fetch.
    tokio::time::sleep(ms(65_000)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 1);
    assert_eq!(source.scheduler().scheduled_timer().unwrap().delay, ms(5_000));

    // Becoming active lets the next check fetch.
    tab.set_active(true);
    tokio::time::sleep(ms(5_001)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_timer_fetches_only_stale_data() {
    let session = Arc::new(LocalSession::new());
    session.login("owner-1");
    let store = RecordingStore::new();
    let clock = clock_at(0);
    let tab = Arc::new(TabFlag::new(false));
    let fetch = CountingFetch::ok(1_u32);
    let config = SourceConfig::new("presence").with_time_to_retry(ms(2_000));
    let source = builder(config, fetch.clone(), &session, &store, &clock)
        .tab(tab.clone())
        .build()
        .unwrap();

    // Inactive at init: no fetch, retry armed.
    source.on_state_change().await;
    assert_eq!(fetch.call_count(), 0);
    assert_eq!(
        source.scheduler().scheduled_timer().map(|t| t.kind),
        Some(TimerKind::Retry)
    );

    // Still inactive when it fires: retry again.
    tokio::time::sleep(ms(2_001)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 0);
    assert!(source.scheduler().scheduled_timer().is_some());

    tab.set_active(true);
    tokio::time::sleep(ms(2_001)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 1);

    // Fresh data: a retry that fires does nothing and is not re-armed.
    source.scheduler().retry(Some(ms(100)));
    tokio::time::sleep(ms(101)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 1);
    assert!(source.scheduler().scheduled_timer().is_none());
}

#[tokio::test(start_paused = true)]
async fn arming_replaces_the_pending_timer() {
    let session = Arc::new(LocalSession::new());
    session.login("owner-1");
    let store = RecordingStore::new();
    let clock = clock_at(0);
    let fetch = CountingFetch::ok(1_u32);
    let source = builder(SourceConfig::new("presence"), fetch.clone(), &session, &store, &clock)
        .build()
        .unwrap();

    source.scheduler().retry(Some(ms(100)));
    source.scheduler().start_polling(Some(ms(300)));
    let timer = source.scheduler().scheduled_timer().unwrap();
    assert_eq!(timer.kind, TimerKind::Poll);

    // The cancelled retry never fires.
    tokio::time::sleep(ms(150)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 0);

    tokio::time::sleep(ms(200)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn timers_armed_before_a_reset_stay_silent() {
    let session = Arc::new(LocalSession::new());
    session.login("owner-1");
    let store = RecordingStore::new();
    let clock = clock_at(0);
    let fetch = CountingFetch::ok(1_u32);
    let config = SourceConfig::new("presence")
        .with_ttl(ms(60_000))
        .with_polling(true);
    let source = builder(config, fetch.clone(), &session, &store, &clock)
        .build()
        .unwrap();

    source.on_state_change().await;
    assert_eq!(fetch.call_count(), 1);
    assert!(source.scheduler().scheduled_timer().is_some());

    // A reset that races the timer callback leaves the timer running.
    source.module().dispatch(ActionKind::Reset);
    source.module().dispatch(ActionKind::ResetSuccess);
    store.clear_actions();

    tokio::time::sleep(ms(60_011)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 1);
    assert!(store.actions_of("presence").is_empty());
    assert!(source.scheduler().scheduled_timer().is_none());
    assert!(!source.scheduler().is_fetching());

    // The same holds for the retry timer.
    source.scheduler().retry(Some(ms(100)));
    source.module().dispatch(ActionKind::Reset);
    tokio::time::sleep(ms(101)).await;
    settle().await;
    assert_eq!(fetch.call_count(), 1);
    assert!(source.scheduler().scheduled_timer().is_none());
}
