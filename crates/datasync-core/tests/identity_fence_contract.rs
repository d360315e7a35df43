//! Behaviour Contract Test: Identity Fencing
//!
//! Constraints verified:
//! - A fetch that completes after the owner changed writes nothing and
//!   dispatches nothing, whether it succeeded or failed
//! - A fetch that straddles a reset is dropped the same way
//! - Discards are not errors: callers see `FetchOutcome::Discarded`
//!
//! If this test fails, one account's data can leak into another's store.

mod common;

use common::*;
use datasync_core::source::{FetchStatus, ModuleStatus};
use datasync_core::{Error, LocalSession, SourceConfig};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn owner_switch_discards_successful_fetch() {
    let session = Arc::new(LocalSession::new());
    session.login("owner-1");
    let store = RecordingStore::new();
    let clock = clock_at(0);
    let fetch = ControlledFetch::<Vec<String>>::new();
    let source = builder(SourceConfig::new("activeCalls"), fetch.clone(), &session, &store, &clock)
        .build()
        .unwrap();

    let pending = source.fetch_data();
    fetch.wait_for_pending(1).await;
    let status_before = source.status();

    session.login("owner-2");
    fetch.resolve(Ok(vec!["owner-1-call".to_string()]));

    let outcome = pending.await.expect("discards are not errors");
    assert!(outcome.is_discarded());
    assert!(source.data().is_none(), "store must not be written");
    assert!(source.timestamp().is_none());
    assert_eq!(store.actions_of("activeCalls"), vec!["fetch"]);
    assert_eq!(source.status(), status_before);
    assert!(source.scheduler().scheduled_timer().is_none());
    assert!(!source.scheduler().is_fetching());
}

#[tokio::test(start_paused = true)]
async fn owner_switch_swallows_failed_fetch() {
    let session = Arc::new(LocalSession::new());
    session.login("owner-1");
    let store = RecordingStore::new();
    let clock = clock_at(0);
    let fetch = ControlledFetch::<u32>::new();
    let source = builder(SourceConfig::new("activeCalls"), fetch.clone(), &session, &store, &clock)
        .build()
        .unwrap();

    let pending = source.fetch_data();
    fetch.wait_for_pending(1).await;
    session.logout();
    fetch.resolve(Err(Error::fetch("activeCalls", "401 Unauthorized")));

    assert!(pending.await.unwrap().is_discarded());
    assert!(source.state().error.is_none());
    assert_eq!(store.actions_of("activeCalls"), vec!["fetch"]);
    assert!(
        source.scheduler().scheduled_timer().is_none(),
        "a discarded failure must not schedule a retry"
    );
}

#[tokio::test(start_paused = true)]
async fn reset_during_fetch_discards_result() {
    let session = Arc::new(LocalSession::new());
    session.restore("owner-1");
    let store = RecordingStore::new();
    let clock = clock_at(0);
    let fetch = ControlledFetch::<u32>::new();
    let source = Arc::new(
        builder(SourceConfig::new("presence"), fetch.clone(), &session, &store, &clock)
            .build()
            .unwrap(),
    );

    // Initialization awaits the first fetch; run it on its own task.
    let init = {
        let source = source.clone();
        tokio::spawn(async move { source.on_state_change().await })
    };
    fetch.wait_for_pending(1).await;
    fetch.resolve(Ok(1));
    init.await.unwrap();
    assert_eq!(source.status(), ModuleStatus::Ready);

    // Refetch, then lose the store before it lands.
    tokio::time::sleep(ms(1_800_001)).await;
    let refetch = source.fetch_data();
    fetch.wait_for_pending(1).await;
    store.memory().set_ready(false);
    source.on_state_change().await;
    assert_eq!(source.status(), ModuleStatus::Pending);

    // The same owner is still logged in; only the epoch moved.
    fetch.resolve(Ok(2));
    assert!(refetch.await.unwrap().is_discarded());
    assert_eq!(source.data().as_deref(), Some(&1));
    assert_eq!(source.state().fetch_status, FetchStatus::Idle);
    assert_eq!(
        store.actions_of("presence"),
        vec![
            "init",
            "fetch",
            "fetchSuccess",
            "initSuccess",
            "fetch",
            "reset",
            "resetSuccess"
        ]
    );
}
