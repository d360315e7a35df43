//! Test doubles and common utilities for behaviour contract tests
//!
//! The doubles record what the core asked of them so tests can assert on
//! call counts and dispatched actions without a network or a UI.

#![allow(dead_code)]

use async_trait::async_trait;
use datasync_core::error::{Error, Result};
use datasync_core::source::DataSourceBuilder;
use datasync_core::traits::{
    Action, ChangeReceiver, FetchFunction, Item, Observable, Reducer, Store,
};
use datasync_core::{Clock, DataSource, LocalSession, MemoryStore, SourceConfig, TokioClock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Store wrapper recording every dispatched action as `source/kind`
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    actions: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Every action dispatched so far
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    /// Actions dispatched by one source, without the source prefix
    pub fn actions_of(&self, source: &str) -> Vec<String> {
        let prefix = format!("{}/", source);
        self.actions()
            .into_iter()
            .filter_map(|action| action.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn clear_actions(&self) {
        self.actions.lock().unwrap().clear();
    }
}

impl Observable for RecordingStore {
    fn changes(&self) -> ChangeReceiver {
        self.inner.changes()
    }
}

impl Store for RecordingStore {
    fn ready(&self) -> bool {
        self.inner.ready()
    }

    fn get_item(&self, key: &str) -> Option<Item> {
        self.inner.get_item(key)
    }

    fn register_reducer(&self, key: &str, reducer: Reducer) {
        self.inner.register_reducer(key, reducer);
    }

    fn dispatch(&self, action: Action) {
        self.actions.lock().unwrap().push(action.to_string());
        self.inner.dispatch(action);
    }
}

/// Fetch function answering immediately with a configurable result
pub struct CountingFetch<T> {
    result: Mutex<Result<T>>,
    calls: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> CountingFetch<T> {
    pub fn ok(value: T) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Ok(value)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Err(Error::fetch("test", message))),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_result(&self, result: Result<T>) {
        *self.result.lock().unwrap() = result;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> FetchFunction<T> for CountingFetch<T> {
    async fn fetch(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone()
    }
}

/// Fetch function whose calls stay pending until the test resolves them
pub struct ControlledFetch<T> {
    pending: Mutex<VecDeque<oneshot::Sender<Result<T>>>>,
    calls: AtomicUsize,
}

impl<T: Send + Sync + 'static> ControlledFetch<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Wait until at least `count` fetches are pending
    pub async fn wait_for_pending(&self, count: usize) {
        while self.pending_count() < count {
            tokio::task::yield_now().await;
        }
    }

    /// Resolve the oldest pending fetch
    pub fn resolve(&self, result: Result<T>) {
        let sender = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .expect("a fetch is pending");
        let _ = sender.send(result);
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> FetchFunction<T> for ControlledFetch<T> {
    async fn fetch(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push_back(tx);
        rx.await
            .unwrap_or_else(|_| Err(Error::fetch("test", "fetch abandoned")))
    }
}

/// Clock reading `origin_ms` when the (paused) test starts
pub fn clock_at(origin_ms: i64) -> Arc<dyn Clock> {
    Arc::new(TokioClock::starting_at(origin_ms))
}

/// Builder with the session, store and clock already wired
pub fn builder<T, F>(
    config: SourceConfig,
    fetch: Arc<F>,
    session: &Arc<LocalSession>,
    store: &Arc<RecordingStore>,
    clock: &Arc<dyn Clock>,
) -> DataSourceBuilder<T>
where
    T: Send + Sync + 'static,
    F: FetchFunction<T> + 'static,
{
    DataSource::builder(config)
        .fetch_arc(fetch)
        .session(session.clone())
        .store(store.clone())
        .clock(clock.clone())
}

/// Let spawned tasks run without advancing paused time
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
