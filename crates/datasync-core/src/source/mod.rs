//! Synchronized data sources
//!
//! A [`DataSource`] keeps one remote resource cached in the store under a
//! TTL policy. It is assembled from three parts sharing one
//! [`ModuleState`]:
//!
//! - [`FetchScheduler`]: single in-flight fetch, poll and retry timers,
//!   owner fence
//! - [`LifecycleCoordinator`]: readiness gating and push delivery
//! - an optional [`SubscriptionHandler`] such as [`SubscriptionBridge`]
//!
//! ## Example
//!
//! ```rust,ignore
//! let source = DataSource::builder(SourceConfig::new("presence").with_polling(true))
//!     .fetch(fetch_fn(|| async { client.presence().await }))
//!     .session(session.clone())
//!     .store(store.clone())
//!     .build()?;
//!
//! let task = source.spawn();
//! // ...
//! task.shutdown().await?;
//! ```

pub mod bridge;
pub mod lifecycle;
pub mod scheduler;
pub mod status;
pub mod timer;

pub use bridge::{DEFAULT_DEBOUNCE, SubscriptionBridge, SubscriptionHandler};
pub use lifecycle::{ChangeSet, LifecycleCoordinator, Transition};
pub use scheduler::{FetchFuture, FetchOutcome, FetchScheduler};
pub use status::{FetchStatus, ModuleState, ModuleStatus, SourceState};
pub use timer::{ScheduledTimer, TimerKind};

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::traits::{FetchFunction, PushSubscription, Reducer, Session, Store, TabActivity};
use lifecycle::CoordinatorParts;
use scheduler::SchedulerParts;

/// A synchronized data source
pub struct DataSource<T> {
    module: Arc<ModuleState>,
    scheduler: FetchScheduler<T>,
    coordinator: Arc<LifecycleCoordinator<T>>,
}

impl<T: Send + Sync + 'static> DataSource<T> {
    /// Start building a source
    pub fn builder(config: SourceConfig) -> DataSourceBuilder<T> {
        DataSourceBuilder::new(config)
    }

    /// Source name
    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// Source configuration
    pub fn config(&self) -> &SourceConfig {
        self.scheduler.config()
    }

    /// Lifecycle status
    pub fn status(&self) -> ModuleStatus {
        self.module.status()
    }

    /// Reduced status, fetch status and last error
    pub fn state(&self) -> SourceState {
        self.module.snapshot()
    }

    /// Whether the source is ready
    pub fn ready(&self) -> bool {
        self.module.ready()
    }

    /// Cached data
    ///
    /// The same `Arc` is returned until the next successful fetch.
    pub fn data(&self) -> Option<Arc<T>> {
        self.scheduler.data()
    }

    /// Timestamp of the cached data
    pub fn timestamp(&self) -> Option<i64> {
        self.scheduler.timestamp()
    }

    /// Whether the cached data is missing or expired
    pub fn is_stale(&self) -> bool {
        self.scheduler.is_stale()
    }

    /// Fetch now, or join the fetch already in flight
    pub fn fetch_data(&self) -> FetchFuture<T> {
        self.scheduler.fetch_data()
    }

    /// The source's scheduler
    pub fn scheduler(&self) -> &FetchScheduler<T> {
        &self.scheduler
    }

    /// The source's lifecycle coordinator
    pub fn coordinator(&self) -> &Arc<LifecycleCoordinator<T>> {
        &self.coordinator
    }

    /// Shared status handle
    pub fn module(&self) -> &Arc<ModuleState> {
        &self.module
    }

    /// Evaluate the lifecycle once
    pub async fn on_state_change(&self) -> Transition {
        self.coordinator.on_state_change().await
    }

    /// Run the coordinator on its own task
    pub fn spawn(&self) -> SourceTask {
        let (tx, rx) = oneshot::channel();
        let coordinator = Arc::clone(&self.coordinator);
        let handle = tokio::spawn(async move { coordinator.run_with_shutdown(Some(rx)).await });
        SourceTask {
            name: self.name().to_string(),
            shutdown: Some(tx),
            handle,
        }
    }

    /// Cancel timers, drop the in-flight fetch and unsubscribe push filters
    pub fn dispose(&self) {
        self.coordinator.dispose();
    }
}

impl<T> std::fmt::Debug for DataSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Handle to a running coordinator task
pub struct SourceTask {
    name: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl SourceTask {
    /// Whether the task has stopped
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal shutdown and wait for the coordinator to dispose the source
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle
            .await
            .map_err(|e| Error::Other(format!("{}: coordinator task failed: {}", self.name, e)))?
    }
}

/// Builder for [`DataSource`]
pub struct DataSourceBuilder<T> {
    config: SourceConfig,
    fetch: Option<Arc<dyn FetchFunction<T>>>,
    session: Option<Arc<dyn Session>>,
    store: Option<Arc<dyn Store>>,
    push: Option<Arc<dyn PushSubscription>>,
    tab: Option<Arc<dyn TabActivity>>,
    handler: Option<Arc<dyn SubscriptionHandler<T>>>,
    clock: Option<Arc<dyn Clock>>,
    data_reducer: Option<Reducer>,
    timestamp_reducer: Option<Reducer>,
}

impl<T: Send + Sync + 'static> DataSourceBuilder<T> {
    fn new(config: SourceConfig) -> Self {
        Self {
            config,
            fetch: None,
            session: None,
            store: None,
            push: None,
            tab: None,
            handler: None,
            clock: None,
            data_reducer: None,
            timestamp_reducer: None,
        }
    }

    /// Set the fetch function (required)
    pub fn fetch(mut self, fetch: impl FetchFunction<T> + 'static) -> Self {
        self.fetch = Some(Arc::new(fetch));
        self
    }

    /// Set a shared fetch function (required)
    pub fn fetch_arc(mut self, fetch: Arc<dyn FetchFunction<T>>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    /// Set the session (required)
    pub fn session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the store (required)
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Gate on a push subscription and subscribe the configured filters
    pub fn push(mut self, push: Arc<dyn PushSubscription>) -> Self {
        self.push = Some(push);
        self
    }

    /// Only fetch while this tab signal is active
    pub fn tab(mut self, tab: Arc<dyn TabActivity>) -> Self {
        self.tab = Some(tab);
        self
    }

    /// Handle push messages once ready
    pub fn handler(mut self, handler: impl SubscriptionHandler<T> + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Override the clock (defaults to [`SystemClock`])
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the default data reducer
    pub fn data_reducer(mut self, reducer: Reducer) -> Self {
        self.data_reducer = Some(reducer);
        self
    }

    /// Replace the default timestamp reducer
    pub fn timestamp_reducer(mut self, reducer: Reducer) -> Self {
        self.timestamp_reducer = Some(reducer);
        self
    }

    /// Validate the configuration, register reducers, and assemble the source
    pub fn build(self) -> Result<DataSource<T>> {
        self.config.validate()?;
        let fetch = self
            .fetch
            .ok_or_else(|| Error::config(format!("{}: fetch function must be provided", self.config.name)))?;
        let session = self
            .session
            .ok_or_else(|| Error::config(format!("{}: session must be provided", self.config.name)))?;
        let store = self
            .store
            .ok_or_else(|| Error::config(format!("{}: store must be provided", self.config.name)))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let name: Arc<str> = Arc::from(self.config.name.as_str());
        store.register_reducer(
            &self.config.data_key(),
            self.data_reducer
                .unwrap_or_else(|| status::data_reducer(name.clone())),
        );
        store.register_reducer(
            &self.config.timestamp_key(),
            self.timestamp_reducer
                .unwrap_or_else(|| status::timestamp_reducer(name.clone())),
        );

        let module = Arc::new(ModuleState::new(name, store.clone()));
        let scheduler = FetchScheduler::new(SchedulerParts {
            config: self.config,
            fetch,
            session: session.clone(),
            store: store.clone(),
            tab: self.tab.clone(),
            clock,
            module: module.clone(),
        });
        let coordinator = Arc::new(LifecycleCoordinator::new(CoordinatorParts {
            module: module.clone(),
            scheduler: scheduler.clone(),
            session,
            store,
            push: self.push,
            tab: self.tab,
            handler: self.handler,
        }));

        debug!("{}: source assembled", module.name());
        Ok(DataSource {
            module,
            scheduler,
            coordinator,
        })
    }
}
