//! Per-source fetch scheduler
//!
//! The scheduler owns everything time-related for one source:
//!
//! - at most one in-flight fetch, shared by every concurrent caller
//! - at most one pending timer (poll or retry)
//! - the owner fence that decides whether a completed fetch may be written
//!
//! ## Fetch Flow
//!
//! ```text
//! fetch_data() ──► in flight? ──yes──► same shared future
//!                      │
//!                      no
//!                      ▼
//!        dispatch fetch, capture fence, spawn task
//!                      │
//!                      ▼
//!              fetch function resolves
//!                      │
//!         fence still current? ──no──► discard (no write, no dispatch)
//!                      │
//!                     yes
//!            ┌─────────┴─────────┐
//!            ▼                   ▼
//!      fetchSuccess         fetchError
//!      (+ poll timer)       (+ poll-with-retry-interval or retry timer)
//! ```
//!
//! Fetches are never aborted. The fetch runs on its own task so that it
//! completes even when every caller has dropped its handle; a stale result
//! is dropped after the fact by the fence check.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::status::ModuleState;
use super::timer::{ScheduledTimer, TimerKind, TimerSlot};
use crate::clock::Clock;
use crate::config::{POLL_EPSILON_MS, SourceConfig};
use crate::error::{Error, Result};
use crate::identity::Fence;
use crate::state::lock;
use crate::traits::{ActionKind, FetchFunction, Item, Session, Store, TabActivity, item_as};

/// How a fetch settled for its callers
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// Data was fetched and written to the store
    Fetched(Arc<T>),
    /// The owner changed or the source was reset while fetching; nothing
    /// was written
    Discarded,
}

impl<T> FetchOutcome<T> {
    /// The fetched data, if the fetch was written
    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            FetchOutcome::Fetched(data) => Some(data),
            FetchOutcome::Discarded => None,
        }
    }

    /// Whether the result was discarded
    pub fn is_discarded(&self) -> bool {
        matches!(self, FetchOutcome::Discarded)
    }
}

impl<T> Clone for FetchOutcome<T> {
    fn clone(&self) -> Self {
        match self {
            FetchOutcome::Fetched(data) => FetchOutcome::Fetched(Arc::clone(data)),
            FetchOutcome::Discarded => FetchOutcome::Discarded,
        }
    }
}

/// Handle to an in-flight fetch, cloneable by every caller
pub type FetchFuture<T> = Shared<BoxFuture<'static, Result<FetchOutcome<T>>>>;

struct InFlight<T> {
    id: u64,
    future: FetchFuture<T>,
}

/// Fetch scheduler for one source
pub struct FetchScheduler<T> {
    inner: Arc<SchedulerInner<T>>,
}

impl<T> Clone for FetchScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct SchedulerInner<T> {
    config: SourceConfig,
    data_key: String,
    timestamp_key: String,
    fetch: Arc<dyn FetchFunction<T>>,
    session: Arc<dyn Session>,
    store: Arc<dyn Store>,
    tab: Option<Arc<dyn TabActivity>>,
    clock: Arc<dyn Clock>,
    module: Arc<ModuleState>,
    in_flight: Mutex<Option<InFlight<T>>>,
    next_fetch_id: AtomicU64,
    timer: TimerSlot,
}

/// Collaborators of a scheduler
pub(crate) struct SchedulerParts<T> {
    pub config: SourceConfig,
    pub fetch: Arc<dyn FetchFunction<T>>,
    pub session: Arc<dyn Session>,
    pub store: Arc<dyn Store>,
    pub tab: Option<Arc<dyn TabActivity>>,
    pub clock: Arc<dyn Clock>,
    pub module: Arc<ModuleState>,
}

impl<T: Send + Sync + 'static> FetchScheduler<T> {
    pub(crate) fn new(parts: SchedulerParts<T>) -> Self {
        let data_key = parts.config.data_key();
        let timestamp_key = parts.config.timestamp_key();
        Self {
            inner: Arc::new(SchedulerInner {
                config: parts.config,
                data_key,
                timestamp_key,
                fetch: parts.fetch,
                session: parts.session,
                store: parts.store,
                tab: parts.tab,
                clock: parts.clock,
                module: parts.module,
                in_flight: Mutex::new(None),
                next_fetch_id: AtomicU64::new(1),
                timer: TimerSlot::new(),
            }),
        }
    }

    /// Start a fetch, or join the one already in flight
    ///
    /// The fetch function is invoked at most once per in-flight fetch no
    /// matter how many callers ask.
    pub fn fetch_data(&self) -> FetchFuture<T> {
        self.inner.fetch_data()
    }

    /// Arm the poll timer
    ///
    /// `None` uses the TTL-based delay: `timestamp + ttl + 10ms - now`.
    pub fn start_polling(&self, delay: Option<Duration>) {
        self.inner.start_polling(delay);
    }

    /// Arm the retry timer (`None` uses the configured retry interval)
    pub fn retry(&self, delay: Option<Duration>) {
        self.inner.retry(delay);
    }

    /// Cancel the pending timer
    pub fn cancel_timer(&self) {
        if self.inner.timer.cancel() {
            debug!("{}: pending timer cancelled", self.inner.config.name);
        }
    }

    /// Forget the in-flight fetch
    ///
    /// The fetch keeps running; its result is fenced out if the lifecycle
    /// moved on in the meantime.
    pub fn drop_in_flight(&self) {
        lock(&self.inner.in_flight).take();
    }

    /// Whether a fetch is in flight
    pub fn is_fetching(&self) -> bool {
        lock(&self.inner.in_flight).is_some()
    }

    /// The pending timer, if any
    pub fn scheduled_timer(&self) -> Option<ScheduledTimer> {
        self.inner.timer.scheduled()
    }

    /// Source name
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Source configuration
    pub fn config(&self) -> &SourceConfig {
        &self.inner.config
    }

    /// Cached data, if present
    pub fn data(&self) -> Option<Arc<T>> {
        self.inner.data()
    }

    /// Timestamp of the cached data, if present
    pub fn timestamp(&self) -> Option<i64> {
        self.inner.timestamp()
    }

    /// Whether the cached data is missing or older than the TTL
    pub fn is_stale(&self) -> bool {
        self.inner.is_stale()
    }

    /// Whether this instance may fetch (no tab signal counts as active)
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Capture the current fence
    pub fn fence(&self) -> Fence {
        self.inner.fence()
    }

    /// Whether a captured fence is still current
    pub fn is_current(&self, fence: &Fence) -> bool {
        self.inner.is_current(fence)
    }
}

impl<T: Send + Sync + 'static> SchedulerInner<T> {
    fn fetch_data(self: &Arc<Self>) -> FetchFuture<T> {
        let mut slot = lock(&self.in_flight);
        if let Some(in_flight) = slot.as_ref() {
            debug!("{}: joining in-flight fetch {}", self.config.name, in_flight.id);
            return in_flight.future.clone();
        }
        let fence = self.fence();
        self.begin_fetch(&mut slot, fence)
    }

    /// Fetch on behalf of a timer armed during lifecycle `epoch`
    ///
    /// Nothing is dispatched once the source has been reset since.
    fn fetch_in_epoch(self: &Arc<Self>, epoch: u64) {
        let mut slot = lock(&self.in_flight);
        if slot.is_some() {
            return;
        }
        let fence = self.fence();
        if fence.epoch() != epoch {
            debug!(
                "{}: timer from epoch {} ignored, now {}",
                self.config.name,
                epoch,
                fence.epoch()
            );
            return;
        }
        let _ = self.begin_fetch(&mut slot, fence);
    }

    fn begin_fetch(
        self: &Arc<Self>,
        slot: &mut Option<InFlight<T>>,
        fence: Fence,
    ) -> FetchFuture<T> {
        let id = self.next_fetch_id.fetch_add(1, Ordering::SeqCst);
        self.module.dispatch(ActionKind::Fetch);
        debug!("{}: fetch {} started under {}", self.config.name, id, fence);

        let task = tokio::spawn(Arc::clone(self).run_fetch(id, fence));
        let name = self.config.name.clone();
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => Err(Error::fetch(
                    name,
                    format!("fetch task failed: {}", join_error),
                )),
            }
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            future: future.clone(),
        });
        future
    }

    async fn run_fetch(self: Arc<Self>, id: u64, fence: Fence) -> Result<FetchOutcome<T>> {
        let result = self.fetch.fetch().await;

        if !self.is_current(&fence) {
            self.clear_in_flight(id);
            debug!(
                "{}: fetch {} discarded, started under {} but now {}",
                self.config.name,
                id,
                fence,
                self.fence()
            );
            return Ok(FetchOutcome::Discarded);
        }

        match result {
            Ok(data) => {
                let data = Arc::new(data);
                let item: Item = data.clone();
                let timestamp = self.clock.now_ms();
                self.module
                    .dispatch(ActionKind::FetchSuccess { data: item, timestamp });
                self.clear_in_flight(id);
                debug!("{}: fetch {} stored at {}", self.config.name, id, timestamp);
                if self.config.polling {
                    self.start_polling(None);
                }
                Ok(FetchOutcome::Fetched(data))
            }
            Err(error) => {
                self.clear_in_flight(id);
                warn!("{}: fetch {} failed: {}", self.config.name, id, error);
                self.module.dispatch(ActionKind::FetchError {
                    error: error.clone(),
                });
                if self.config.polling {
                    self.start_polling(Some(self.config.time_to_retry()));
                } else {
                    self.retry(None);
                }
                Err(error)
            }
        }
    }

    fn clear_in_flight(&self, id: u64) {
        let mut slot = lock(&self.in_flight);
        if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
            *slot = None;
        }
    }

    fn start_polling(self: &Arc<Self>, delay: Option<Duration>) {
        let delay = delay.unwrap_or_else(|| self.default_poll_delay());
        let weak = Arc::downgrade(self);
        let epoch = self.module.epoch();
        self.arm(TimerKind::Poll, delay, move || {
            if let Some(inner) = weak.upgrade()
                && inner.module.epoch() == epoch
            {
                inner.on_poll_timer(epoch);
            }
        });
    }

    fn on_poll_timer(self: &Arc<Self>, epoch: u64) {
        if !self.is_active() {
            // Inactive instances keep checking without fetching.
            self.start_polling(Some(self.config.time_to_retry()));
        } else if self.is_stale() {
            self.fetch_in_epoch(epoch);
        } else {
            self.start_polling(None);
        }
    }

    fn retry(self: &Arc<Self>, delay: Option<Duration>) {
        let delay = delay.unwrap_or_else(|| self.config.time_to_retry());
        let weak = Arc::downgrade(self);
        let epoch = self.module.epoch();
        self.arm(TimerKind::Retry, delay, move || {
            if let Some(inner) = weak.upgrade()
                && inner.module.epoch() == epoch
            {
                inner.on_retry_timer(epoch);
            }
        });
    }

    fn on_retry_timer(self: &Arc<Self>, epoch: u64) {
        if !self.is_stale() {
            return;
        }
        if self.is_active() {
            self.fetch_in_epoch(epoch);
        } else {
            self.retry(None);
        }
    }

    fn arm<F>(&self, kind: TimerKind, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let fires_at = self.clock.now_ms() + delay.as_millis() as i64;
        debug!(
            "{}: {:?} timer armed for {:?} (fires at {})",
            self.config.name, kind, delay, fires_at
        );
        self.timer.arm(
            ScheduledTimer {
                kind,
                delay,
                fires_at,
            },
            on_fire,
        );
    }

    fn default_poll_delay(&self) -> Duration {
        match self.timestamp() {
            Some(timestamp) => {
                let due = timestamp + self.config.ttl_ms as i64 + POLL_EPSILON_MS as i64;
                Duration::from_millis((due - self.clock.now_ms()).max(0) as u64)
            }
            None => Duration::ZERO,
        }
    }

    fn data(&self) -> Option<Arc<T>> {
        self.store.get_item(&self.data_key).and_then(item_as::<T>)
    }

    fn timestamp(&self) -> Option<i64> {
        self.store
            .get_item(&self.timestamp_key)
            .and_then(item_as::<i64>)
            .map(|timestamp| *timestamp)
    }

    fn is_stale(&self) -> bool {
        match self.timestamp() {
            Some(timestamp) => self.clock.now_ms() - timestamp > self.config.ttl_ms as i64,
            None => true,
        }
    }

    fn is_active(&self) -> bool {
        self.tab.as_ref().is_none_or(|tab| tab.active())
    }

    fn fence(&self) -> Fence {
        Fence::new(self.session.owner_id(), self.module.epoch())
    }

    fn is_current(&self, fence: &Fence) -> bool {
        *fence == self.fence()
    }
}
