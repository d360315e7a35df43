//! Lifecycle coordination
//!
//! The coordinator gates a source on its collaborators. It re-evaluates on
//! every change of the session, the store, the push subscription and the
//! tab signal:
//!
//! - **pending, all dependencies ready**: dispatch `init`, fetch now or
//!   schedule, subscribe push filters, dispatch `initSuccess`
//! - **ready, a dependency lost**: cancel the timer, drop the in-flight
//!   fetch, dispatch `reset` then `resetSuccess`
//! - **ready, owner switched**: reset, then initialize again with a fetch
//!   for the new owner
//! - **ready, new push message**: hand it to the subscription handler
//!
//! ```text
//! pending ──► initializing ──► ready ──► resetting ──► pending
//! ```

use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info};

use super::bridge::SubscriptionHandler;
use super::scheduler::FetchScheduler;
use super::status::{ModuleState, ModuleStatus};
use crate::error::Result;
use crate::identity::IdentityToken;
use crate::state::lock;
use crate::traits::{
    ActionKind, ChangeReceiver, PushMessage, PushSubscription, Session, Store, TabActivity,
};

/// A set of change receivers awaited together
pub struct ChangeSet {
    streams: StreamMap<usize, WatchStream<u64>>,
    next_key: usize,
}

impl ChangeSet {
    /// Create a set from receivers
    pub fn new(receivers: Vec<ChangeReceiver>) -> Self {
        let mut set = Self {
            streams: StreamMap::new(),
            next_key: 0,
        };
        for receiver in receivers {
            set.push(receiver);
        }
        set
    }

    /// Add a receiver; only changes after this call are reported
    pub fn push(&mut self, receiver: ChangeReceiver) {
        self.streams
            .insert(self.next_key, WatchStream::from_changes(receiver));
        self.next_key += 1;
    }

    /// Number of receivers not yet seen closed
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether every receiver has closed
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Wait until any receiver sees a change
    ///
    /// Closed receivers are dropped from the set. Returns `false` once none
    /// are left.
    pub async fn changed(&mut self) -> bool {
        self.streams.next().await.is_some()
    }
}

/// What an evaluation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do
    Idle,
    /// The source went through `init` to `ready`
    Initialized,
    /// The source went through `reset` back to `pending`
    Reset,
    /// A new push message was handed to the handler
    MessageHandled,
    /// The session switched owners: reset, then initialized for the new one
    OwnerSwitched,
}

/// Collaborators of a coordinator
pub(crate) struct CoordinatorParts<T> {
    pub module: Arc<ModuleState>,
    pub scheduler: FetchScheduler<T>,
    pub session: Arc<dyn Session>,
    pub store: Arc<dyn Store>,
    pub push: Option<Arc<dyn PushSubscription>>,
    pub tab: Option<Arc<dyn TabActivity>>,
    pub handler: Option<Arc<dyn SubscriptionHandler<T>>>,
}

/// Drives one source through its lifecycle
pub struct LifecycleCoordinator<T> {
    module: Arc<ModuleState>,
    scheduler: FetchScheduler<T>,
    session: Arc<dyn Session>,
    store: Arc<dyn Store>,
    push: Option<Arc<dyn PushSubscription>>,
    tab: Option<Arc<dyn TabActivity>>,
    handler: Option<Arc<dyn SubscriptionHandler<T>>>,
    last_message: Mutex<Option<Arc<PushMessage>>>,
    owner: Mutex<Option<IdentityToken>>,
    gate: tokio::sync::Mutex<()>,
}

impl<T: Send + Sync + 'static> LifecycleCoordinator<T> {
    pub(crate) fn new(parts: CoordinatorParts<T>) -> Self {
        Self {
            module: parts.module,
            scheduler: parts.scheduler,
            session: parts.session,
            store: parts.store,
            push: parts.push,
            tab: parts.tab,
            handler: parts.handler,
            last_message: Mutex::new(None),
            owner: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Whether session, store and push subscription are all ready
    pub fn dependencies_ready(&self) -> bool {
        self.session.logged_in()
            && self.store.ready()
            && self.push.as_ref().is_none_or(|push| push.ready())
    }

    /// Receivers for every collaborator this coordinator reacts to
    pub fn change_set(&self) -> ChangeSet {
        let mut changes = ChangeSet::new(vec![self.session.changes(), self.store.changes()]);
        if let Some(push) = &self.push {
            changes.push(push.changes());
        }
        if let Some(tab) = &self.tab {
            changes.push(tab.changes());
        }
        changes
    }

    /// Evaluate the state machine once
    ///
    /// Evaluations are serialized; an initialization that fetches completes
    /// before the next evaluation starts.
    pub async fn on_state_change(&self) -> Transition {
        let _gate = self.gate.lock().await;
        let status = self.module.status();

        if status == ModuleStatus::Pending && self.dependencies_ready() {
            self.initialize(false).await;
            Transition::Initialized
        } else if status == ModuleStatus::Ready && !self.dependencies_ready() {
            self.reset();
            Transition::Reset
        } else if status == ModuleStatus::Ready && self.owner_switched() {
            info!("{}: session owner switched", self.module.name());
            self.reset();
            self.initialize(true).await;
            Transition::OwnerSwitched
        } else if status == ModuleStatus::Ready && self.deliver_push_message() {
            Transition::MessageHandled
        } else {
            Transition::Idle
        }
    }

    fn owner_switched(&self) -> bool {
        *lock(&self.owner) != self.session.owner_id()
    }

    /// `refetch` forces a fetch even when the cached data is fresh
    async fn initialize(&self, refetch: bool) {
        let name = self.module.name();
        info!("{}: initializing", name);
        *lock(&self.owner) = self.session.owner_id();
        self.module.dispatch(ActionKind::Init);

        let active = self.tab.as_ref().is_none_or(|tab| tab.active());
        let wanted = refetch || self.session.is_fresh_login() || self.scheduler.is_stale();
        if active && wanted {
            // A failed first fetch has already scheduled its retry.
            if let Err(e) = self.scheduler.fetch_data().await {
                debug!("{}: initial fetch failed: {}", name, e);
            }
        } else if self.scheduler.config().polling {
            self.scheduler.start_polling(None);
        } else {
            self.scheduler.retry(None);
        }

        if let Some(push) = &self.push {
            let filters = &self.scheduler.config().subscription_filters;
            if !filters.is_empty() {
                push.subscribe(filters);
            }
            // Only messages arriving after initialization are handled.
            *lock(&self.last_message) = push.message();
        }

        self.module.dispatch(ActionKind::InitSuccess);
        info!("{}: ready", name);
    }

    fn reset(&self) {
        info!("{}: dependency lost, resetting", self.module.name());
        self.scheduler.cancel_timer();
        self.scheduler.drop_in_flight();
        self.module.dispatch(ActionKind::Reset);
        self.module.dispatch(ActionKind::ResetSuccess);
    }

    fn deliver_push_message(&self) -> bool {
        let (Some(push), Some(handler)) = (&self.push, &self.handler) else {
            return false;
        };
        if !push.ready() {
            return false;
        }
        let Some(message) = push.message() else {
            return false;
        };

        {
            let mut last = lock(&self.last_message);
            if last.as_ref().is_some_and(|seen| Arc::ptr_eq(seen, &message)) {
                return false;
            }
            *last = Some(Arc::clone(&message));
        }

        debug!("{}: delivering push event {}", self.module.name(), message.event);
        let handler = Arc::clone(handler);
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move { handler.handle(message, scheduler).await });
        true
    }

    /// Cancel timers, drop the in-flight fetch and unsubscribe push filters
    pub fn dispose(&self) {
        self.scheduler.cancel_timer();
        self.scheduler.drop_in_flight();
        if let Some(push) = &self.push {
            let filters = &self.scheduler.config().subscription_filters;
            if !filters.is_empty() {
                push.unsubscribe(filters);
            }
        }
        debug!("{}: disposed", self.module.name());
    }

    /// Run until SIGINT, then dispose
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run until the shutdown receiver fires (or SIGINT when `None`)
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let mut changes = self.change_set();
        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        };
        tokio::pin!(shutdown);

        self.on_state_change().await;
        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if !changed {
                        debug!("{}: all collaborators dropped", self.module.name());
                        break;
                    }
                    self.on_state_change().await;
                }

                _ = &mut shutdown => {
                    info!("{}: shutdown signal received", self.module.name());
                    break;
                }
            }
        }

        self.dispose();
        Ok(())
    }
}
