//! Module status and the `{status, dispatch, subscribe}` handle
//!
//! Every module (data source or aggregate) owns a [`ModuleState`]. It
//! reduces the module's own actions into a [`SourceState`] and forwards
//! every action to the store, so that observers see data writes and status
//! transitions in the same notification.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::state::lock;
use crate::traits::{Action, ActionKind, ChangeReceiver, Item, Reducer, Store};

/// Lifecycle status of a module
///
/// `Pending → Initializing → Ready ⇄ Resetting → Pending`. `Initializing`
/// and `Resetting` are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleStatus {
    /// Waiting for dependencies
    Pending,
    /// Dependencies became ready, first fetch or schedule in progress
    Initializing,
    /// Serving data and scheduling refreshes
    Ready,
    /// A dependency was lost, timers are being torn down
    Resetting,
}

/// Whether a fetch is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchStatus {
    /// No fetch in flight
    Idle,
    /// A fetch is in flight
    Fetching,
}

/// Reduced state of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceState {
    /// Lifecycle status
    pub status: ModuleStatus,
    /// Fetch status
    pub fetch_status: FetchStatus,
    /// Error of the last failed fetch, cleared by the next success
    pub error: Option<Error>,
}

impl SourceState {
    /// Apply one of the module's own actions
    pub fn reduce(&mut self, kind: &ActionKind) {
        match kind {
            ActionKind::Init => self.status = ModuleStatus::Initializing,
            ActionKind::InitSuccess => self.status = ModuleStatus::Ready,
            ActionKind::Reset => self.status = ModuleStatus::Resetting,
            ActionKind::ResetSuccess => {
                self.status = ModuleStatus::Pending;
                self.fetch_status = FetchStatus::Idle;
            }
            ActionKind::Fetch => self.fetch_status = FetchStatus::Fetching,
            ActionKind::FetchSuccess { .. } => {
                self.fetch_status = FetchStatus::Idle;
                self.error = None;
            }
            ActionKind::FetchError { error } => {
                self.fetch_status = FetchStatus::Idle;
                self.error = Some(error.clone());
            }
        }
    }
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            status: ModuleStatus::Pending,
            fetch_status: FetchStatus::Idle,
            error: None,
        }
    }
}

/// Status handle shared by a module's scheduler and coordinator
pub struct ModuleState {
    name: Arc<str>,
    state: Mutex<SourceState>,
    epoch: AtomicU64,
    store: Arc<dyn Store>,
}

impl ModuleState {
    /// Create a pending module writing through `store`
    pub fn new(name: impl Into<Arc<str>>, store: Arc<dyn Store>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SourceState::default()),
            epoch: AtomicU64::new(0),
            store,
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status
    pub fn status(&self) -> ModuleStatus {
        lock(&self.state).status
    }

    /// Snapshot of the reduced state
    pub fn snapshot(&self) -> SourceState {
        lock(&self.state).clone()
    }

    /// Whether the module is ready
    pub fn ready(&self) -> bool {
        self.status() == ModuleStatus::Ready
    }

    /// Lifecycle epoch, bumped on every reset
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Reduce an action locally, then forward it to the store
    pub fn dispatch(&self, kind: ActionKind) {
        if matches!(kind, ActionKind::Reset) {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        lock(&self.state).reduce(&kind);
        self.store.dispatch(Action::new(self.name.clone(), kind));
    }

    /// Subscribe to store changes
    pub fn subscribe(&self) -> ChangeReceiver {
        self.store.changes()
    }
}

impl std::fmt::Debug for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleState")
            .field("name", &self.name)
            .field("state", &self.snapshot())
            .field("epoch", &self.epoch())
            .finish()
    }
}

/// Default reducer for a source's data key: replaced on `fetchSuccess`
pub fn data_reducer(source: Arc<str>) -> Reducer {
    Box::new(move |current, action| match &action.kind {
        ActionKind::FetchSuccess { data, .. } if action.is_for(&source) => Some(data.clone()),
        _ => current.cloned(),
    })
}

/// Default reducer for a source's timestamp key: replaced on `fetchSuccess`
pub fn timestamp_reducer(source: Arc<str>) -> Reducer {
    Box::new(move |current, action| match &action.kind {
        ActionKind::FetchSuccess { timestamp, .. } if action.is_for(&source) => {
            let item: Item = Arc::new(*timestamp);
            Some(item)
        }
        _ => current.cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;

    #[test]
    fn lifecycle_transitions() {
        let mut state = SourceState::default();
        assert_eq!(state.status, ModuleStatus::Pending);

        state.reduce(&ActionKind::Init);
        assert_eq!(state.status, ModuleStatus::Initializing);
        state.reduce(&ActionKind::InitSuccess);
        assert_eq!(state.status, ModuleStatus::Ready);
        state.reduce(&ActionKind::Reset);
        assert_eq!(state.status, ModuleStatus::Resetting);
        state.reduce(&ActionKind::ResetSuccess);
        assert_eq!(state.status, ModuleStatus::Pending);
    }

    #[test]
    fn fetch_error_is_cleared_by_success() {
        let mut state = SourceState::default();
        state.reduce(&ActionKind::Fetch);
        assert_eq!(state.fetch_status, FetchStatus::Fetching);

        state.reduce(&ActionKind::FetchError {
            error: Error::fetch("presence", "timeout"),
        });
        assert_eq!(state.fetch_status, FetchStatus::Idle);
        assert!(state.error.is_some());

        state.reduce(&ActionKind::FetchSuccess {
            data: Arc::new(()),
            timestamp: 5,
        });
        assert!(state.error.is_none());
    }

    #[test]
    fn reset_bumps_epoch_and_reaches_store() {
        let store = Arc::new(MemoryStore::new());
        let module = ModuleState::new("presence", store.clone());
        store.register_reducer("presenceData", data_reducer("presence".into()));
        store.register_reducer("presenceTimestamp", timestamp_reducer("presence".into()));

        module.dispatch(ActionKind::FetchSuccess {
            data: Arc::new(vec![1_u8]),
            timestamp: 1_000,
        });
        let ts = store.get_item("presenceTimestamp").unwrap();
        assert_eq!(ts.downcast_ref::<i64>(), Some(&1_000));

        assert_eq!(module.epoch(), 0);
        module.dispatch(ActionKind::Reset);
        assert_eq!(module.epoch(), 1);
    }

    #[test]
    fn reducers_ignore_other_sources() {
        let store = MemoryStore::new();
        store.register_reducer("presenceData", data_reducer("presence".into()));
        store.dispatch(Action::new(
            "activeCalls",
            ActionKind::FetchSuccess {
                data: Arc::new(1_u8),
                timestamp: 1,
            },
        ));
        assert!(store.get_item("presenceData").is_none());
    }
}
