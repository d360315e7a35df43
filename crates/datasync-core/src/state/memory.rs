// # Memory Store
//
// In-memory implementation of Store.
//
// ## Purpose
//
// Provides a simple reducer-based key/value store that doesn't persist
// across restarts. Useful for tests, for the daemon, and for embedding
// applications without a store of their own.
//
// ## Readiness
//
// A new store is ready. Applications that hydrate from disk can mark it
// not ready while loading; data sources stay pending until it is ready
// again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

use super::{read, write};
use crate::traits::{Action, ChangeReceiver, ChangeSignal, Item, Observable, Reducer, Store};

/// In-memory store implementation
///
/// Items live in a HashMap protected by a RwLock; reducers are applied in
/// a single write section per dispatch and observers are notified once.
///
/// # Example
///
/// ```rust
/// use datasync_core::state::MemoryStore;
/// use datasync_core::traits::{Action, ActionKind, Store};
/// use std::sync::Arc;
///
/// let store = MemoryStore::new();
/// store.register_reducer("counter", Box::new(|current, action| {
///     let count = current
///         .and_then(|item| item.downcast_ref::<u32>().copied())
///         .unwrap_or(0);
///     match action.kind {
///         ActionKind::Fetch => Some(Arc::new(count + 1)),
///         _ => current.cloned(),
///     }
/// }));
///
/// store.dispatch(Action::new("demo", ActionKind::Fetch));
/// let count = store.get_item("counter").unwrap();
/// assert_eq!(count.downcast_ref::<u32>(), Some(&1));
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    ready: AtomicBool,
    items: RwLock<HashMap<String, Item>>,
    reducers: RwLock<HashMap<String, Reducer>>,
    signal: ChangeSignal,
}

impl MemoryStore {
    /// Create a new empty, ready store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                ready: AtomicBool::new(true),
                items: RwLock::new(HashMap::new()),
                reducers: RwLock::new(HashMap::new()),
                signal: ChangeSignal::new(),
            }),
        }
    }

    /// Mark the store ready or not ready
    pub fn set_ready(&self, ready: bool) {
        if self.inner.ready.swap(ready, Ordering::SeqCst) != ready {
            self.inner.signal.notify();
        }
    }

    /// Write an item directly, bypassing reducers
    ///
    /// Used to seed the store with previously persisted items.
    pub fn hydrate(&self, key: impl Into<String>, item: Item) {
        write(&self.inner.items).insert(key.into(), item);
        self.inner.signal.notify();
    }

    /// Get the number of items in the store
    pub fn len(&self) -> usize {
        read(&self.inner.items).len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        read(&self.inner.items).is_empty()
    }

    /// Remove all items, keeping the registered reducers
    pub fn clear(&self) {
        write(&self.inner.items).clear();
        self.inner.signal.notify();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = read(&self.inner.items).keys().cloned().collect();
        keys.sort();
        f.debug_struct("MemoryStore")
            .field("ready", &self.inner.ready.load(Ordering::SeqCst))
            .field("keys", &keys)
            .finish()
    }
}

impl Observable for MemoryStore {
    fn changes(&self) -> ChangeReceiver {
        self.inner.signal.subscribe()
    }
}

impl Store for MemoryStore {
    fn ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    fn get_item(&self, key: &str) -> Option<Item> {
        read(&self.inner.items).get(key).cloned()
    }

    fn register_reducer(&self, key: &str, reducer: Reducer) {
        write(&self.inner.reducers).insert(key.to_string(), reducer);
    }

    fn dispatch(&self, action: Action) {
        {
            let reducers = read(&self.inner.reducers);
            let mut items = write(&self.inner.items);
            for (key, reducer) in reducers.iter() {
                match reducer(items.get(key), &action) {
                    Some(next) => {
                        items.insert(key.clone(), next);
                    }
                    None => {
                        items.remove(key);
                    }
                }
            }
        }
        trace!("dispatched {}", action);
        self.inner.signal.notify();
    }
}
