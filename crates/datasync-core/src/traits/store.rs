// # Store Trait
//
// Defines the reducer-based key/value store the core writes through.
//
// ## Purpose
//
// Each data source registers two keys: one for its data and one for the
// timestamp of the last successful fetch. All writes go through
// `dispatch`, so consumers observe the new data together with the status
// transition that produced it.
//
// ## Identity
//
// Items are `Arc`s. A reducer that does not change a key must return the
// same `Arc` it was given; downstream selectors rely on pointer identity
// to skip recomputation.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::traits::Observable;

/// A type-erased stored value
pub type Item = Arc<dyn Any + Send + Sync>;

/// Reducer for a single store key
///
/// Receives the current item (if any) and an action, returns the next item.
pub type Reducer = Box<dyn Fn(Option<&Item>, &Action) -> Option<Item> + Send + Sync>;

/// An action dispatched by a module, tagged with the module name
#[derive(Debug, Clone)]
pub struct Action {
    /// Name of the module that dispatched the action
    pub source: Arc<str>,
    /// What happened
    pub kind: ActionKind,
}

/// The action vocabulary shared by every module
#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Dependencies became ready, initialization started
    Init,
    /// Initialization finished
    InitSuccess,
    /// A dependency became unavailable, reset started
    Reset,
    /// Reset finished, module is pending again
    ResetSuccess,
    /// A fetch started
    Fetch,
    /// A fetch completed for the current owner
    FetchSuccess {
        /// The fetched data
        data: Item,
        /// Completion time in milliseconds since the epoch
        timestamp: i64,
    },
    /// A fetch failed for the current owner
    FetchError {
        /// The failure
        error: Error,
    },
}

impl ActionKind {
    /// Short name of the action kind
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Init => "init",
            ActionKind::InitSuccess => "initSuccess",
            ActionKind::Reset => "reset",
            ActionKind::ResetSuccess => "resetSuccess",
            ActionKind::Fetch => "fetch",
            ActionKind::FetchSuccess { .. } => "fetchSuccess",
            ActionKind::FetchError { .. } => "fetchError",
        }
    }
}

impl Action {
    /// Create an action for a module
    pub fn new(source: impl Into<Arc<str>>, kind: ActionKind) -> Self {
        Self {
            source: source.into(),
            kind,
        }
    }

    /// Whether this action was dispatched by the named module
    pub fn is_for(&self, source: &str) -> bool {
        &*self.source == source
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.kind.name())
    }
}

/// Downcast a stored item, keeping its pointer identity
pub fn item_as<T: Any + Send + Sync>(item: Item) -> Option<Arc<T>> {
    item.downcast::<T>().ok()
}

/// Trait for store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call from any task. `dispatch` applies every
/// registered reducer and then notifies observers once.
pub trait Store: Observable + Send + Sync {
    /// Whether the store has loaded and accepts reads/writes
    fn ready(&self) -> bool;

    /// Read the current item for a key
    fn get_item(&self, key: &str) -> Option<Item>;

    /// Register the reducer owning a key
    ///
    /// Registering a key twice replaces the previous reducer.
    fn register_reducer(&self, key: &str, reducer: Reducer);

    /// Apply an action to every registered reducer
    fn dispatch(&self, action: Action);
}
