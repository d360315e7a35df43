// # datasync-core
//
// Core library for reactive, TTL-based data synchronization.
//
// ## Architecture Overview
//
// This library keeps locally cached copies of remote data fresh and
// composes them into derived views:
// - **FetchScheduler**: single in-flight fetch, poll and retry timers,
//   owner-fenced completion
// - **LifecycleCoordinator**: gates a source on session, store, push and
//   tab readiness
// - **SubscriptionBridge**: debounced refetch on matching push messages
// - **Aggregator**: memoized selector graph over sources and lookup caches
// - **ChangeFanOut**: pokes downstream matchers only on genuine change
// - **CallMonitor**: the call list built from presence and active calls
//
// ## Design Principles
//
// 1. **Explicit Collaborators**: session, store, push and tab signal are
//    injected traits, never globals
// 2. **Fenced Async**: every fetch captures owner + epoch and is dropped if
//    either moved on
// 3. **Reference Stability**: derived outputs keep their `Arc` until an
//    input changes, so consumers can memoize on pointers
// 4. **Library-First**: the daemon is a thin shell over this crate

pub mod aggregate;
pub mod calls;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod source;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use aggregate::{Aggregator, ChangeFanOut, Node, Selector};
pub use calls::{CallMonitor, active_calls_source, normalize_number};
pub use clock::{Clock, SystemClock, TokioClock};
pub use config::SourceConfig;
pub use error::{Error, Result};
pub use identity::{Fence, IdentityToken};
pub use source::{
    DataSource, FetchOutcome, FetchScheduler, LifecycleCoordinator, ModuleStatus,
    SubscriptionBridge,
};
pub use state::{LocalPushChannel, LocalSession, MemoryStore, TabFlag};
pub use traits::{FetchFunction, PushSubscription, Session, Store, TabActivity};
