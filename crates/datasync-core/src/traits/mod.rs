//! Core traits for the datasync system
//!
//! These are the collaborator contracts the core consumes. Every
//! collaborator is injected explicitly; nothing is reached through a
//! global.
//!
//! - [`Session`]: login state and the owner identity
//! - [`Store`]: reducer-based key/value store
//! - [`PushSubscription`]: optional push notification transport
//! - [`TabActivity`]: optional "is this instance the active one" signal
//! - [`FetchFunction`]: the injected remote call

pub mod fetch;
pub mod observable;
pub mod push;
pub mod session;
pub mod store;
pub mod tab;

pub use fetch::{FetchFunction, FnFetch, fetch_fn};
pub use observable::{ChangeReceiver, ChangeSignal, Observable};
pub use push::{PushMessage, PushSubscription};
pub use session::Session;
pub use store::{Action, ActionKind, Item, Reducer, Store, item_as};
pub use tab::TabActivity;
