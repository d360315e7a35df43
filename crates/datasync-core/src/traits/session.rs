// # Session Trait
//
// The session decides who owns the data. The core only reads it: login
// state gates initialization, and the owner identity fences every
// asynchronous fetch.

use crate::identity::IdentityToken;
use crate::traits::Observable;

/// Authentication/session collaborator
pub trait Session: Observable + Send + Sync {
    /// Whether a user is currently logged in
    fn logged_in(&self) -> bool;

    /// Identity of the current owner, `None` while logged out
    fn owner_id(&self) -> Option<IdentityToken>;

    /// Whether the current login happened in this process lifetime
    ///
    /// A fresh login forces an immediate fetch regardless of cached data.
    fn is_fresh_login(&self) -> bool;
}
