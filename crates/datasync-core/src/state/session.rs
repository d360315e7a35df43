// # Local Session
//
// Session collaborator driven by the embedding application: it reports
// login, logout, and account switches, and the data sources follow.

use std::sync::Mutex;
use tracing::info;

use super::lock;
use crate::identity::IdentityToken;
use crate::traits::{ChangeReceiver, ChangeSignal, Observable, Session};

#[derive(Debug, Default)]
struct SessionState {
    owner: Option<IdentityToken>,
    fresh_login: bool,
}

/// In-process session
#[derive(Debug, Default)]
pub struct LocalSession {
    state: Mutex<SessionState>,
    signal: ChangeSignal,
}

impl LocalSession {
    /// Create a logged-out session
    pub fn new() -> Self {
        Self::default()
    }

    /// Log in interactively; cached data is refetched immediately
    pub fn login(&self, owner: impl Into<IdentityToken>) {
        self.set(Some(owner.into()), true);
    }

    /// Restore a persisted login; cached data is reused while fresh
    pub fn restore(&self, owner: impl Into<IdentityToken>) {
        self.set(Some(owner.into()), false);
    }

    /// Log out
    pub fn logout(&self) {
        self.set(None, false);
    }

    fn set(&self, owner: Option<IdentityToken>, fresh_login: bool) {
        {
            let mut state = lock(&self.state);
            match &owner {
                Some(owner) => info!("session owner is now {}", owner),
                None => info!("session logged out"),
            }
            state.owner = owner;
            state.fresh_login = fresh_login;
        }
        self.signal.notify();
    }
}

impl Observable for LocalSession {
    fn changes(&self) -> ChangeReceiver {
        self.signal.subscribe()
    }
}

impl Session for LocalSession {
    fn logged_in(&self) -> bool {
        lock(&self.state).owner.is_some()
    }

    fn owner_id(&self) -> Option<IdentityToken> {
        lock(&self.state).owner.clone()
    }

    fn is_fresh_login(&self) -> bool {
        lock(&self.state).fresh_login
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_switch_logout() {
        let session = LocalSession::new();
        assert!(!session.logged_in());

        session.login("101");
        assert!(session.logged_in());
        assert!(session.is_fresh_login());
        assert_eq!(session.owner_id(), Some(IdentityToken::new("101")));

        session.restore("202");
        assert!(!session.is_fresh_login());
        assert_eq!(session.owner_id().unwrap().as_str(), "202");

        session.logout();
        assert!(!session.logged_in());
        assert_eq!(session.owner_id(), None);
    }
}
