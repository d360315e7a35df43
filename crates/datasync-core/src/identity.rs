//! Owner identity and fencing
//!
//! Every asynchronous operation that may outlive the state it was started
//! under captures a [`Fence`] first and compares it on resume. A fence
//! holds the owner identity and the lifecycle epoch of the source; a
//! logout, an account switch, or a reset in between makes the fence stale
//! and the result is dropped without any write.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque owner/session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityToken(Arc<str>);

impl IdentityToken {
    /// Create a token from an owner id
    pub fn new(owner: impl Into<Arc<str>>) -> Self {
        Self(owner.into())
    }

    /// The raw owner id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityToken {
    fn from(owner: &str) -> Self {
        Self::new(owner)
    }
}

/// Snapshot of the owner identity and lifecycle epoch at operation start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence {
    owner: Option<IdentityToken>,
    epoch: u64,
}

impl Fence {
    /// Capture a fence
    pub fn new(owner: Option<IdentityToken>, epoch: u64) -> Self {
        Self { owner, epoch }
    }

    /// Owner at capture time
    pub fn owner(&self) -> Option<&IdentityToken> {
        self.owner.as_ref()
    }

    /// Lifecycle epoch at capture time
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl fmt::Display for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{}@{}", owner, self.epoch),
            None => write!(f, "<none>@{}", self.epoch),
        }
    }
}
