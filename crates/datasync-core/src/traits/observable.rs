// # Change Notification
//
// Every collaborator exposes a `watch` channel carrying a version counter.
// Coordinators hold one receiver per collaborator and re-evaluate their
// state machine whenever any of them ticks.

use tokio::sync::watch;

/// Receiver half of a change signal
pub type ChangeReceiver = watch::Receiver<u64>;

/// Something whose state changes can be observed
pub trait Observable {
    /// Subscribe to change notifications
    ///
    /// The returned receiver treats the current version as already seen.
    fn changes(&self) -> ChangeReceiver;
}

/// Sender half of a change signal, shared by the in-process collaborators
#[derive(Debug)]
pub struct ChangeSignal {
    tx: watch::Sender<u64>,
}

impl ChangeSignal {
    /// Create a signal at version zero
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Bump the version and wake every receiver
    pub fn notify(&self) {
        self.tx.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Current version
    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Create a new receiver
    pub fn subscribe(&self) -> ChangeReceiver {
        self.tx.subscribe()
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}
