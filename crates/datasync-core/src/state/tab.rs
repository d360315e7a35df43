use std::sync::atomic::{AtomicBool, Ordering};

use crate::traits::{ChangeReceiver, ChangeSignal, Observable, TabActivity};

/// In-process activity flag
#[derive(Debug)]
pub struct TabFlag {
    active: AtomicBool,
    signal: ChangeSignal,
}

impl TabFlag {
    /// Create a flag with the given initial state
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
            signal: ChangeSignal::new(),
        }
    }

    /// Mark this instance active or inactive
    pub fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            self.signal.notify();
        }
    }
}

impl Observable for TabFlag {
    fn changes(&self) -> ChangeReceiver {
        self.signal.subscribe()
    }
}

impl TabActivity for TabFlag {
    fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
