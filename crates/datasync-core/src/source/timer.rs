//! Single-slot cancellable timer
//!
//! A source has at most one pending timer. Arming the slot aborts whatever
//! was armed before; a timer that has fired removes itself from the slot
//! before running its callback, so the callback may re-arm freely.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::state::lock;

/// What a pending timer will do when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Polling check: refetch if stale, otherwise re-arm
    Poll,
    /// Retry check: refetch if still stale
    Retry,
}

/// Description of the pending timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTimer {
    /// Poll or retry
    pub kind: TimerKind,
    /// Delay the timer was armed with
    pub delay: Duration,
    /// Expected firing time in milliseconds since the epoch
    pub fires_at: i64,
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    armed: Option<Armed>,
}

struct Armed {
    generation: u64,
    info: ScheduledTimer,
    handle: JoinHandle<()>,
}

#[derive(Clone, Default)]
pub(crate) struct TimerSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl TimerSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Cancel the pending timer (if any) and arm a new one
    pub(crate) fn arm<F>(&self, info: ScheduledTimer, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = lock(&self.inner);
        if let Some(previous) = state.armed.take() {
            previous.handle.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let slot = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(info.delay).await;
            if slot.take_if(generation) {
                on_fire();
            }
        });

        state.armed = Some(Armed {
            generation,
            info,
            handle,
        });
    }

    /// Cancel the pending timer, returning whether one was pending
    pub(crate) fn cancel(&self) -> bool {
        match lock(&self.inner).armed.take() {
            Some(armed) => {
                armed.handle.abort();
                true
            }
            None => false,
        }
    }

    /// The pending timer, if any
    pub(crate) fn scheduled(&self) -> Option<ScheduledTimer> {
        lock(&self.inner).armed.as_ref().map(|armed| armed.info)
    }

    fn take_if(&self, generation: u64) -> bool {
        let mut state = lock(&self.inner);
        match &state.armed {
            Some(armed) if armed.generation == generation => {
                state.armed = None;
                true
            }
            _ => false,
        }
    }
}
