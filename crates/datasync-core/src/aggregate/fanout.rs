//! Change fan-out
//!
//! Downstream consumers (contact or activity matchers) are expensive to
//! trigger. A [`ChangeFanOut`] remembers the last output it saw from a node
//! and invokes its trigger only when the node hands back a different
//! reference.

use std::sync::Mutex;
use tracing::debug;

use super::identity::RefIdentity;
use crate::state::lock;

type Trigger<O> = Box<dyn Fn(&O) + Send + Sync>;

/// Fires a trigger once per genuine change of a tracked output
pub struct ChangeFanOut<O> {
    name: String,
    last_seen: Mutex<Option<O>>,
    trigger: Trigger<O>,
}

impl<O: RefIdentity> ChangeFanOut<O> {
    /// Create a fan-out that has seen nothing yet
    pub fn new(name: impl Into<String>, trigger: impl Fn(&O) + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            last_seen: Mutex::new(None),
            trigger: Box::new(trigger),
        }
    }

    /// Observe a node output; returns whether the trigger fired
    pub fn on_recompute(&self, output: &O) -> bool {
        {
            let mut last_seen = lock(&self.last_seen);
            if last_seen.as_ref().is_some_and(|seen| seen.same_ref(output)) {
                return false;
            }
            *last_seen = Some(output.clone());
        }
        debug!("{}: tracked output changed, triggering", self.name);
        (self.trigger)(output);
        true
    }

    /// The last output seen
    pub fn last_seen(&self) -> Option<O> {
        lock(&self.last_seen).clone()
    }

    /// Forget the last output so the next one fires
    pub fn forget(&self) {
        lock(&self.last_seen).take();
    }
}

impl<O> std::fmt::Debug for ChangeFanOut<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFanOut")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Node, Selector};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_once_per_new_reference() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let fan_out = ChangeFanOut::new("uniqueNumbers", move |_: &Arc<Vec<String>>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let empty = Arc::new(Vec::new());
        assert!(fan_out.on_recompute(&empty));
        assert!(!fan_out.on_recompute(&empty));

        let grown = Arc::new(vec!["+15551234567".to_string()]);
        assert!(fan_out.on_recompute(&grown));
        assert!(!fan_out.on_recompute(&grown));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn memoized_node_keeps_fan_out_quiet() {
        let numbers = Arc::new(Mutex::new(Arc::new(vec!["+15551234567".to_string()])));
        let reader = numbers.clone();
        let node = Node::new(
            "uniqueNumbers",
            Selector::new(move || reader.lock().unwrap().clone()),
            |calls: &Arc<Vec<String>>| Arc::new(calls.iter().cloned().collect::<Vec<_>>()),
        );

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let fan_out = ChangeFanOut::new("uniqueNumbers", move |_: &Arc<Vec<String>>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        fan_out.on_recompute(&node.get());
        fan_out.on_recompute(&node.get());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Equal by value, new reference upstream: the node recomputes and
        // hands out a new reference, so the fan-out fires.
        *numbers.lock().unwrap() = Arc::new(vec!["+15551234567".to_string()]);
        fan_out.on_recompute(&node.get());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
