//! Memoized selector graph
//!
//! An [`Aggregator`] holds named [`Node`]s. Each node reads its inputs
//! through [`Selector`]s and recomputes its output only when at least one
//! input differs by reference from the inputs of the previous computation.
//! Otherwise the cached output is returned as-is, so that consumers can
//! memoize on the output's reference too.
//!
//! ```text
//! presence.data ──┐
//! activeCalls.data┼──► normalizedCalls ──┬──► calls
//! region ─────────┘                     └──► uniqueNumbers ──► ChangeFanOut
//! ```

pub mod fanout;
pub mod identity;

pub use fanout::ChangeFanOut;
pub use identity::RefIdentity;

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::trace;

use crate::error::{Error, Result};
use crate::state::{lock, read, write};

/// A cheap, shareable read of some value
pub struct Selector<T> {
    read: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T> Selector<T> {
    /// Wrap a read function
    pub fn new(read: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            read: Arc::new(read),
        }
    }

    /// Read the current value
    pub fn get(&self) -> T {
        (self.read)()
    }
}

impl<T: Clone + Send + Sync + 'static> Selector<T> {
    /// Selector always returning the same value
    pub fn constant(value: T) -> Self {
        Self::new(move || value.clone())
    }
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self {
            read: Arc::clone(&self.read),
        }
    }
}

impl<T> std::fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Selector")
    }
}

/// A set of selectors read together as a node's inputs
pub trait Inputs: Send + Sync + 'static {
    /// Values read from the selectors
    type Values: RefIdentity;

    /// Read every selector
    fn read(&self) -> Self::Values;
}

impl<A: RefIdentity> Inputs for Selector<A> {
    type Values = A;

    fn read(&self) -> A {
        self.get()
    }
}

macro_rules! impl_inputs_for_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: RefIdentity),+> Inputs for ($(Selector<$name>,)+) {
            type Values = ($($name,)+);

            fn read(&self) -> Self::Values {
                ($(self.$idx.get(),)+)
            }
        }
    };
}

impl_inputs_for_tuple!(A: 0);
impl_inputs_for_tuple!(A: 0, B: 1);
impl_inputs_for_tuple!(A: 0, B: 1, C: 2);
impl_inputs_for_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_inputs_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_inputs_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

trait Memo<O>: Send + Sync {
    /// Current output and whether it was recomputed
    fn evaluate(&self) -> (O, bool);
    fn forget(&self);
}

struct Memoized<I: Inputs, O, F> {
    inputs: I,
    combine: F,
    last: Mutex<Option<(I::Values, O)>>,
}

impl<I, O, F> Memo<O> for Memoized<I, O, F>
where
    I: Inputs,
    O: Clone + Send + Sync + 'static,
    F: Fn(&I::Values) -> O + Send + Sync + 'static,
{
    fn evaluate(&self) -> (O, bool) {
        let values = self.inputs.read();
        if let Some((last_values, last_output)) = lock(&self.last).as_ref() {
            if last_values.same_ref(&values) {
                return (last_output.clone(), false);
            }
        }

        let output = (self.combine)(&values);
        *lock(&self.last) = Some((values, output.clone()));
        (output, true)
    }

    fn forget(&self) {
        lock(&self.last).take();
    }
}

/// A memoized node of the graph
pub struct Node<O> {
    name: String,
    memo: Box<dyn Memo<O>>,
    recomputes: AtomicU64,
}

impl<O: Clone + Send + Sync + 'static> Node<O> {
    /// Create a standalone node
    pub fn new<I, F>(name: impl Into<String>, inputs: I, combine: F) -> Self
    where
        I: Inputs,
        F: Fn(&I::Values) -> O + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            memo: Box::new(Memoized {
                inputs,
                combine,
                last: Mutex::new(None),
            }),
            recomputes: AtomicU64::new(0),
        }
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current output, recomputed only if an input changed by reference
    pub fn get(&self) -> O {
        let (output, recomputed) = self.memo.evaluate();
        if recomputed {
            let count = self.recomputes.fetch_add(1, Ordering::Relaxed) + 1;
            trace!("node {} recomputed ({} so far)", self.name, count);
        }
        output
    }

    /// How many times the combine function ran
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    /// Drop the cached output so the next read recomputes
    pub fn invalidate(&self) {
        self.memo.forget();
    }
}

impl<O> std::fmt::Debug for Node<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("recomputes", &self.recomputes.load(Ordering::Relaxed))
            .finish()
    }
}

/// Extension turning a shared node into a selector
pub trait NodeSelector<O> {
    /// Selector reading the node's output
    fn selector(&self) -> Selector<O>;
}

impl<O: Clone + Send + Sync + 'static> NodeSelector<O> for Arc<Node<O>> {
    fn selector(&self) -> Selector<O> {
        let node = Arc::clone(self);
        Selector::new(move || node.get())
    }
}

/// Registry of named nodes
#[derive(Default)]
pub struct Aggregator {
    nodes: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Aggregator {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node computing `combine(inputs)`
    ///
    /// Node names are unique within a graph.
    pub fn add_node<I, O, F>(&self, name: &str, inputs: I, combine: F) -> Result<Arc<Node<O>>>
    where
        I: Inputs,
        O: Clone + Send + Sync + 'static,
        F: Fn(&I::Values) -> O + Send + Sync + 'static,
    {
        let mut nodes = write(&self.nodes);
        if nodes.contains_key(name) {
            return Err(Error::invalid_input(format!(
                "node {} is already defined",
                name
            )));
        }
        let node = Arc::new(Node::new(name, inputs, combine));
        nodes.insert(name.to_string(), node.clone());
        Ok(node)
    }

    /// Look up a node by name and output type
    pub fn node<O: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<Node<O>>> {
        read(&self.nodes)
            .get(name)
            .cloned()
            .and_then(|node| node.downcast::<Node<O>>().ok())
    }

    /// Selector over a named node
    pub fn selector<O: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<Selector<O>> {
        self.node::<O>(name).map(|node| node.selector())
    }

    /// Names of every node
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.nodes).keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("nodes", &self.names())
            .finish()
    }
}
