//! Matcher seam
//!
//! Contact and activity matchers resolve numbers and session ids to
//! entities. They are external to the core: the call monitor only
//! registers its query sources, reads the published cache, and pokes
//! `trigger_match` when its queries change.

use std::sync::{Arc, Mutex};
use tracing::debug;

use super::model::LookupCache;
use crate::aggregate::Selector;
use crate::state::lock;
use crate::traits::{ChangeReceiver, ChangeSignal, Observable};

/// Where a matcher gets its queries from
#[derive(Clone)]
pub struct QuerySource {
    /// Current queries
    pub queries: Selector<Arc<Vec<String>>>,
    /// Whether the queries are meaningful yet
    pub ready_check: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl QuerySource {
    /// Create a query source
    pub fn new(
        queries: Selector<Arc<Vec<String>>>,
        ready_check: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            queries,
            ready_check: Arc::new(ready_check),
        }
    }

    /// Queries, if the source is ready
    pub fn ready_queries(&self) -> Option<Arc<Vec<String>>> {
        (self.ready_check)().then(|| self.queries.get())
    }
}

impl std::fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySource").finish_non_exhaustive()
    }
}

/// Contact or activity matcher
pub trait Matcher: Observable + Send + Sync {
    /// Whether the matcher can serve lookups
    fn ready(&self) -> bool;

    /// Published lookup results
    fn cache(&self) -> Option<Arc<LookupCache>>;

    /// Re-run matching for every ready query source
    fn trigger_match(&self);

    /// Register a query source
    fn add_query_source(&self, source: QuerySource);
}

#[derive(Default)]
struct MatcherState {
    ready: bool,
    cache: Option<Arc<LookupCache>>,
    sources: Vec<QuerySource>,
    last_queries: Vec<String>,
    triggered: usize,
}

/// In-process matcher recording what it was asked to match
///
/// Lookups are answered by the cache installed with [`set_cache`].
///
/// [`set_cache`]: LocalMatcher::set_cache
#[derive(Clone, Default)]
pub struct LocalMatcher {
    name: Arc<str>,
    state: Arc<Mutex<MatcherState>>,
    signal: Arc<ChangeSignal>,
}

impl LocalMatcher {
    /// Create a ready matcher with an empty cache
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let matcher = Self {
            name: name.into(),
            ..Self::default()
        };
        {
            let mut state = lock(&matcher.state);
            state.ready = true;
            state.cache = Some(Arc::new(LookupCache::default()));
        }
        matcher
    }

    /// Mark the matcher ready or not
    pub fn set_ready(&self, ready: bool) {
        lock(&self.state).ready = ready;
        self.signal.notify();
    }

    /// Publish new lookup results
    pub fn set_cache(&self, cache: LookupCache) {
        lock(&self.state).cache = Some(Arc::new(cache));
        self.signal.notify();
    }

    /// How many times matching was triggered
    pub fn trigger_count(&self) -> usize {
        lock(&self.state).triggered
    }

    /// Queries collected by the last trigger
    pub fn last_queries(&self) -> Vec<String> {
        lock(&self.state).last_queries.clone()
    }

    /// Number of registered query sources
    pub fn source_count(&self) -> usize {
        lock(&self.state).sources.len()
    }
}

impl Observable for LocalMatcher {
    fn changes(&self) -> ChangeReceiver {
        self.signal.subscribe()
    }
}

impl Matcher for LocalMatcher {
    fn ready(&self) -> bool {
        lock(&self.state).ready
    }

    fn cache(&self) -> Option<Arc<LookupCache>> {
        lock(&self.state).cache.clone()
    }

    fn trigger_match(&self) {
        // Selectors may read other locks; collect them first.
        let sources = lock(&self.state).sources.clone();
        let mut queries: Vec<String> = Vec::new();
        for source in &sources {
            if let Some(found) = source.ready_queries() {
                for query in found.iter() {
                    if !queries.contains(query) {
                        queries.push(query.clone());
                    }
                }
            }
        }

        debug!("{}: matching {} queries", self.name, queries.len());
        let mut state = lock(&self.state);
        state.triggered += 1;
        state.last_queries = queries;
    }

    fn add_query_source(&self, source: QuerySource) {
        lock(&self.state).sources.push(source);
    }
}

impl std::fmt::Debug for LocalMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMatcher")
            .field("name", &self.name)
            .field("triggered", &self.trigger_count())
            .finish()
    }
}
