//! Call monitor
//!
//! The call monitor merges two synchronized sources into the call list
//! shown to the user:
//!
//! - detailed presence: one record per call leg of the extension
//! - active calls: the account's view of the same calls, with start times
//!   and the far party's metadata
//!
//! ```text
//! presence ─────┐
//! activeCalls ──┼──► normalizedCalls ──┬──► calls ◄── contact/activity caches
//! region ───────┘                     └──► uniqueNumbers ──► contact matcher
//! presence ──────────────────────────────► sessionIds ────► activity matcher
//! ```
//!
//! Matchers are re-triggered through a [`ChangeFanOut`] only when the
//! memoized query lists change.

pub mod matcher;
pub mod model;
pub mod normalize;
pub mod region;

pub use matcher::{LocalMatcher, Matcher, QuerySource};
pub use model::{ActiveCall, CallRecord, Leg, LookupCache, Match, NormalizedCall, Party, PresenceCall};
pub use normalize::normalize_number;
pub use region::{LocalRegion, RegionSettings};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::aggregate::{Aggregator, ChangeFanOut, Node, NodeSelector, Selector};
use crate::config::SourceConfig;
use crate::error::Result;
use crate::source::{
    ChangeSet, DataSource, DataSourceBuilder, ModuleState, ModuleStatus, SubscriptionBridge,
};
use crate::traits::{ActionKind, Store};

/// Name of the active-calls source
pub const ACTIVE_CALLS_NAME: &str = "activeCalls";

/// Active calls expire after five minutes
pub const ACTIVE_CALLS_TTL: Duration = Duration::from_secs(5 * 60);

/// Push filter delivering detailed presence
pub const DETAILED_PRESENCE_FILTER: &str =
    "/account/~/extension/~/presence?detailedTelephonyState=true";

/// Event paths that invalidate the active-calls list
pub const DETAILED_PRESENCE_EVENT: &str = r"/presence\?detailedTelephonyState=true$";

/// Builder for the active-calls source
///
/// Preconfigured with its name, TTL, push filter and a
/// [`SubscriptionBridge`] refetching on detailed presence events. The
/// caller still supplies the fetch function and collaborators.
pub fn active_calls_source() -> Result<DataSourceBuilder<Vec<ActiveCall>>> {
    let config = SourceConfig::new(ACTIVE_CALLS_NAME)
        .with_ttl(ACTIVE_CALLS_TTL)
        .with_subscription_filters([DETAILED_PRESENCE_FILTER]);
    let bridge = SubscriptionBridge::new(DETAILED_PRESENCE_EVENT)?;
    Ok(DataSource::builder(config).handler(bridge))
}

type Calls<T> = Option<Arc<Vec<T>>>;

/// Collaborators of a call monitor
pub struct CallMonitorParts {
    pub presence: Arc<DataSource<Vec<PresenceCall>>>,
    pub active_calls: Arc<DataSource<Vec<ActiveCall>>>,
    pub region: Arc<dyn RegionSettings>,
    pub store: Arc<dyn Store>,
    pub contact_matcher: Option<Arc<dyn Matcher>>,
    pub activity_matcher: Option<Arc<dyn Matcher>>,
}

/// Merges presence and active calls into match-annotated call records
pub struct CallMonitor {
    module: Arc<ModuleState>,
    presence: Arc<DataSource<Vec<PresenceCall>>>,
    active_calls: Arc<DataSource<Vec<ActiveCall>>>,
    region: Arc<dyn RegionSettings>,
    store: Arc<dyn Store>,
    contact_matcher: Option<Arc<dyn Matcher>>,
    activity_matcher: Option<Arc<dyn Matcher>>,
    aggregator: Aggregator,
    calls: Arc<Node<Arc<Vec<CallRecord>>>>,
    unique_numbers: Arc<Node<Arc<Vec<String>>>>,
    session_ids: Arc<Node<Arc<Vec<String>>>>,
    numbers_fan_out: ChangeFanOut<Arc<Vec<String>>>,
    sessions_fan_out: ChangeFanOut<Arc<Vec<String>>>,
}

impl CallMonitor {
    /// Build the selector graph and register query sources with matchers
    pub fn new(parts: CallMonitorParts) -> Result<Self> {
        let CallMonitorParts {
            presence,
            active_calls,
            region,
            store,
            contact_matcher,
            activity_matcher,
        } = parts;
        let aggregator = Aggregator::new();

        let presence_calls: Selector<Calls<PresenceCall>> = {
            let presence = presence.clone();
            Selector::new(move || presence.data())
        };
        let active: Selector<Calls<ActiveCall>> = {
            let active_calls = active_calls.clone();
            Selector::new(move || active_calls.data())
        };
        let country_code = {
            let region = region.clone();
            Selector::new(move || region.country_code())
        };
        let area_code = {
            let region = region.clone();
            Selector::new(move || region.area_code())
        };

        let normalized_calls = aggregator.add_node(
            "normalizedCalls",
            (presence_calls.clone(), active, country_code, area_code),
            |(presence, active, country, area): &(
                Calls<PresenceCall>,
                Calls<ActiveCall>,
                String,
                String,
            )| {
                Arc::new(merge_calls(
                    presence.as_deref().map(Vec::as_slice).unwrap_or_default(),
                    active.as_deref().map(Vec::as_slice).unwrap_or_default(),
                    country,
                    area,
                ))
            },
        )?;

        let calls = aggregator.add_node(
            "calls",
            (
                normalized_calls.selector(),
                cache_selector(contact_matcher.clone()),
                cache_selector(activity_matcher.clone()),
            ),
            |(calls, contacts, activities): &(
                Arc<Vec<NormalizedCall>>,
                Option<Arc<LookupCache>>,
                Option<Arc<LookupCache>>,
            )| {
                Arc::new(annotate_calls(calls, contacts.as_deref(), activities.as_deref()))
            },
        )?;

        let unique_numbers = aggregator.add_node(
            "uniqueNumbers",
            normalized_calls.selector(),
            |calls: &Arc<Vec<NormalizedCall>>| Arc::new(unique_numbers(calls)),
        )?;

        let session_ids = aggregator.add_node(
            "sessionIds",
            presence_calls,
            |calls: &Calls<PresenceCall>| {
                Arc::new(
                    calls
                        .iter()
                        .flat_map(|calls| calls.iter())
                        .map(|call| call.session_id.clone())
                        .collect::<Vec<_>>(),
                )
            },
        )?;

        if let Some(matcher) = &contact_matcher {
            let presence = presence.clone();
            let active_calls = active_calls.clone();
            let region = region.clone();
            matcher.add_query_source(QuerySource::new(unique_numbers.selector(), move || {
                active_calls.ready() && presence.ready() && region.ready()
            }));
        }
        if let Some(matcher) = &activity_matcher {
            let presence = presence.clone();
            matcher.add_query_source(QuerySource::new(session_ids.selector(), move || {
                presence.ready()
            }));
        }

        let numbers_fan_out = ChangeFanOut::new("uniqueNumbers", trigger_when_ready(contact_matcher.clone()));
        let sessions_fan_out = ChangeFanOut::new("sessionIds", trigger_when_ready(activity_matcher.clone()));

        Ok(Self {
            module: Arc::new(ModuleState::new("callMonitor", store.clone())),
            presence,
            active_calls,
            region,
            store,
            contact_matcher,
            activity_matcher,
            aggregator,
            calls,
            unique_numbers,
            session_ids,
            numbers_fan_out,
            sessions_fan_out,
        })
    }

    /// Lifecycle status
    pub fn status(&self) -> ModuleStatus {
        self.module.status()
    }

    /// Whether the monitor is ready
    pub fn ready(&self) -> bool {
        self.module.ready()
    }

    /// Merged, annotated calls sorted by start time
    pub fn calls(&self) -> Arc<Vec<CallRecord>> {
        self.calls.get()
    }

    /// Every distinct normalized number in the current calls
    pub fn unique_numbers(&self) -> Arc<Vec<String>> {
        self.unique_numbers.get()
    }

    /// Session ids of the current presence calls
    pub fn session_ids(&self) -> Arc<Vec<String>> {
        self.session_ids.get()
    }

    /// The selector graph
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    fn dependencies_ready(&self) -> bool {
        self.presence.ready()
            && self.active_calls.ready()
            && self.region.ready()
            && self.contact_matcher.as_ref().is_none_or(|m| m.ready())
            && self.activity_matcher.as_ref().is_none_or(|m| m.ready())
    }

    /// Evaluate the lifecycle and fan out query changes
    pub fn on_state_change(&self) {
        let status = self.module.status();
        let ready = self.dependencies_ready();

        if status == ModuleStatus::Pending && ready {
            self.module.dispatch(ActionKind::Init);
            self.module.dispatch(ActionKind::InitSuccess);
            info!("callMonitor: ready");
        } else if status == ModuleStatus::Ready && !ready {
            self.module.dispatch(ActionKind::Reset);
            self.module.dispatch(ActionKind::ResetSuccess);
            info!("callMonitor: dependency lost, reset");
        } else if status == ModuleStatus::Ready {
            self.numbers_fan_out.on_recompute(&self.unique_numbers.get());
            self.sessions_fan_out.on_recompute(&self.session_ids.get());
        }
    }

    fn change_set(&self) -> ChangeSet {
        let mut changes = ChangeSet::new(vec![self.store.changes(), self.region.changes()]);
        for matcher in [&self.contact_matcher, &self.activity_matcher].into_iter().flatten() {
            changes.push(matcher.changes());
        }
        changes
    }

    /// Re-evaluate on every change until shutdown (or SIGINT when `None`)
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let mut changes = self.change_set();
        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        };
        tokio::pin!(shutdown);

        self.on_state_change();
        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if !changed {
                        break;
                    }
                    self.on_state_change();
                }

                _ = &mut shutdown => {
                    debug!("callMonitor: shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CallMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallMonitor")
            .field("module", &self.module)
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}

fn cache_selector(matcher: Option<Arc<dyn Matcher>>) -> Selector<Option<Arc<LookupCache>>> {
    Selector::new(move || {
        matcher
            .as_ref()
            .filter(|matcher| matcher.ready())
            .and_then(|matcher| matcher.cache())
    })
}

fn trigger_when_ready(
    matcher: Option<Arc<dyn Matcher>>,
) -> impl Fn(&Arc<Vec<String>>) + Send + Sync + 'static {
    move |_: &Arc<Vec<String>>| {
        if let Some(matcher) = matcher.as_ref().filter(|matcher| matcher.ready()) {
            matcher.trigger_match();
        }
    }
}

/// Join presence calls to active calls and normalize both ends
///
/// The active call is recorded from the far end, so the merged `from`
/// takes its `to` metadata and the merged `to` takes its `from`.
pub fn merge_calls(
    presence: &[PresenceCall],
    active: &[ActiveCall],
    country_code: &str,
    area_code: &str,
) -> Vec<NormalizedCall> {
    let by_session: HashMap<&str, &ActiveCall> = active
        .iter()
        .map(|call| (call.session_id.as_str(), call))
        .collect();
    let normalize = |party: &Option<Party>| {
        party
            .as_ref()
            .and_then(|party| party.phone_number.as_deref())
            .map(|number| normalize_number(number, country_code, area_code))
    };

    presence
        .iter()
        .map(|call| {
            let active_call = by_session.get(call.join_key()).copied();
            let from = Party {
                phone_number: normalize(&call.from),
                ..active_call.and_then(|a| a.to.clone()).unwrap_or_default()
            };
            let to = Party {
                phone_number: normalize(&call.to),
                ..active_call.and_then(|a| a.from.clone()).unwrap_or_default()
            };
            NormalizedCall {
                session_id: call.session_id.clone(),
                direction: call.direction.clone(),
                telephony_status: call.telephony_status.clone(),
                from,
                to,
                start_time: active_call.and_then(|a| a.start_time).or(call.start_time),
            }
        })
        .collect()
}

/// Attach match annotations and sort by start time ascending
pub fn annotate_calls(
    calls: &[NormalizedCall],
    contacts: Option<&LookupCache>,
    activities: Option<&LookupCache>,
) -> Vec<CallRecord> {
    let lookup = |cache: Option<&LookupCache>, key: Option<&str>| -> Vec<_> {
        match (cache, key) {
            (Some(cache), Some(key)) => cache.matches(key).to_vec(),
            _ => Vec::new(),
        }
    };

    let mut records: Vec<CallRecord> = calls
        .iter()
        .map(|call| CallRecord {
            from_matches: lookup(contacts, call.from.phone_number.as_deref()),
            to_matches: lookup(contacts, call.to.phone_number.as_deref()),
            activity_matches: lookup(activities, Some(call.session_id.as_str())),
            call: call.clone(),
        })
        .collect();
    records.sort_by_key(|record| record.call.start_time);
    records
}

/// Distinct numbers of both ends, in first-seen order
pub fn unique_numbers(calls: &[NormalizedCall]) -> Vec<String> {
    let mut seen = HashSet::new();
    calls
        .iter()
        .flat_map(|call| [&call.from.phone_number, &call.to.phone_number])
        .filter_map(|number| number.as_ref())
        .filter(|number| !number.is_empty() && seen.insert(number.as_str()))
        .cloned()
        .collect()
}
