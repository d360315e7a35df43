//! Call data as delivered by the presence and active-calls endpoints, and
//! the merged records the monitor derives from them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One end of a call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Party {
    /// Party known only by its number
    pub fn number(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: Some(phone_number.into()),
            ..Self::default()
        }
    }
}

/// Reference to the telephony session of a call leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    pub session_id: String,
}

/// A call as reported by detailed presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceCall {
    pub session_id: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub telephony_status: Option<String>,
    #[serde(default)]
    pub from: Option<Party>,
    #[serde(default)]
    pub to: Option<Party>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub inbound_leg: Option<Leg>,
}

impl PresenceCall {
    /// Session id used to find the matching active call
    ///
    /// Prefers the inbound leg's session, which is the one the active-calls
    /// endpoint reports for transferred and forwarded calls.
    pub fn join_key(&self) -> &str {
        self.inbound_leg
            .as_ref()
            .map_or(self.session_id.as_str(), |leg| leg.session_id.as_str())
    }
}

/// A call as reported by the active-calls endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCall {
    pub session_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub from: Option<Party>,
    #[serde(default)]
    pub to: Option<Party>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub result: Option<String>,
}

/// A presence call merged with its active call, numbers normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedCall {
    pub session_id: String,
    pub direction: Option<String>,
    pub telephony_status: Option<String>,
    pub from: Party,
    pub to: Party,
    pub start_time: Option<i64>,
}

/// An entity matched to a number or a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A call as consumed by the UI, with match annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    #[serde(flatten)]
    pub call: NormalizedCall,
    pub from_matches: Vec<Match>,
    pub to_matches: Vec<Match>,
    pub activity_matches: Vec<Match>,
}

/// Lookup results published by a matcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupCache {
    pub data_map: HashMap<String, Vec<Match>>,
}

impl LookupCache {
    /// Matches recorded for a key
    pub fn matches(&self, key: &str) -> &[Match] {
        self.data_map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}
