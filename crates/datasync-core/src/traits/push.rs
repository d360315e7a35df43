// # Push Subscription Trait
//
// Optional transport delivering server-side change notifications. The core
// subscribes filters once a source is initialized and hands every new
// message to the source's subscription handler.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::traits::Observable;

/// A push notification as delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Event path the notification was published on
    pub event: String,
    /// Raw notification body
    #[serde(default)]
    pub body: serde_json::Value,
}

impl PushMessage {
    /// Create a message without a body
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            body: serde_json::Value::Null,
        }
    }
}

/// Push subscription collaborator
pub trait PushSubscription: Observable + Send + Sync {
    /// Whether the transport is connected and accepting filters
    fn ready(&self) -> bool;

    /// Add event filters to the subscription
    fn subscribe(&self, filters: &[String]);

    /// Remove event filters from the subscription
    fn unsubscribe(&self, _filters: &[String]) {}

    /// Most recent message, if any
    ///
    /// The same message must be returned as the same `Arc` until a new one
    /// arrives; consumers use pointer identity to detect new messages.
    fn message(&self) -> Option<Arc<PushMessage>>;
}
