// # Local Push Channel
//
// Push subscription collaborator fed by the embedding application's
// transport. The channel records subscribed filters and keeps the most
// recent message.

use std::sync::Arc;
use std::sync::Mutex;
use tracing::debug;

use super::lock;
use crate::traits::{ChangeReceiver, ChangeSignal, Observable, PushMessage, PushSubscription};

#[derive(Debug, Default)]
struct ChannelState {
    ready: bool,
    filters: Vec<String>,
    message: Option<Arc<PushMessage>>,
}

/// In-process push subscription
#[derive(Debug, Default)]
pub struct LocalPushChannel {
    state: Mutex<ChannelState>,
    signal: ChangeSignal,
}

impl LocalPushChannel {
    /// Create a channel that is not yet connected
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the transport connected or disconnected
    pub fn set_ready(&self, ready: bool) {
        lock(&self.state).ready = ready;
        self.signal.notify();
    }

    /// Deliver a message
    pub fn publish(&self, message: PushMessage) {
        debug!("push message on {}", message.event);
        lock(&self.state).message = Some(Arc::new(message));
        self.signal.notify();
    }

    /// Filters currently subscribed
    pub fn filters(&self) -> Vec<String> {
        lock(&self.state).filters.clone()
    }
}

impl Observable for LocalPushChannel {
    fn changes(&self) -> ChangeReceiver {
        self.signal.subscribe()
    }
}

impl PushSubscription for LocalPushChannel {
    fn ready(&self) -> bool {
        lock(&self.state).ready
    }

    fn subscribe(&self, filters: &[String]) {
        let mut state = lock(&self.state);
        for filter in filters {
            if !state.filters.contains(filter) {
                state.filters.push(filter.clone());
            }
        }
    }

    fn unsubscribe(&self, filters: &[String]) {
        lock(&self.state).filters.retain(|f| !filters.contains(f));
    }

    fn message(&self) -> Option<Arc<PushMessage>> {
        lock(&self.state).message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_deduplicated_and_removable() {
        let channel = LocalPushChannel::new();
        let filters = vec!["/presence".to_string(), "/calls".to_string()];

        channel.subscribe(&filters);
        channel.subscribe(&filters[..1]);
        assert_eq!(channel.filters(), filters);

        channel.unsubscribe(&filters[..1]);
        assert_eq!(channel.filters(), vec!["/calls".to_string()]);
    }

    #[test]
    fn last_message_keeps_identity() {
        let channel = LocalPushChannel::new();
        channel.publish(PushMessage::new("/presence"));

        let first = channel.message().unwrap();
        let again = channel.message().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
}
