//! Push-driven refresh
//!
//! A [`SubscriptionHandler`] receives every new push message once its
//! source is ready. [`SubscriptionBridge`] is the stock handler: it filters
//! messages by event path, waits out a short debounce, and refetches unless
//! the owner changed (or the source was reset) in the meantime.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::scheduler::{FetchOutcome, FetchScheduler};
use crate::error::{Error, Result};
use crate::traits::PushMessage;

/// Debounce between a matching message and the refetch it triggers
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Reacts to push messages delivered to a ready source
#[async_trait]
pub trait SubscriptionHandler<T>: Send + Sync {
    /// Handle one new message
    async fn handle(&self, message: Arc<PushMessage>, scheduler: FetchScheduler<T>);
}

/// Handler refetching on messages whose event path matches a pattern
#[derive(Debug, Clone)]
pub struct SubscriptionBridge {
    pattern: Regex,
    debounce: Duration,
}

impl SubscriptionBridge {
    /// Create a bridge for an event path pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            Error::config(format!("invalid subscription pattern {:?}: {}", pattern, e))
        })?;
        Ok(Self {
            pattern,
            debounce: DEFAULT_DEBOUNCE,
        })
    }

    /// Override the debounce delay
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Debounce delay
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Whether a message should trigger a refetch
    pub fn matches(&self, message: &PushMessage) -> bool {
        self.pattern.is_match(&message.event)
    }

    /// Wait out the debounce, then refetch if the fence still holds
    ///
    /// Returns `None` when the refetch was abandoned.
    pub async fn refresh<T>(&self, scheduler: &FetchScheduler<T>) -> Option<Result<FetchOutcome<T>>>
    where
        T: Send + Sync + 'static,
    {
        let fence = scheduler.fence();
        tokio::time::sleep(self.debounce).await;

        if !scheduler.is_current(&fence) {
            debug!(
                "{}: push refresh abandoned, fence moved from {} to {}",
                scheduler.name(),
                fence,
                scheduler.fence()
            );
            return None;
        }
        Some(scheduler.fetch_data().await)
    }
}

#[async_trait]
impl<T> SubscriptionHandler<T> for SubscriptionBridge
where
    T: Send + Sync + 'static,
{
    async fn handle(&self, message: Arc<PushMessage>, scheduler: FetchScheduler<T>) {
        if !self.matches(&message) {
            trace!("{}: ignoring push event {}", scheduler.name(), message.event);
            return;
        }
        debug!("{}: push event {} triggers refresh", scheduler.name(), message.event);

        // Failures are already recorded and rescheduled by the scheduler.
        if let Some(Err(e)) = self.refresh(&scheduler).await {
            debug!("{}: push refresh failed: {}", scheduler.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_detailed_presence_events() {
        let bridge = SubscriptionBridge::new(r"/presence\?detailedTelephonyState=true$").unwrap();
        assert!(bridge.matches(&PushMessage::new(
            "/restapi/v1.0/account/1/extension/2/presence?detailedTelephonyState=true"
        )));
        assert!(!bridge.matches(&PushMessage::new(
            "/restapi/v1.0/account/1/extension/2/message-store"
        )));
        assert_eq!(bridge.debounce(), Duration::from_millis(1000));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = SubscriptionBridge::new("(unclosed").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
