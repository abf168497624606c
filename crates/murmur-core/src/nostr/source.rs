use async_trait::async_trait;
use nostr_sdk::Event;
use tokio::sync::mpsc;

use crate::filter::{Filter, FilterError};
use crate::models::Entity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMessage {
    Entity(Entity),
    /// Everything currently stored has been delivered (EOSE). Later messages
    /// are live updates.
    CaughtUp,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Not connected to any relay")]
    NotConnected,
    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),
    #[error("Subscription failed: {0}")]
    Subscribe(String),
    #[error("Rejected by relays: {0}")]
    Rejected(String),
}

/// Gives matching entities for a filter, then a caught-up signal.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn open(&self, filter: &Filter) -> Result<SubscriptionHandle, SourceError>;
}

/// Submits signed events to the network.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn submit(&self, event: &Event) -> Result<(), SourceError>;
}

type CloseFn = Box<dyn FnOnce() + Send>;

/// An open subscription. Deliveries are read with [`next`](Self::next).
///
/// `close` is idempotent and stops deliveries immediately; dropping the
/// handle closes it.
pub struct SubscriptionHandle {
    label: String,
    rx: mpsc::UnboundedReceiver<SourceMessage>,
    on_close: Option<CloseFn>,
}

impl SubscriptionHandle {
    pub fn new(
        label: impl Into<String>,
        rx: mpsc::UnboundedReceiver<SourceMessage>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            rx,
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Next delivery, or None once closed or the source has gone away.
    pub async fn next(&mut self) -> Option<SourceMessage> {
        if self.is_closed() {
            return None;
        }
        self.rx.recv().await
    }

    pub fn close(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            self.rx.close();
            on_close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.on_close.is_none()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Source and publisher for when no relay is reachable. Fetches degrade to
/// the local cache; publishing is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSource;

#[async_trait]
impl SubscriptionSource for OfflineSource {
    async fn open(&self, _filter: &Filter) -> Result<SubscriptionHandle, SourceError> {
        Err(SourceError::NotConnected)
    }
}

#[async_trait]
impl Publisher for OfflineSource {
    async fn submit(&self, _event: &Event) -> Result<(), SourceError> {
        Err(SourceError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_delivery() {
        let closes = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = closes.clone();
        let mut handle = SubscriptionHandle::new("test", rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(SourceMessage::CaughtUp).unwrap();
        handle.close();
        handle.close();

        assert_eq!(handle.next().await, None, "buffered messages are not delivered after close");
        assert!(tx.send(SourceMessage::CaughtUp).is_err());
        drop(handle);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_closes() {
        let closes = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = closes.clone();
        let handle = SubscriptionHandle::new("test", rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_source_refuses_everything() {
        let filter = Filter::kind(1);
        assert!(matches!(
            OfflineSource.open(&filter).await,
            Err(SourceError::NotConnected)
        ));
    }
}
