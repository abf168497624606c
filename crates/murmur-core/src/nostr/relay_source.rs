use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use nostr_sdk::prelude::{
    Client, Event, RelayMessage, RelayPoolNotification, RelayStatus, RelayUrl, SubscriptionId,
    Timestamp,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::source::{Publisher, SourceError, SourceMessage, SubscriptionHandle, SubscriptionSource};
use crate::constants::{CONNECT_VERIFY_TIMEOUT_MS, PUBLISH_TIMEOUT_SECS};
use crate::filter::Filter;
use crate::models::{Entity, RelayDescriptor};

/// Subscription source and publisher backed by the SDK's relay pool.
#[derive(Clone)]
pub struct RelaySource {
    client: Client,
    relays: Vec<RelayDescriptor>,
}

impl RelaySource {
    /// Add relays per their read/write capability, connect, and wait until
    /// at least one relay reports `Connected`.
    pub async fn connect(relays: &[RelayDescriptor], connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder().build();

        for relay in relays {
            let added = match (relay.can_read, relay.can_write) {
                (true, true) => client.add_relay(relay.url.as_str()).await,
                (true, false) => client.add_read_relay(relay.url.as_str()).await,
                (false, true) => client.add_write_relay(relay.url.as_str()).await,
                (false, false) => continue,
            };
            added.with_context(|| format!("Failed to add relay {}", relay.url))?;
        }

        info!("Starting relay connect...");
        let connect_start = Instant::now();
        if tokio::time::timeout(connect_timeout, client.connect())
            .await
            .is_err()
        {
            warn!("Connect timed out after {:?}", connect_start.elapsed());
            anyhow::bail!("Connection timed out after {:?}", connect_start.elapsed());
        }
        info!("Connect completed in {:?}", connect_start.elapsed());

        // Relay status may transition asynchronously after connect returns
        let verify_start = Instant::now();
        let verify_timeout = Duration::from_millis(CONNECT_VERIFY_TIMEOUT_MS);
        let poll_interval = Duration::from_millis(100);

        loop {
            let connected_count = client
                .relays()
                .await
                .values()
                .filter(|r| r.status() == RelayStatus::Connected)
                .count();

            if connected_count > 0 {
                info!(
                    "Verified {} relay(s) connected after {:?}",
                    connected_count,
                    verify_start.elapsed()
                );
                break;
            }

            if verify_start.elapsed() >= verify_timeout {
                anyhow::bail!(
                    "No relays connected after {:?} verification timeout",
                    verify_timeout
                );
            }

            tokio::time::sleep(poll_interval).await;
        }

        let mut source = Self {
            client,
            relays: relays.to_vec(),
        };
        source.relays = source.relay_status().await;
        Ok(source)
    }

    /// Configured relays with `last_known_reachable` refreshed from the pool.
    pub async fn relay_status(&self) -> Vec<RelayDescriptor> {
        let pool = self.client.relays().await;
        let now = Timestamp::now().as_u64();

        self.relays
            .iter()
            .map(|descriptor| {
                let connected = pool.iter().any(|(url, relay)| {
                    descriptor.same_url(url.as_str()) && relay.status() == RelayStatus::Connected
                });
                let mut descriptor = descriptor.clone();
                if connected {
                    descriptor.last_known_reachable = Some(now);
                }
                descriptor
            })
            .collect()
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
        info!("Disconnected from relays");
    }
}

fn is_subscription(received: &SubscriptionId, ours: &SubscriptionId) -> bool {
    received == ours
}

/// Forward pool notifications for one subscription until the receiver closes.
/// Emits `CaughtUp` once every relay that accepted the REQ has finished, by
/// EOSE or by CLOSED. Forwarding ends when every such relay has closed it.
async fn forward_subscription(
    mut notifications: tokio::sync::broadcast::Receiver<RelayPoolNotification>,
    subscription_id: SubscriptionId,
    expected_eose: usize,
    tx: mpsc::UnboundedSender<SourceMessage>,
) {
    let mut finished: HashSet<RelayUrl> = HashSet::new();
    let mut closed_by: HashSet<RelayUrl> = HashSet::new();
    let mut caught_up = expected_eose == 0;

    if caught_up && tx.send(SourceMessage::CaughtUp).is_err() {
        return;
    }

    loop {
        match notifications.recv().await {
            Ok(RelayPoolNotification::Event {
                relay_url,
                subscription_id: event_sub,
                event,
            }) => {
                if event_sub != subscription_id {
                    continue;
                }
                debug!(kind = event.kind.as_u16(), id = %event.id, %relay_url, "delivered");
                if tx.send(SourceMessage::Entity(Entity::from(&*event))).is_err() {
                    break;
                }
            }
            Ok(RelayPoolNotification::Message { relay_url, message }) => {
                let closed = match &message {
                    RelayMessage::EndOfStoredEvents(sub) if is_subscription(sub, &subscription_id) => {
                        false
                    }
                    RelayMessage::Closed {
                        subscription_id: sub,
                        message: reason,
                    } if is_subscription(sub, &subscription_id) => {
                        warn!(%relay_url, %reason, "relay closed subscription {}", subscription_id);
                        true
                    }
                    _ => continue,
                };

                if closed {
                    closed_by.insert(relay_url.clone());
                }
                finished.insert(relay_url);

                if !caught_up && finished.len() >= expected_eose {
                    caught_up = true;
                    if tx.send(SourceMessage::CaughtUp).is_err() {
                        break;
                    }
                }
                if closed_by.len() >= expected_eose {
                    debug!("every relay closed subscription {}", subscription_id);
                    break;
                }
            }
            Ok(RelayPoolNotification::Shutdown) => {
                debug!("relay pool shut down, ending subscription {}", subscription_id);
                break;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "notification receiver lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl SubscriptionSource for RelaySource {
    async fn open(&self, filter: &Filter) -> Result<SubscriptionHandle, SourceError> {
        let nostr_filter = filter.to_nostr()?;

        // Listen before sending the REQ so no EOSE is missed
        let notifications = self.client.notifications();
        let output = self
            .client
            .subscribe(nostr_filter, None)
            .await
            .map_err(|e| SourceError::Subscribe(e.to_string()))?;

        if output.success.is_empty() && !output.failed.is_empty() {
            return Err(SourceError::NotConnected);
        }

        let subscription_id = output.val.clone();
        let expected_eose = output.success.len();
        debug!(
            "Opened subscription {} on {} relay(s)",
            subscription_id, expected_eose
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward_subscription(
            notifications,
            subscription_id.clone(),
            expected_eose,
            tx,
        ));

        let client = self.client.clone();
        let label = subscription_id.to_string();
        Ok(SubscriptionHandle::new(label, rx, move || {
            task.abort();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    client.unsubscribe(&subscription_id).await;
                });
            }
        }))
    }
}

#[async_trait]
impl Publisher for RelaySource {
    async fn submit(&self, event: &Event) -> Result<(), SourceError> {
        match tokio::time::timeout(
            Duration::from_secs(PUBLISH_TIMEOUT_SECS),
            self.client.send_event(event),
        )
        .await
        {
            Ok(Ok(output)) if !output.success.is_empty() => {
                debug!("Published {} to {} relay(s)", output.id(), output.success.len());
                Ok(())
            }
            Ok(Ok(output)) => {
                let reasons: Vec<String> = output
                    .failed
                    .iter()
                    .map(|(url, reason)| format!("{url}: {reason}"))
                    .collect();
                Err(SourceError::Rejected(if reasons.is_empty() {
                    "no relay accepted the event".to_string()
                } else {
                    reasons.join("; ")
                }))
            }
            Ok(Err(e)) => Err(SourceError::Rejected(e.to_string())),
            Err(_) => Err(SourceError::Rejected(format!(
                "timed out after {}s",
                PUBLISH_TIMEOUT_SECS
            ))),
        }
    }
}
