//! Read-through merge of the local cache and a network subscription.
//!
//! Every fetch takes a cache snapshot, opens a subscription for the same
//! filter, writes each delivery through to the cache, and stops waiting at
//! caught-up, timeout or cancellation. The merged result is de-duplicated by
//! id, sorted, and truncated. The subscription is closed on every exit path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::Timestamp;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::constants::DEFAULT_FETCH_TIMEOUT_MS;
use crate::error::FetchError;
use crate::filter::Filter;
use crate::models::Entity;
use crate::nostr::{SourceMessage, SubscriptionHandle, SubscriptionSource};
use crate::store::{sort_newest_first, Cache};

pub(crate) fn unix_now() -> u64 {
    Timestamp::now().as_u64()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    /// Chronological, e.g. a message thread
    OldestFirst,
}

/// How far the network side got before the fetch returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Completeness {
    /// The source signalled it delivered everything it had stored
    CaughtUp,
    /// The timeout fired first; the result is partial
    TimedOut,
    /// The source could not be opened or went away; the result is cache only
    Offline,
}

impl Completeness {
    /// The weaker of two completeness levels.
    pub fn min(self, other: Self) -> Self {
        match (self, other) {
            (Self::Offline, _) | (_, Self::Offline) => Self::Offline,
            (Self::TimedOut, _) | (_, Self::TimedOut) => Self::TimedOut,
            _ => Self::CaughtUp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub order: SortOrder,
    /// Set to `true` to abandon the fetch
    pub cancel: Option<watch::Receiver<bool>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            order: SortOrder::NewestFirst,
            cancel: None,
        }
    }
}

impl FetchOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = SortOrder::OldestFirst;
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A fetch result plus how complete it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fetched<T = Entity> {
    pub items: Vec<T>,
    pub completeness: Completeness,
}

impl<T> Fetched<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            completeness: Completeness::CaughtUp,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::CaughtUp
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Map items, dropping those the mapper rejects.
    pub fn filter_map<U>(self, f: impl FnMut(T) -> Option<U>) -> Fetched<U> {
        Fetched {
            items: self.items.into_iter().filter_map(f).collect(),
            completeness: self.completeness,
        }
    }
}

async fn wait_cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without cancelling: never fires
            return std::future::pending().await;
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    cache: Cache,
    source: Arc<dyn SubscriptionSource>,
}

impl Reconciler {
    pub fn new(cache: Cache, source: Arc<dyn SubscriptionSource>) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub async fn fetch(
        &self,
        filter: &Filter,
        options: FetchOptions,
    ) -> Result<Fetched, FetchError> {
        if filter.is_unsatisfiable() {
            debug!(?filter, "filter matches nothing, skipping subscription");
            return Ok(Fetched::empty());
        }

        let snapshot = self.cache.snapshot(filter);

        let (network, completeness) = match self.source.open(filter).await {
            Ok(handle) => self.drain(handle, filter, &options).await?,
            Err(e) => {
                warn!(error = %e, "subscription unavailable, serving cache only");
                (HashMap::new(), Completeness::Offline)
            }
        };

        debug!(
            cached = snapshot.len(),
            received = network.len(),
            ?completeness,
            "fetch settled"
        );

        let items = merge(snapshot, network, filter.limit, options.order);
        if items.is_empty() && completeness == Completeness::TimedOut {
            return Err(FetchError::Timeout);
        }

        Ok(Fetched {
            items,
            completeness,
        })
    }

    /// Collect deliveries until caught-up, timeout, or cancellation.
    async fn drain(
        &self,
        mut handle: SubscriptionHandle,
        filter: &Filter,
        options: &FetchOptions,
    ) -> Result<(HashMap<String, Entity>, Completeness), FetchError> {
        let mut accumulated: HashMap<String, Entity> = HashMap::new();
        let mut cancel = options.cancel.clone();
        let deadline = tokio::time::sleep(options.timeout);
        tokio::pin!(deadline);

        let completeness = loop {
            tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancel) => {
                    handle.close();
                    debug!(subscription = handle.label(), "fetch cancelled");
                    return Err(FetchError::Cancelled);
                }
                _ = &mut deadline => {
                    warn!(subscription = handle.label(), timeout = ?options.timeout, "timed out waiting for relays");
                    break Completeness::TimedOut;
                }
                message = handle.next() => match message {
                    Some(SourceMessage::Entity(entity)) => self.accept(entity, filter, &mut accumulated),
                    Some(SourceMessage::CaughtUp) => break Completeness::CaughtUp,
                    None => break Completeness::Offline,
                },
            }
        };

        handle.close();
        Ok((accumulated, completeness))
    }

    fn accept(&self, entity: Entity, filter: &Filter, accumulated: &mut HashMap<String, Entity>) {
        if accumulated.contains_key(&entity.id) {
            return;
        }
        if !entity.has_valid_id() {
            warn!(id = %entity.id, "dropping entity whose id does not match its content");
            return;
        }
        if i64::try_from(entity.created_at).is_err() {
            warn!(id = %entity.id, created_at = entity.created_at, "dropping entity with an unrepresentable timestamp");
            return;
        }
        if !filter.matches(&entity) {
            debug!(id = %entity.id, kind = entity.kind, "dropping entity outside the filter");
            return;
        }

        self.cache.persist(&entity, unix_now());
        accumulated.insert(entity.id.clone(), entity);
    }
}

/// Union by id, sort, truncate. Truncation keeps the newest entities; with
/// `OldestFirst` those are then presented chronologically.
fn merge(
    snapshot: Vec<Entity>,
    network: HashMap<String, Entity>,
    limit: Option<usize>,
    order: SortOrder,
) -> Vec<Entity> {
    let mut merged: HashMap<String, Entity> =
        snapshot.into_iter().map(|e| (e.id.clone(), e)).collect();
    merged.extend(network);

    let mut entities: Vec<Entity> = merged.into_values().collect();
    sort_newest_first(&mut entities);
    if let Some(limit) = limit {
        entities.truncate(limit);
    }
    if order == SortOrder::OldestFirst {
        entities.reverse();
    }
    entities
}
