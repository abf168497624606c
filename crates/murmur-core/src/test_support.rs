//! Shared test doubles: signed fixtures, a scripted subscription source, a
//! recording publisher and a store that always fails.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nostr_sdk::prelude::{Event, EventBuilder, Keys, Kind, Tag, Timestamp};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::filter::Filter;
use crate::models::{Entity, Profile};
use crate::nostr::{Publisher, SourceError, SourceMessage, SubscriptionHandle, SubscriptionSource};
use crate::store::{sort_newest_first, ClearScope, LocalStore, StoreError};

/// A real signed entity, so ids verify.
pub fn signed(keys: &Keys, kind: u16, content: &str, created_at: u64, tags: &[&[&str]]) -> Entity {
    let tags: Vec<Tag> = tags
        .iter()
        .map(|parts| Tag::parse(parts.iter().copied()).unwrap())
        .collect();
    let event = EventBuilder::new(Kind::from(kind), content)
        .tags(tags)
        .custom_created_at(Timestamp::from(created_at))
        .sign_with_keys(keys)
        .unwrap();
    Entity::from(&event)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    CaughtUp,
    Silent,
    Offline,
}

/// Relay stand-in. On open it delivers the stored entities that match the
/// filter, then anything queued with `push_on_open` unfiltered, then
/// caught-up (unless silent). Senders are kept so tests can deliver later.
pub struct ScriptedSource {
    mode: Mode,
    stored: Mutex<Vec<Entity>>,
    extra: Mutex<Vec<Entity>>,
    opened: Mutex<Vec<Filter>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<SourceMessage>>>,
    pub closed: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn with_mode(mode: Mode, stored: Vec<Entity>) -> Self {
        Self {
            mode,
            stored: Mutex::new(stored),
            extra: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn caught_up(stored: Vec<Entity>) -> Self {
        Self::with_mode(Mode::CaughtUp, stored)
    }

    pub fn silent() -> Self {
        Self::with_mode(Mode::Silent, Vec::new())
    }

    pub fn offline() -> Self {
        Self::with_mode(Mode::Offline, Vec::new())
    }

    pub fn push_on_open(&self, entities: Vec<Entity>) {
        self.extra.lock().extend(entities);
    }

    pub fn opened(&self) -> Vec<Filter> {
        self.opened.lock().clone()
    }

    /// Send to the most recently opened subscription. False if it is closed.
    pub fn send_to_open(&self, message: SourceMessage) -> bool {
        self.senders
            .lock()
            .last()
            .map(|tx| tx.send(message).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl SubscriptionSource for ScriptedSource {
    async fn open(&self, filter: &Filter) -> Result<SubscriptionHandle, SourceError> {
        if self.mode == Mode::Offline {
            return Err(SourceError::NotConnected);
        }
        self.opened.lock().push(filter.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut matching: Vec<Entity> = self
            .stored
            .lock()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        sort_newest_first(&mut matching);
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        for entity in matching.into_iter().chain(self.extra.lock().drain(..)) {
            let _ = tx.send(SourceMessage::Entity(entity));
        }
        if self.mode == Mode::CaughtUp {
            let _ = tx.send(SourceMessage::CaughtUp);
        }
        self.senders.lock().push(tx);

        let closed = self.closed.clone();
        Ok(SubscriptionHandle::new("scripted", rx, move || {
            closed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    submitted: Mutex<Vec<Event>>,
    reject: AtomicBool,
}

impl RecordingPublisher {
    pub fn rejecting() -> Self {
        let publisher = Self::default();
        publisher.reject.store(true, Ordering::SeqCst);
        publisher
    }

    pub fn submitted(&self) -> Vec<Event> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn submit(&self, event: &Event) -> Result<(), SourceError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SourceError::Rejected("blocked: test relay".to_string()));
        }
        self.submitted.lock().push(event.clone());
        Ok(())
    }
}

/// Every call fails, as a corrupt or unwritable database would.
pub struct FailingStore;

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("disk on fire".to_string()))
}

impl LocalStore for FailingStore {
    fn put(&self, _entity: &Entity) -> Result<(), StoreError> {
        unavailable()
    }

    fn get_by_id(&self, _id: &str) -> Result<Option<Entity>, StoreError> {
        unavailable()
    }

    fn query(&self, _filter: &Filter) -> Result<Vec<Entity>, StoreError> {
        unavailable()
    }

    fn put_profile(&self, _author_id: &str, _profile: &Profile) -> Result<(), StoreError> {
        unavailable()
    }

    fn get_profile(&self, _author_id: &str) -> Result<Option<Profile>, StoreError> {
        unavailable()
    }

    fn put_profile_if_newer(&self, _profile: &Profile) -> Result<bool, StoreError> {
        unavailable()
    }

    fn put_identity(&self, _secret: &str) -> Result<(), StoreError> {
        unavailable()
    }

    fn get_identity(&self) -> Result<Option<String>, StoreError> {
        unavailable()
    }

    fn clear(&self, _scope: ClearScope) -> Result<(), StoreError> {
        unavailable()
    }
}
