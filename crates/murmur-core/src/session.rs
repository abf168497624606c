use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::{EventId, PublicKey};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::constants::{kinds, PROFILE_STALE_SECS, TRENDING_SAMPLE_SIZE};
use crate::error::FetchError;
use crate::filter::Filter;
use crate::models::{DirectMessage, Draft, Entity, FollowSet, Post, Profile, Reaction, Repost};
use crate::nostr::{Publisher, Signer, SubscriptionSource};
use crate::reconciler::{unix_now, Completeness, FetchOptions, Fetched, Reconciler};
use crate::store::{Cache, ClearScope, LocalStore};

/// A post with the number of reactions it collected in the trending window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendingPost {
    pub post: Post,
    pub reactions: usize,
}

fn normalize_pubkey(value: &str) -> Result<String, FetchError> {
    PublicKey::parse(value.trim())
        .map(|pk| pk.to_hex())
        .map_err(|e| FetchError::invalid_filter(format!("invalid public key {value:?}: {e}")))
}

fn normalize_event_id(value: &str) -> Result<String, FetchError> {
    EventId::parse(value.trim())
        .map(|id| id.to_hex())
        .map_err(|e| FetchError::invalid_filter(format!("invalid entity id {value:?}: {e}")))
}

/// A timeout with nothing to show is an empty answer for lookups whose
/// absence is meaningful (follow lists, one side of a conversation).
fn timeout_as_empty(result: Result<Fetched, FetchError>) -> Result<Fetched, FetchError> {
    match result {
        Err(FetchError::Timeout) => Ok(Fetched {
            items: Vec::new(),
            completeness: Completeness::TimedOut,
        }),
        other => other,
    }
}

/// Per-login façade. Owns the identity, the reconciler over the local cache
/// and the relay source, and the publisher. Dropping it ends the session.
pub struct Session {
    reconciler: Reconciler,
    publisher: Arc<dyn Publisher>,
    signer: Option<Arc<dyn Signer>>,
    fetch_timeout: Duration,
    profile_stale_secs: u64,
}

impl Session {
    /// A read-only session. Publishing needs [`with_signer`](Self::with_signer).
    pub fn new(
        store: Arc<dyn LocalStore>,
        source: Arc<dyn SubscriptionSource>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(Cache::new(store), source),
            publisher,
            signer: None,
            fetch_timeout: FetchOptions::default().timeout,
            profile_stale_secs: PROFILE_STALE_SECS,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_config(mut self, config: &CoreConfig) -> Self {
        self.fetch_timeout = config.fetch_timeout();
        self.profile_stale_secs = config.profile_stale_secs;
        self
    }

    /// Hex public key of the signing identity, if logged in.
    pub fn identity(&self) -> Option<String> {
        self.signer.as_ref().map(|s| s.identity())
    }

    fn signer(&self) -> Result<&Arc<dyn Signer>, FetchError> {
        self.signer.as_ref().ok_or(FetchError::NotAuthenticated)
    }

    fn cache(&self) -> &Cache {
        self.reconciler.cache()
    }

    fn options(&self) -> FetchOptions {
        FetchOptions::default().with_timeout(self.fetch_timeout)
    }

    /// Entity from the local cache only.
    pub fn get_cached(&self, id: &str) -> Option<Entity> {
        self.cache().get(id)
    }

    /// Raw read-through fetch with caller-supplied options.
    pub async fn fetch(&self, filter: &Filter, options: FetchOptions) -> Result<Fetched, FetchError> {
        self.reconciler.fetch(filter, options).await
    }

    // ===== Posts =====

    pub async fn fetch_posts(&self, limit: usize) -> Result<Fetched<Post>, FetchError> {
        let filter = Filter::kind(kinds::TEXT_NOTE).limit(limit);
        let fetched = self.reconciler.fetch(&filter, self.options()).await?;
        Ok(fetched.filter_map(|e| Post::from_entity(&e)))
    }

    pub async fn fetch_posts_by_author(
        &self,
        author_id: &str,
        limit: usize,
    ) -> Result<Fetched<Post>, FetchError> {
        let author_id = normalize_pubkey(author_id)?;
        let filter = Filter::kind(kinds::TEXT_NOTE).author(&author_id).limit(limit);
        let fetched = self.reconciler.fetch(&filter, self.options()).await?;
        Ok(fetched.filter_map(|e| Post::from_entity(&e)))
    }

    // ===== Follow graph =====

    async fn load_follow_set(&self, author_id: &str) -> Result<(FollowSet, Completeness), FetchError> {
        let filter = Filter::kind(kinds::CONTACT_LIST).author(author_id).limit(1);
        let fetched = timeout_as_empty(self.reconciler.fetch(&filter, self.options()).await)?;
        let follows = FollowSet::newest_for(author_id, &fetched.items)
            .unwrap_or_else(|| FollowSet::empty(author_id));
        Ok((follows, fetched.completeness))
    }

    /// The author's follow set. No contact list means an empty set.
    pub async fn fetch_follow_set(&self, author_id: &str) -> Result<FollowSet, FetchError> {
        let author_id = normalize_pubkey(author_id)?;
        let (follows, _) = self.load_follow_set(&author_id).await?;
        Ok(follows)
    }

    /// Posts by the authors `author_id` follows.
    pub async fn fetch_followed_posts(
        &self,
        author_id: &str,
        limit: usize,
    ) -> Result<Fetched<Post>, FetchError> {
        let author_id = normalize_pubkey(author_id)?;
        let (follows, follow_completeness) = self.load_follow_set(&author_id).await?;
        if follows.is_empty() {
            debug!(%author_id, "follow set empty, no posts to fetch");
            return Ok(Fetched {
                items: Vec::new(),
                completeness: follow_completeness,
            });
        }

        let filter = Filter::kind(kinds::TEXT_NOTE)
            .authors(follows.follows.iter())
            .limit(limit);
        debug!(%author_id, follows = follows.len(), "fetching posts from follows");
        let mut posts = self
            .reconciler
            .fetch(&filter, self.options())
            .await?
            .filter_map(|e| Post::from_entity(&e));
        posts.completeness = posts.completeness.min(follow_completeness);
        Ok(posts)
    }

    /// Posts by follows-of-follows, excluding the author and direct follows.
    pub async fn fetch_second_degree_posts(
        &self,
        author_id: &str,
        limit: usize,
    ) -> Result<Fetched<Post>, FetchError> {
        let author_id = normalize_pubkey(author_id)?;
        let (direct, mut completeness) = self.load_follow_set(&author_id).await?;
        if direct.is_empty() {
            return Ok(Fetched {
                items: Vec::new(),
                completeness,
            });
        }

        let lists_filter = Filter::kind(kinds::CONTACT_LIST).authors(direct.follows.iter());
        let lists = timeout_as_empty(self.reconciler.fetch(&lists_filter, self.options()).await)?;
        completeness = completeness.min(lists.completeness);

        let excluded: HashSet<&str> = direct
            .follows
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(author_id.as_str()))
            .collect();
        let mut seen = HashSet::new();
        let mut second_degree = Vec::new();
        for followed in &direct.follows {
            let Some(set) = FollowSet::newest_for(followed, &lists.items) else {
                continue;
            };
            for candidate in set.follows {
                if !excluded.contains(candidate.as_str()) && seen.insert(candidate.clone()) {
                    second_degree.push(candidate);
                }
            }
        }

        if second_degree.is_empty() {
            return Ok(Fetched {
                items: Vec::new(),
                completeness,
            });
        }
        debug!(%author_id, count = second_degree.len(), "second-degree authors");

        let filter = Filter::kind(kinds::TEXT_NOTE).authors(second_degree).limit(limit);
        let mut posts = self
            .reconciler
            .fetch(&filter, self.options())
            .await?
            .filter_map(|e| Post::from_entity(&e));
        posts.completeness = posts.completeness.min(completeness);
        Ok(posts)
    }

    /// Recent posts ranked by reaction count, most reacted first; ties go to
    /// the newer post.
    pub async fn fetch_trending(
        &self,
        window_secs: u64,
        limit: usize,
    ) -> Result<Fetched<TrendingPost>, FetchError> {
        let since = unix_now().saturating_sub(window_secs);
        let posts_filter = Filter::kind(kinds::TEXT_NOTE)
            .since(since)
            .limit(TRENDING_SAMPLE_SIZE.max(limit));
        let posts = self.reconciler.fetch(&posts_filter, self.options()).await?;
        if posts.is_empty() {
            return Ok(Fetched {
                items: Vec::new(),
                completeness: posts.completeness,
            });
        }

        let reactions_filter = Filter::kind(kinds::REACTION)
            .tag_ref("e", posts.items.iter().map(|e| e.id.as_str()))
            .since(since);
        let reactions = timeout_as_empty(self.reconciler.fetch(&reactions_filter, self.options()).await)?;

        // One reaction per reactor per post; dislikes don't count
        let mut reactors: HashMap<String, HashSet<String>> = HashMap::new();
        for reaction in reactions.items.iter().filter_map(Reaction::from_entity) {
            if reaction.is_dislike() {
                continue;
            }
            reactors
                .entry(reaction.target_id)
                .or_default()
                .insert(reaction.author_id);
        }

        let mut ranked: Vec<TrendingPost> = posts
            .items
            .iter()
            .filter_map(Post::from_entity)
            .map(|post| TrendingPost {
                reactions: reactors.get(&post.id).map_or(0, HashSet::len),
                post,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.reactions
                .cmp(&a.reactions)
                .then_with(|| b.post.created_at.cmp(&a.post.created_at))
                .then_with(|| a.post.id.cmp(&b.post.id))
        });
        ranked.truncate(limit);

        Ok(Fetched {
            items: ranked,
            completeness: posts.completeness.min(reactions.completeness),
        })
    }

    // ===== Entity references =====

    pub async fn fetch_reactions(&self, entity_id: &str) -> Result<Fetched<Reaction>, FetchError> {
        let entity_id = normalize_event_id(entity_id)?;
        let filter = Filter::kind(kinds::REACTION).tag_ref("e", [entity_id.as_str()]);
        let fetched = self.reconciler.fetch(&filter, self.options()).await?;
        Ok(fetched.filter_map(|e| Reaction::from_entity(&e).filter(|r| r.target_id == entity_id)))
    }

    pub async fn fetch_reposts(&self, entity_id: &str) -> Result<Fetched<Repost>, FetchError> {
        let entity_id = normalize_event_id(entity_id)?;
        let filter = Filter::kind(kinds::REPOST).tag_ref("e", [entity_id.as_str()]);
        let fetched = self.reconciler.fetch(&filter, self.options()).await?;
        Ok(fetched.filter_map(|e| Repost::from_entity(&e).filter(|r| r.target_id == entity_id)))
    }

    /// Posts whose thread root or parent is `entity_id`, oldest first.
    /// Notes that only mention it are not replies.
    pub async fn fetch_replies(&self, entity_id: &str) -> Result<Fetched<Post>, FetchError> {
        let entity_id = normalize_event_id(entity_id)?;
        let filter = Filter::kind(kinds::TEXT_NOTE).tag_ref("e", [entity_id.as_str()]);
        let fetched = self
            .reconciler
            .fetch(&filter, self.options().oldest_first())
            .await?;
        Ok(fetched.filter_map(|e| {
            Post::from_entity(&e).filter(|p| {
                p.root_id.as_deref() == Some(entity_id.as_str())
                    || p.reply_to.as_deref() == Some(entity_id.as_str())
            })
        }))
    }

    // ===== Profiles =====

    /// Cached profile while fresh; otherwise refreshed from the network,
    /// falling back to the stale copy when the network has nothing.
    pub async fn fetch_profile(&self, author_id: &str) -> Result<Option<Profile>, FetchError> {
        let author_id = normalize_pubkey(author_id)?;
        let cached = self.cache().profile(&author_id);
        if let Some(profile) = &cached {
            if !profile.is_stale(unix_now(), self.profile_stale_secs) {
                return Ok(cached);
            }
        }

        let filter = Filter::kind(kinds::METADATA).author(&author_id).limit(1);
        let fetched = match self.reconciler.fetch(&filter, self.options()).await {
            Ok(fetched) => fetched,
            Err(FetchError::Timeout) => return Ok(cached),
            Err(e) => return Err(e),
        };

        let Some(profile) = Profile::newest(&fetched.items, unix_now()) else {
            return Ok(cached);
        };
        if fetched.is_complete() {
            // Confirmed against the network: refresh last_updated
            self.cache().store_profile(&profile);
        }
        Ok(self.cache().profile(&author_id).or(Some(profile)))
    }

    // ===== Direct messages =====

    /// Conversation with `peer_id` in both directions, oldest first, decrypted.
    /// Messages that fail to decrypt keep `plaintext: None`.
    pub async fn fetch_messages(
        &self,
        peer_id: &str,
        limit: usize,
    ) -> Result<Fetched<DirectMessage>, FetchError> {
        let signer = self.signer()?;
        if peer_id.trim().is_empty() {
            return Err(FetchError::invalid_filter("peer id is empty"));
        }
        let peer_id = normalize_pubkey(peer_id)?;
        let me = signer.identity();

        let sent = Filter::kind(kinds::ENCRYPTED_DIRECT_MESSAGE)
            .author(&me)
            .tag_ref("p", [peer_id.as_str()])
            .limit(limit);
        let received = Filter::kind(kinds::ENCRYPTED_DIRECT_MESSAGE)
            .author(&peer_id)
            .tag_ref("p", [me.as_str()])
            .limit(limit);

        let (sent, received) = tokio::join!(
            self.reconciler.fetch(&sent, self.options()),
            self.reconciler.fetch(&received, self.options()),
        );
        let (sent, received) = match (sent, received) {
            (Err(FetchError::Timeout), Err(FetchError::Timeout)) => return Err(FetchError::Timeout),
            (sent, received) => (timeout_as_empty(sent)?, timeout_as_empty(received)?),
        };
        let completeness = sent.completeness.min(received.completeness);

        let mut entities: Vec<Entity> = sent.items;
        entities.extend(received.items);
        entities.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        entities.dedup_by(|a, b| a.id == b.id);
        entities.truncate(limit);
        entities.reverse();

        let mut messages = Vec::with_capacity(entities.len());
        for entity in &entities {
            let Some(mut message) = DirectMessage::from_entity(entity, &me) else {
                continue;
            };
            if message.peer_id() != peer_id {
                debug!(id = %message.id, "skipping message from another conversation");
                continue;
            }
            match signer.decrypt(message.peer_id(), &message.ciphertext).await {
                Ok(plaintext) => message.plaintext = Some(plaintext),
                Err(e) => warn!(id = %message.id, error = %e, "could not decrypt message"),
            }
            messages.push(message);
        }

        Ok(Fetched {
            items: messages,
            completeness,
        })
    }

    // ===== Publishing =====

    /// Sign, submit, and cache a draft. Fails with `NotAuthenticated` before
    /// any network traffic when there is no signer.
    pub async fn publish(&self, draft: Draft) -> Result<Entity, FetchError> {
        let signer = self.signer()?;
        let created_at = draft.created_at.unwrap_or_else(unix_now);
        let event = signer.sign(&draft, created_at).await?;

        self.publisher
            .submit(&event)
            .await
            .map_err(|e| FetchError::PublishRejected {
                message: e.to_string(),
            })?;

        let entity = Entity::from(&event);
        self.cache().persist(&entity, unix_now());
        info!(id = %entity.id, kind = entity.kind, "published");
        Ok(entity)
    }

    pub async fn post(&self, text: &str) -> Result<Entity, FetchError> {
        self.publish(Draft::post(text)).await
    }

    pub async fn reply(&self, parent: &Post, text: &str) -> Result<Entity, FetchError> {
        self.publish(Draft::reply(parent, text)).await
    }

    pub async fn react(&self, target: &Entity, reaction: Option<&str>) -> Result<Entity, FetchError> {
        self.publish(Draft::reaction(&target.id, &target.author_id, reaction))
            .await
    }

    pub async fn repost(&self, target: &Entity) -> Result<Entity, FetchError> {
        self.publish(Draft::repost(target)).await
    }

    pub async fn send_direct_message(&self, peer_id: &str, text: &str) -> Result<Entity, FetchError> {
        let signer = self.signer()?;
        let peer_id = normalize_pubkey(peer_id)?;
        let ciphertext = signer.encrypt(&peer_id, text).await?;
        self.publish(Draft::direct_message(&peer_id, ciphertext)).await
    }

    pub async fn set_profile(&self, profile: &Profile) -> Result<Entity, FetchError> {
        self.publish(Draft::metadata(profile)).await
    }

    pub async fn follow(&self, author_id: &str) -> Result<FollowSet, FetchError> {
        let target = normalize_pubkey(author_id)?;
        self.update_follows(|current| {
            (!current.contains(&target)).then(|| current.with_follow(&target))
        })
        .await
    }

    pub async fn unfollow(&self, author_id: &str) -> Result<FollowSet, FetchError> {
        let target = normalize_pubkey(author_id)?;
        self.update_follows(|current| {
            current
                .contains(&target)
                .then(|| current.without_follow(&target))
        })
        .await
    }

    /// Read-modify-publish of the identity's contact list. `change` returns
    /// None when there is nothing to do.
    async fn update_follows(
        &self,
        change: impl FnOnce(&FollowSet) -> Option<FollowSet>,
    ) -> Result<FollowSet, FetchError> {
        let me = self.signer()?.identity();
        let (current, completeness) = self.load_follow_set(&me).await?;

        // Publishing over an unseen list would wipe it on the relays
        if current.is_empty() && completeness != Completeness::CaughtUp {
            return Err(FetchError::PublishRejected {
                message: "current follow list could not be confirmed".to_string(),
            });
        }

        let Some(updated) = change(&current) else {
            return Ok(current);
        };
        let entity = self.publish(Draft::contact_list(&updated)).await?;
        Ok(FollowSet::from_entity(&entity).unwrap_or(updated))
    }

    pub fn clear_cache(&self, scope: ClearScope) {
        info!(?scope, "clearing local cache");
        self.cache().clear(scope);
    }
}
