use serde::{Deserialize, Serialize};

use super::tag_utils::{find_marked_event, thread_event_refs};
use super::Entity;
use crate::constants::{kinds, DEFAULT_REACTION, DISLIKE_REACTION};

/// A kind:1 text note. Replies carry `reply_to` / `root_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: u64,
    /// Thread root, if this is a reply
    pub root_id: Option<String>,
    /// Direct parent, if this is a reply
    pub reply_to: Option<String>,
    /// Pubkeys mentioned in p-tags
    pub mentions: Vec<String>,
    pub hashtags: Vec<String>,
}

impl Post {
    /// Build from a kind:1 entity using NIP-10 markers, falling back to the
    /// positional convention (first e = root, last e = parent).
    pub fn from_entity(entity: &Entity) -> Option<Self> {
        if entity.kind != kinds::TEXT_NOTE {
            return None;
        }

        let refs = thread_event_refs(&entity.tags);
        let marked_root = find_marked_event(&entity.tags, "root");
        let marked_reply = find_marked_event(&entity.tags, "reply");

        let root_id = marked_root.clone().or_else(|| refs.first().cloned());
        let reply_to = marked_reply
            .or(marked_root)
            .or_else(|| refs.last().cloned());

        Some(Self {
            id: entity.id.clone(),
            author_id: entity.author_id.clone(),
            content: entity.content.clone(),
            created_at: entity.created_at,
            root_id,
            reply_to,
            mentions: entity.tag_values("p"),
            hashtags: entity.tag_values("t"),
        })
    }
}

/// A kind:7 reaction to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub author_id: String,
    /// Reacted-to entity (the last e-tag, per NIP-25)
    pub target_id: String,
    pub target_author: Option<String>,
    pub content: String,
    pub created_at: u64,
}

impl Reaction {
    pub fn from_entity(entity: &Entity) -> Option<Self> {
        if entity.kind != kinds::REACTION {
            return None;
        }

        let target_id = entity.tag_values("e").pop()?;
        let content = if entity.content.is_empty() {
            DEFAULT_REACTION.to_string()
        } else {
            entity.content.clone()
        };

        Some(Self {
            id: entity.id.clone(),
            author_id: entity.author_id.clone(),
            target_id,
            target_author: entity.tag_values("p").pop(),
            content,
            created_at: entity.created_at,
        })
    }

    /// A "-" reaction is a downvote (NIP-25).
    pub fn is_dislike(&self) -> bool {
        self.content == DISLIKE_REACTION
    }
}

/// A kind:6 repost. `reposted` holds the embedded original when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repost {
    pub id: String,
    pub author_id: String,
    pub target_id: String,
    pub created_at: u64,
    pub reposted: Option<Entity>,
}

impl Repost {
    pub fn from_entity(entity: &Entity) -> Option<Self> {
        if entity.kind != kinds::REPOST {
            return None;
        }

        let target_id = entity.first_tag_value("e")?.to_string();
        let reposted = serde_json::from_str::<Entity>(&entity.content)
            .ok()
            .filter(|original| original.id == target_id && original.has_valid_id());

        Some(Self {
            id: entity.id.clone(),
            author_id: entity.author_id.clone(),
            target_id,
            created_at: entity.created_at,
            reposted,
        })
    }
}
