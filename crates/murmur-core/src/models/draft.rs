use serde::{Deserialize, Serialize};

use super::{Entity, FollowSet, Post, Profile};
use crate::constants::{kinds, DEFAULT_REACTION};

/// An unsigned entity waiting for a signer. `created_at` defaults to "now"
/// at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub kind: u16,
    pub content: String,
    pub tags: Vec<Vec<String>>,
    pub created_at: Option<u64>,
}

fn tag(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

impl Draft {
    pub fn new(kind: u16, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tags: Vec::new(),
            created_at: None,
        }
    }

    pub fn tag(mut self, parts: &[&str]) -> Self {
        self.tags.push(tag(parts));
        self
    }

    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn post(text: impl Into<String>) -> Self {
        Self::new(kinds::TEXT_NOTE, text)
    }

    /// NIP-10 marked reply. The parent's root (or the parent itself) is the root.
    pub fn reply(parent: &Post, text: impl Into<String>) -> Self {
        let root = parent.root_id.as_deref().unwrap_or(&parent.id);
        let mut draft = Self::post(text).tag(&["e", root, "", "root"]);
        if root != parent.id {
            draft = draft.tag(&["e", parent.id.as_str(), "", "reply"]);
        }
        draft.tag(&["p", parent.author_id.as_str()])
    }

    pub fn reaction(target_id: &str, target_author: &str, reaction: Option<&str>) -> Self {
        Self::new(kinds::REACTION, reaction.unwrap_or(DEFAULT_REACTION))
            .tag(&["e", target_id])
            .tag(&["p", target_author])
    }

    /// NIP-18 repost embedding the original as content.
    pub fn repost(target: &Entity) -> Self {
        let content = serde_json::to_string(target).unwrap_or_default();
        Self::new(kinds::REPOST, content)
            .tag(&["e", target.id.as_str()])
            .tag(&["p", target.author_id.as_str()])
    }

    pub fn direct_message(recipient_id: &str, ciphertext: impl Into<String>) -> Self {
        Self::new(kinds::ENCRYPTED_DIRECT_MESSAGE, ciphertext).tag(&["p", recipient_id])
    }

    pub fn metadata(profile: &Profile) -> Self {
        Self::new(kinds::METADATA, profile.to_content())
    }

    pub fn contact_list(follows: &FollowSet) -> Self {
        Self {
            tags: follows.to_tags(),
            ..Self::new(kinds::CONTACT_LIST, "")
        }
    }
}
