//! Subscription filter in the relay wire shape
//! `{kinds, authors?, tagRefs?: {tag, values}, limit?, since?}`.

use nostr_sdk::prelude::{Kind, PublicKey, SingleLetterTag, Timestamp};
use serde::{Deserialize, Serialize};

use crate::models::Entity;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid author {author}: {message}")]
    InvalidAuthor { author: String, message: String },
    #[error("tag reference must be a single letter, got {0:?}")]
    InvalidTagName(String),
}

/// Reference to other entities through a single-letter tag (`#e`, `#p`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub tag: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Empty matches any kind
    pub kinds: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_refs: Option<TagRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(kind: u16) -> Self {
        Self {
            kinds: vec![kind],
            ..Self::default()
        }
    }

    pub fn author(self, author_id: &str) -> Self {
        self.authors([author_id.to_string()])
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn tag_ref<I, S>(mut self, tag: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_refs = Some(TagRef {
            tag: tag.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// An explicitly empty author or tag-value list can match nothing.
    /// Such a filter must never reach a relay: omitting the list would turn it
    /// into an unrestricted subscription.
    pub fn is_unsatisfiable(&self) -> bool {
        self.authors.as_ref().is_some_and(|a| a.is_empty())
            || self.tag_refs.as_ref().is_some_and(|t| t.values.is_empty())
            || self.limit == Some(0)
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&entity.kind) {
            return false;
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == entity.author_id) {
                return false;
            }
        }
        if let Some(tag_ref) = &self.tag_refs {
            if !tag_ref
                .values
                .iter()
                .any(|v| entity.has_tag_value(&tag_ref.tag, v))
            {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entity.created_at < since {
                return false;
            }
        }
        true
    }

    /// Convert to the SDK filter. Authors may be hex or npub.
    pub fn to_nostr(&self) -> Result<nostr_sdk::Filter, FilterError> {
        let mut filter = nostr_sdk::Filter::new();
        if !self.kinds.is_empty() {
            filter = filter.kinds(self.kinds.iter().map(|kind| Kind::from(*kind)));
        }

        if let Some(authors) = &self.authors {
            let keys = authors
                .iter()
                .map(|author| {
                    PublicKey::parse(author).map_err(|e| FilterError::InvalidAuthor {
                        author: author.clone(),
                        message: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            filter = filter.authors(keys);
        }

        if let Some(tag_ref) = &self.tag_refs {
            let letter = single_letter(&tag_ref.tag)?;
            for value in &tag_ref.values {
                filter = filter.custom_tag(letter, value.clone());
            }
        }

        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        if let Some(since) = self.since {
            filter = filter.since(Timestamp::from(since));
        }

        Ok(filter)
    }
}

fn single_letter(tag: &str) -> Result<SingleLetterTag, FilterError> {
    let mut chars = tag.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => {
            SingleLetterTag::from_char(c).map_err(|_| FilterError::InvalidTagName(tag.to_string()))
        }
        _ => Err(FilterError::InvalidTagName(tag.to_string())),
    }
}
