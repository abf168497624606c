use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use murmur_core::constants::{DEFAULT_FEED_LIMIT, TRENDING_WINDOW_SECS};
use murmur_core::ClearScope;

#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(about = "Local-first nostr client")]
pub struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short, global = true)]
    pub pretty: bool,

    /// Path to JSON config file (relays, dataDir, credentials, timeouts)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory holding the local database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Generate a new keypair (nothing is stored)
    Keygen,

    /// Store a secret key as the session identity
    Login {
        /// nsec, hex, or ncryptsec secret key
        key: String,
        /// Encrypt the stored key (NIP-49); also unlocks an ncryptsec key
        #[arg(long)]
        password: Option<String>,
    },

    /// Recent posts from everyone
    Posts {
        #[arg(long, short, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: usize,
    },

    /// Posts by one author
    Author {
        /// Public key (hex or npub)
        author_id: String,
        #[arg(long, short, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: usize,
    },

    /// Who someone follows (default: you)
    Follows { author_id: Option<String> },

    /// Posts by the authors someone follows (default: you)
    Feed {
        author_id: Option<String>,
        #[arg(long, short, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: usize,
    },

    /// Posts by follows of follows (default: yours)
    SecondDegree {
        author_id: Option<String>,
        #[arg(long, short, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: usize,
    },

    /// Recent posts ranked by reactions
    Trending {
        /// Look-back window in seconds
        #[arg(long, short, default_value_t = TRENDING_WINDOW_SECS)]
        window: u64,
        #[arg(long, short, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: usize,
    },

    /// Show a profile (default: yours)
    Profile { author_id: Option<String> },

    /// Publish your profile metadata. Unset fields keep their current value.
    SetProfile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        about: Option<String>,
        #[arg(long)]
        picture: Option<String>,
    },

    /// Replies to an entity, oldest first
    Replies {
        /// Entity ID (hex or note1)
        entity_id: String,
    },

    /// Reactions to an entity
    Reactions { entity_id: String },

    /// Reposts of an entity
    Reposts { entity_id: String },

    /// Direct-message conversation with a peer
    Messages {
        peer_id: String,
        #[arg(long, short, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: usize,
    },

    /// Publish a text note
    Post { text: String },

    /// Reply to a cached post
    Reply { parent_id: String, text: String },

    /// React to a cached entity
    React {
        target_id: String,
        /// Reaction content, "+" when omitted
        #[arg(long, short)]
        reaction: Option<String>,
    },

    /// Repost a cached entity
    Repost { target_id: String },

    /// Send an encrypted direct message
    Dm { peer_id: String, text: String },

    Follow { author_id: String },

    Unfollow { author_id: String },

    /// Configured relays and their reachability
    Relays,

    /// Erase local data
    ClearCache {
        #[arg(long, short, value_enum, default_value_t = ScopeArg::Cache)]
        scope: ScopeArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeArg {
    Entities,
    Profiles,
    /// Entities and profiles
    Cache,
    /// Cache plus the stored identity
    Everything,
}

impl From<ScopeArg> for ClearScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Entities => ClearScope::Entities,
            ScopeArg::Profiles => ClearScope::Profiles,
            ScopeArg::Cache => ClearScope::Cache,
            ScopeArg::Everything => ClearScope::Everything,
        }
    }
}
