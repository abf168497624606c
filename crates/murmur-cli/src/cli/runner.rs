use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use murmur_core::models::{Entity, Post, Profile};
use murmur_core::nostr::{
    credentials_need_password, generate_keys, get_current_pubkey, has_stored_credentials,
    load_stored_keys, login_with_secret, parse_secret, KeysSigner, OfflineSource, Publisher,
    RelaySource, SubscriptionSource,
};
use murmur_core::store::{LocalStore, SqliteStore};
use murmur_core::{ClearScope, CoreConfig, Session};
use nostr_sdk::prelude::{EventId, Keys, ToBech32};
use serde_json::json;
use tracing::{info, warn};

use super::args::{Cli, Commands};
use super::output::print_json;

const PASSWORD_ENV: &str = "MURMUR_PASSWORD";

/// Config from `path` (or defaults), with the data directory overridden when given.
pub fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<CoreConfig> {
    let mut config = match path {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    Ok(config)
}

/// Keys from config credentials first, then the stored identity. A stored
/// ncryptsec is unlocked with `MURMUR_PASSWORD`.
fn resolve_keys(config: &CoreConfig, store: &dyn LocalStore) -> Result<Option<Keys>> {
    if let Some(credentials) = &config.credentials {
        let keys = parse_secret(&credentials.key, credentials.password.as_deref())
            .context("Failed to parse credentials from config")?;
        return Ok(Some(keys));
    }

    if !has_stored_credentials(store) {
        return Ok(None);
    }

    let password = std::env::var(PASSWORD_ENV).ok();
    if credentials_need_password(store) && password.is_none() {
        anyhow::bail!("Stored key is encrypted; set {} to unlock it", PASSWORD_ENV);
    }
    load_stored_keys(store, password.as_deref()).map(Some)
}

/// Connect to the configured relays, or None to run from the cache alone.
async fn connect_relays(config: &CoreConfig) -> Option<RelaySource> {
    match RelaySource::connect(&config.relays, config.connect_timeout()).await {
        Ok(source) => Some(source),
        Err(e) => {
            warn!("Relays unreachable, serving local cache only: {:#}", e);
            None
        }
    }
}

fn cached_entity(session: &Session, id: &str) -> Result<Entity> {
    let id = EventId::parse(id)
        .with_context(|| format!("Invalid entity id: {}", id))?
        .to_hex();
    session
        .get_cached(&id)
        .ok_or_else(|| anyhow!("Entity {} is not in the local cache; fetch it first", id))
}

fn self_or(session: &Session, author_id: Option<String>) -> Result<String> {
    author_id
        .or_else(|| session.identity())
        .ok_or_else(|| anyhow!("No author given and not logged in"))
}

/// Profile output with the name a reader would see alongside it.
fn profile_view(profile: Option<&Profile>) -> serde_json::Value {
    match profile {
        Some(profile) => json!({ "name": profile.best_name(), "profile": profile }),
        None => serde_json::Value::Null,
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let pretty = cli.pretty;

    if cli.command == Commands::Keygen {
        let keys = generate_keys();
        return print_json(
            &json!({
                "pubkey": get_current_pubkey(&keys),
                "npub": keys.public_key().to_bech32()?,
                "nsec": keys.secret_key().to_bech32()?,
            }),
            pretty,
        );
    }

    let config = load_config(cli.config.as_deref(), cli.data_dir)?;
    let db_path = config.database_path();
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?,
    );

    match cli.command {
        Commands::Login { key, password } => {
            let keys = login_with_secret(&key, password.as_deref(), store.as_ref())?;
            info!("Stored identity {}", keys.public_key());
            return print_json(
                &json!({
                    "pubkey": get_current_pubkey(&keys),
                    "encrypted": credentials_need_password(store.as_ref()),
                }),
                pretty,
            );
        }
        Commands::ClearCache { scope } => {
            let scope = ClearScope::from(scope);
            Session::new(store, Arc::new(OfflineSource), Arc::new(OfflineSource)).clear_cache(scope);
            return print_json(&json!({ "cleared": format!("{:?}", scope) }), pretty);
        }
        _ => {}
    }

    let keys = resolve_keys(&config, store.as_ref())?;
    let relays = connect_relays(&config).await;

    if cli.command == Commands::Relays {
        let status = match &relays {
            Some(source) => source.relay_status().await,
            None => config.relays.clone(),
        };
        if let Some(source) = &relays {
            source.disconnect().await;
        }
        return print_json(&status, pretty);
    }

    let (source, publisher) = match &relays {
        Some(relay) => (
            Arc::new(relay.clone()) as Arc<dyn SubscriptionSource>,
            Arc::new(relay.clone()) as Arc<dyn Publisher>,
        ),
        None => (
            Arc::new(OfflineSource) as Arc<dyn SubscriptionSource>,
            Arc::new(OfflineSource) as Arc<dyn Publisher>,
        ),
    };
    let mut session = Session::new(store, source, publisher).with_config(&config);
    if let Some(keys) = keys {
        session = session.with_signer(Arc::new(KeysSigner::new(keys)));
    }

    let result = execute(&session, cli.command, pretty).await;

    if let Some(relay) = relays {
        relay.disconnect().await;
    }
    result
}

async fn execute(session: &Session, command: Commands, pretty: bool) -> Result<()> {
    match command {
        Commands::Posts { limit } => print_json(&session.fetch_posts(limit).await?, pretty),
        Commands::Author { author_id, limit } => print_json(
            &session.fetch_posts_by_author(&author_id, limit).await?,
            pretty,
        ),
        Commands::Follows { author_id } => {
            let author_id = self_or(session, author_id)?;
            print_json(&session.fetch_follow_set(&author_id).await?, pretty)
        }
        Commands::Feed { author_id, limit } => {
            let author_id = self_or(session, author_id)?;
            print_json(&session.fetch_followed_posts(&author_id, limit).await?, pretty)
        }
        Commands::SecondDegree { author_id, limit } => {
            let author_id = self_or(session, author_id)?;
            print_json(
                &session.fetch_second_degree_posts(&author_id, limit).await?,
                pretty,
            )
        }
        Commands::Trending { window, limit } => {
            print_json(&session.fetch_trending(window, limit).await?, pretty)
        }
        Commands::Profile { author_id } => {
            let author_id = self_or(session, author_id)?;
            let profile = session.fetch_profile(&author_id).await?;
            print_json(&profile_view(profile.as_ref()), pretty)
        }
        Commands::SetProfile {
            name,
            display_name,
            about,
            picture,
        } => {
            let me = self_or(session, None)?;
            let current = session.fetch_profile(&me).await?.unwrap_or(Profile {
                author_id: me,
                ..Default::default()
            });
            let profile = Profile {
                name: name.or(current.name.clone()),
                display_name: display_name.or(current.display_name.clone()),
                about: about.or(current.about.clone()),
                picture: picture.or(current.picture.clone()),
                ..current
            };
            print_json(&session.set_profile(&profile).await?, pretty)
        }
        Commands::Replies { entity_id } => {
            print_json(&session.fetch_replies(&entity_id).await?, pretty)
        }
        Commands::Reactions { entity_id } => {
            print_json(&session.fetch_reactions(&entity_id).await?, pretty)
        }
        Commands::Reposts { entity_id } => {
            print_json(&session.fetch_reposts(&entity_id).await?, pretty)
        }
        Commands::Messages { peer_id, limit } => {
            print_json(&session.fetch_messages(&peer_id, limit).await?, pretty)
        }
        Commands::Post { text } => print_json(&session.post(&text).await?, pretty),
        Commands::Reply { parent_id, text } => {
            let parent = cached_entity(session, &parent_id)?;
            let parent = Post::from_entity(&parent)
                .ok_or_else(|| anyhow!("Entity {} is not a text note", parent.id))?;
            print_json(&session.reply(&parent, &text).await?, pretty)
        }
        Commands::React {
            target_id,
            reaction,
        } => {
            let target = cached_entity(session, &target_id)?;
            print_json(&session.react(&target, reaction.as_deref()).await?, pretty)
        }
        Commands::Repost { target_id } => {
            let target = cached_entity(session, &target_id)?;
            print_json(&session.repost(&target).await?, pretty)
        }
        Commands::Dm { peer_id, text } => {
            print_json(&session.send_direct_message(&peer_id, &text).await?, pretty)
        }
        Commands::Follow { author_id } => print_json(&session.follow(&author_id).await?, pretty),
        Commands::Unfollow { author_id } => {
            print_json(&session.unfollow(&author_id).await?, pretty)
        }
        other => anyhow::bail!("{:?} does not run against a session", other),
    }
}
