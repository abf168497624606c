use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_RELAYS, PROFILE_STALE_SECS,
};
use crate::models::RelayDescriptor;

/// Core configuration, loadable from a JSON file. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Directory holding the local database
    pub data_dir: PathBuf,

    pub relays: Vec<RelayDescriptor>,

    /// Per-fetch wait on relays, in milliseconds
    pub fetch_timeout_ms: u64,

    pub connect_timeout_ms: u64,

    /// Age after which a cached profile is refetched
    pub profile_stale_secs: u64,

    /// Credentials for nostr authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

/// Nostr credentials configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// nsec, hex, or ncryptsec (encrypted) key
    pub key: String,

    /// Password for ncryptsec decryption (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            relays: DEFAULT_RELAYS
                .iter()
                .map(|url| RelayDescriptor::new(*url))
                .collect(),
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            profile_stale_secs: PROFILE_STALE_SECS,
            credentials: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("murmur")
}

impl CoreConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("murmur.db")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_minimal() {
        let config = CoreConfig::from_json("{}").unwrap();
        assert_eq!(config.fetch_timeout_ms, DEFAULT_FETCH_TIMEOUT_MS);
        assert_eq!(config.relays.len(), DEFAULT_RELAYS.len());
        assert!(config.relays.iter().all(|r| r.can_read && r.can_write));
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_parse_config_with_relays_and_credentials() {
        let json = r#"{
            "dataDir": "/tmp/murmur-test",
            "fetchTimeoutMs": 1500,
            "relays": [
                {"url": "wss://read.example", "canWrite": false},
                {"url": "wss://write.example", "canRead": false}
            ],
            "credentials": {"key": "nsec1abc123", "password": "secret"}
        }"#;
        let config = CoreConfig::from_json(json).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/murmur-test"));
        assert_eq!(config.fetch_timeout(), Duration::from_millis(1500));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/murmur-test/murmur.db"));
        assert!(config.relays[0].can_read && !config.relays[0].can_write);
        assert!(!config.relays[1].can_read && config.relays[1].can_write);
        let creds = config.credentials.unwrap();
        assert_eq!(creds.key, "nsec1abc123");
        assert_eq!(creds.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CoreConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
