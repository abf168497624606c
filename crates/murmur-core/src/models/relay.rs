use serde::{Deserialize, Serialize};

fn yes() -> bool {
    true
}

/// Relay connection configuration. The pool itself is owned by the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayDescriptor {
    pub url: String,
    #[serde(default = "yes")]
    pub can_read: bool,
    #[serde(default = "yes")]
    pub can_write: bool,
    /// Unix seconds when the relay was last seen connected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_reachable: Option<u64>,
}

impl RelayDescriptor {
    /// Read+write relay
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            can_read: true,
            can_write: true,
            last_known_reachable: None,
        }
    }

    /// Relay URLs compare equal regardless of a trailing slash.
    pub fn same_url(&self, other: &str) -> bool {
        self.url.trim_end_matches('/') == other.trim_end_matches('/')
    }
}
