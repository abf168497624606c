use crate::filter::FilterError;
use crate::nostr::SignerError;

/// Errors surfaced by [`crate::Session`] operations.
///
/// Storage failures never appear here: they degrade to cache misses.
/// Relay timeouts only appear when there was nothing at all to return.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Not authenticated: a signing identity is required")]
    NotAuthenticated,
    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },
    #[error("Publish rejected: {message}")]
    PublishRejected { message: String },
    #[error("Timed out waiting for relays and nothing was cached")]
    Timeout,
    #[error("Fetch cancelled")]
    Cancelled,
    #[error("Signer error: {message}")]
    Signer { message: String },
}

impl FetchError {
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }
}

impl From<FilterError> for FetchError {
    fn from(err: FilterError) -> Self {
        Self::invalid_filter(err.to_string())
    }
}

impl From<SignerError> for FetchError {
    fn from(err: SignerError) -> Self {
        Self::Signer {
            message: err.to_string(),
        }
    }
}
