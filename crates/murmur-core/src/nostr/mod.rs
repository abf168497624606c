pub mod auth;
pub mod relay_source;
pub mod signer;
pub mod source;

pub use auth::{
    credentials_need_password, generate_keys, get_current_pubkey, has_stored_credentials,
    load_stored_keys, login_with_secret, parse_secret,
};
pub use relay_source::RelaySource;
pub use signer::{KeysSigner, Signer, SignerError};
pub use source::{
    OfflineSource, Publisher, SourceError, SourceMessage, SubscriptionHandle, SubscriptionSource,
};
