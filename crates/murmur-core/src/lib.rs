pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod models;
pub mod nostr;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod tracing_setup;

#[cfg(test)]
mod test_support;

// Re-export the session surface at crate root for convenience
pub use config::CoreConfig;
pub use error::FetchError;
pub use filter::Filter;
pub use reconciler::{Completeness, FetchOptions, Fetched, SortOrder};
pub use session::{Session, TrendingPost};
pub use store::ClearScope;
