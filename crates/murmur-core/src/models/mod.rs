pub mod draft;
pub mod entity;
pub mod follow_set;
pub mod message;
pub mod post;
pub mod profile;
pub mod relay;
pub mod tag_utils;

pub use draft::Draft;
pub use entity::Entity;
pub use follow_set::FollowSet;
pub use message::DirectMessage;
pub use post::{Post, Reaction, Repost};
pub use profile::Profile;
pub use relay::RelayDescriptor;
