//! Value objects - immutable identifiers and keys

mod ids;
mod scope;

pub use ids::{ChannelId, MessageId, UserId, PROVISIONAL_PREFIX};
pub use scope::{ScopeKey, ScopeParseError, CHANNEL_SCOPE_PREFIX, THREAD_SCOPE_PREFIX};
