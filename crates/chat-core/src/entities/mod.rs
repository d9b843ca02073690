//! Domain entities - messages and their reactions

mod message;
mod reaction;

pub use message::{Attachment, Message, MAX_CONTENT_LENGTH, MAX_MENTIONS};
pub use reaction::{validate_emoji, Reaction, ReactionSummary, MAX_EMOJI_LENGTH};
