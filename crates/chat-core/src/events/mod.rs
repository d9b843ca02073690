//! Live events pushed by the server over the live connection

mod live_event;

pub use live_event::{LiveEvent, MessageDeletedEvent, ReactionChangedEvent, TypingEvent};
