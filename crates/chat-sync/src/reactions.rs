//! Reaction state machine
//!
//! A user holds at most one reaction per message. Local toggles resolve to a
//! [`ReactionChange`] and go through the same [`apply`] routine as live
//! `REACTION_CHANGED` events, so both paths converge on the same state.

use chat_core::{Message, Reaction, ReactionChangedEvent, UserId};

/// Resolved effect of a toggle or a live reaction event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionChange {
    /// The user now reacts with `emoji` (and with nothing else)
    Set { user_id: UserId, emoji: String },
    /// The user no longer reacts with `emoji`
    Clear { user_id: UserId, emoji: String },
}

impl ReactionChange {
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::Set { user_id, .. } | Self::Clear { user_id, .. } => user_id,
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Self::Set { emoji, .. } | Self::Clear { emoji, .. } => emoji,
        }
    }
}

impl From<&ReactionChangedEvent> for ReactionChange {
    fn from(event: &ReactionChangedEvent) -> Self {
        if event.added {
            Self::Set {
                user_id: event.user_id.clone(),
                emoji: event.emoji.clone(),
            }
        } else {
            Self::Clear {
                user_id: event.user_id.clone(),
                emoji: event.emoji.clone(),
            }
        }
    }
}

/// Result of a local toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub change: ReactionChange,
    /// Emoji the user reacted with before the toggle
    pub previous: Option<String>,
}

/// Emoji a user currently reacts with
pub fn current<'a>(message: &'a Message, user_id: &UserId) -> Option<&'a str> {
    message.reaction_of(user_id)
}

/// Decide what a toggle does without mutating the message
pub fn resolve(message: &Message, user_id: &UserId, emoji: &str) -> ToggleOutcome {
    let previous = current(message, user_id).map(str::to_string);
    let change = if previous.as_deref() == Some(emoji) {
        ReactionChange::Clear {
            user_id: user_id.clone(),
            emoji: emoji.to_string(),
        }
    } else {
        ReactionChange::Set {
            user_id: user_id.clone(),
            emoji: emoji.to_string(),
        }
    };
    ToggleOutcome { change, previous }
}

/// Toggle a user's reaction on one message
pub fn toggle(message: &mut Message, user_id: &UserId, emoji: &str) -> ToggleOutcome {
    let outcome = resolve(message, user_id, emoji);
    apply(message, &outcome.change);
    outcome
}

/// Apply a change; idempotent. Returns `true` if the message changed.
pub fn apply(message: &mut Message, change: &ReactionChange) -> bool {
    let changed = match change {
        ReactionChange::Set { user_id, emoji } => {
            let mut changed = false;
            for reaction in &mut message.reactions {
                if !reaction.is_emoji(emoji) && reaction.users.remove(user_id) {
                    changed = true;
                }
            }
            match message.reactions.iter_mut().find(|r| r.is_emoji(emoji)) {
                Some(reaction) => changed |= reaction.users.insert(user_id.clone()),
                None => {
                    message
                        .reactions
                        .push(Reaction::new(emoji.clone()).with_user(user_id.clone()));
                    changed = true;
                }
            }
            changed
        }
        ReactionChange::Clear { user_id, emoji } => message
            .reactions
            .iter_mut()
            .find(|r| r.is_emoji(emoji))
            .is_some_and(|r| r.users.remove(user_id)),
    };

    if changed {
        normalize(message);
    }
    changed
}

/// Put a user's reaction back to `previous` after a rejected toggle
pub fn restore(message: &mut Message, user_id: &UserId, previous: Option<&str>) -> bool {
    match previous {
        Some(emoji) => apply(
            message,
            &ReactionChange::Set {
                user_id: user_id.clone(),
                emoji: emoji.to_string(),
            },
        ),
        None => match current(message, user_id).map(str::to_string) {
            Some(emoji) => apply(
                message,
                &ReactionChange::Clear {
                    user_id: user_id.clone(),
                    emoji,
                },
            ),
            None => false,
        },
    }
}

// Prune empty reactions and recompute counts
fn normalize(message: &mut Message) {
    message.reactions.retain(|r| !r.is_empty());
    for reaction in &mut message.reactions {
        reaction.recount();
    }
}
