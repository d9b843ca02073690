//! # chat-sync
//!
//! Client-side synchronization engine: the scoped message store, the
//! reconciliation of history pages with live events, optimistic local
//! mutations, reactions, and typing indicators.
//!
//! [`ReconciliationEngine`] is pure state. [`SyncWorker`] owns it on a single
//! task and runs the network calls it asks for.

pub mod engine;
pub mod reactions;
pub mod store;
pub mod typing;
pub mod worker;

pub use engine::{
    ActionKind, Changes, DeleteMessage, EditMessage, Failure, FetchKind, ReconciliationEngine,
    ScopeSnapshot, SendMessage, SwitchOutcome, ToggleReaction,
};
pub use reactions::{ReactionChange, ToggleOutcome};
pub use store::{InsertMode, MergeReport, MessageStore, ScopeList, Tombstones};
pub use typing::TypingTracker;
pub use worker::{SyncHandle, SyncUpdate, SyncWorker};
