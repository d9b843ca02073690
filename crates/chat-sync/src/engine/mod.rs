//! Reconciliation engine and the messages it exchanges with the worker

pub mod commands;
pub mod requests;
mod reconciler;

pub use commands::{DeleteMessage, EditMessage, SendMessage, ToggleReaction};
pub use reconciler::{ReconciliationEngine, SwitchOutcome};
pub use requests::{
    ActionKind, Changes, DeleteRequest, EditRequest, Failure, FetchCompletion, FetchKind,
    FetchOutcome, FetchRequest, FetchToken, OpId, ReactionCall, ReactionRequest, ScopeSnapshot,
    SendRequest,
};
