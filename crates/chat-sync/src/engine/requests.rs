//! Network work the engine asks for, and what it reports back

use chat_core::{DomainError, Message, MessageId, MessagePage, ScopeKey, SendMessagePayload};

/// Monotonic stamp of a history fetch
pub type FetchToken = u64;

/// Id of an in-flight edit or reaction
pub type OpId = u64;

/// Why a page is being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Newest page of a freshly opened scope
    Initial,
    /// Page older than the current cursor
    Older,
    /// Newest page again after a reconnect, to fill the gap
    Resync,
}

/// A history fetch to run against the message API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub scope: ScopeKey,
    pub token: FetchToken,
    pub kind: FetchKind,
    pub before: Option<MessageId>,
    pub limit: usize,
}

impl FetchRequest {
    /// Pair this request with its result
    pub fn complete(self, result: Result<MessagePage, DomainError>) -> FetchCompletion {
        FetchCompletion {
            scope: self.scope,
            token: self.token,
            result,
        }
    }
}

/// Result of a history fetch
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    pub scope: ScopeKey,
    pub token: FetchToken,
    pub result: Result<MessagePage, DomainError>,
}

/// What happened to a fetch completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Merged into the scope
    Applied { scope: ScopeKey, count: usize },
    /// The scope was left or re-fetched since; ignored
    Stale,
    /// The request failed; the store was not touched
    Failed { scope: ScopeKey, error: DomainError },
}

impl FetchOutcome {
    /// Changes to publish for this outcome
    pub fn changes(&self) -> Changes {
        let mut changes = Changes::default();
        match self {
            Self::Applied { scope, .. } => changes.touch(scope.clone()),
            Self::Failed { scope, error } => {
                changes.touch(scope.clone());
                changes.fail(ActionKind::Load, Some(scope.clone()), error.clone());
            }
            Self::Stale => {}
        }
        changes
    }
}

/// A send to run against the message API
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub provisional_id: MessageId,
    pub payload: SendMessagePayload,
}

/// An edit to run against the message API
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub op: OpId,
    pub message_id: MessageId,
    pub content: String,
}

/// A delete to run against the message API
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub message_id: MessageId,
}

/// One reaction call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionCall {
    Add(String),
    Remove(String),
}

/// Reaction calls to run in order; the first failure stops the sequence.
///
/// Moving a reaction to another emoji is a remove followed by an add.
#[derive(Debug, Clone)]
pub struct ReactionRequest {
    pub op: OpId,
    pub message_id: MessageId,
    pub calls: Vec<ReactionCall>,
}

/// Which user action a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Load,
    Send,
    Edit,
    Delete,
    React,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Send => "send",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::React => "react",
        }
    }
}

/// A rejected action, surfaced to the UI after rollback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub action: ActionKind,
    pub scope: Option<ScopeKey>,
    pub error: DomainError,
}

impl Failure {
    /// Whether offering a retry makes sense
    pub fn is_retryable(&self) -> bool {
        self.error.is_transient()
    }
}

/// Everything a single engine step changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    /// Scopes whose message list changed
    pub scopes: Vec<ScopeKey>,
    /// Scopes whose typing set changed
    pub typing: Vec<ScopeKey>,
    /// Scopes the engine dropped on its own (e.g. the thread of a deleted root)
    pub closed: Vec<ScopeKey>,
    pub failure: Option<Failure>,
}

impl Changes {
    pub fn touch(&mut self, scope: ScopeKey) {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
    }

    pub fn touch_all(&mut self, scopes: impl IntoIterator<Item = ScopeKey>) {
        for scope in scopes {
            self.touch(scope);
        }
    }

    pub fn touch_typing(&mut self, scope: ScopeKey) {
        if !self.typing.contains(&scope) {
            self.typing.push(scope);
        }
    }

    pub fn close(&mut self, scope: ScopeKey) {
        self.scopes.retain(|s| s != &scope);
        self.typing.retain(|s| s != &scope);
        if !self.closed.contains(&scope) {
            self.closed.push(scope);
        }
    }

    pub fn fail(&mut self, action: ActionKind, scope: Option<ScopeKey>, error: DomainError) {
        self.failure = Some(Failure {
            action,
            scope,
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
            && self.typing.is_empty()
            && self.closed.is_empty()
            && self.failure.is_none()
    }
}

/// Snapshot of one scope for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSnapshot {
    pub scope: ScopeKey,
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub loading: bool,
}
