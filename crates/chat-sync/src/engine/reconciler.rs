//! Reconciliation engine - the only writer of the message store
//!
//! History pages and live events are folded into the store here, and local
//! commands are applied optimistically and later confirmed or rolled back.
//! The engine performs no I/O: operations return the requests to run, and
//! the worker feeds the results back in.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use chat_common::SyncSettings;
use chat_core::{
    ChannelId, DomainError, LiveEvent, Message, MessageId, ScopeKey, SendMessagePayload,
    TypingEvent, UserId,
};

use super::commands::{DeleteMessage, EditMessage, SendMessage, ToggleReaction};
use super::requests::{
    ActionKind, Changes, DeleteRequest, EditRequest, FetchCompletion, FetchKind, FetchOutcome,
    FetchRequest, FetchToken, OpId, ReactionCall, ReactionRequest, ScopeSnapshot, SendRequest,
};
use crate::reactions::{self, ReactionChange};
use crate::store::{InsertMode, MessageStore};
use crate::typing::TypingTracker;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    token: FetchToken,
    kind: FetchKind,
}

#[derive(Debug)]
struct PendingSend {
    provisional_id: MessageId,
    scope: ScopeKey,
}

#[derive(Debug)]
struct PendingEdit {
    message_id: MessageId,
    content: String,
    edited: bool,
    edited_at: Option<DateTime<Utc>>,
    applied_content: String,
    applied_at: DateTime<Utc>,
}

impl PendingEdit {
    /// Whether the entry still shows this edit's optimistic body
    fn is_current(&self, message: &Message) -> bool {
        message.content == self.applied_content && message.edited_at == Some(self.applied_at)
    }
}

#[derive(Debug)]
struct PendingReaction {
    message_id: MessageId,
    previous: Option<String>,
    /// The user's reaction right after the optimistic toggle
    applied: Option<String>,
}

/// Result of switching the active channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// Scopes left (unsubscribe these)
    pub closed: Vec<ScopeKey>,
    /// Initial fetch of the new channel, unless it was already open
    pub fetch: Option<FetchRequest>,
}

/// Owns the store, reaction state and typing state for one session
#[derive(Debug)]
pub struct ReconciliationEngine {
    user_id: UserId,
    page_size: usize,
    store: MessageStore<ScopeKey>,
    typing: TypingTracker,
    observed: HashSet<ScopeKey>,
    in_flight: HashMap<ScopeKey, InFlight>,
    next_token: FetchToken,
    next_op: OpId,
    pending_sends: HashMap<String, PendingSend>,
    pending_edits: HashMap<OpId, PendingEdit>,
    pending_deletes: HashMap<MessageId, Vec<(ScopeKey, Message)>>,
    pending_reactions: HashMap<OpId, PendingReaction>,
}

impl ReconciliationEngine {
    pub fn new(user_id: UserId, settings: &SyncSettings) -> Self {
        Self {
            typing: TypingTracker::new(user_id.clone(), settings.typing_ttl),
            user_id,
            page_size: settings.page_size.max(1),
            store: MessageStore::new(settings.tombstone_capacity),
            observed: HashSet::new(),
            in_flight: HashMap::new(),
            next_token: 0,
            next_op: 0,
            pending_sends: HashMap::new(),
            pending_edits: HashMap::new(),
            pending_deletes: HashMap::new(),
            pending_reactions: HashMap::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn store(&self) -> &MessageStore<ScopeKey> {
        &self.store
    }

    pub fn is_observed(&self, scope: &ScopeKey) -> bool {
        self.observed.contains(scope)
    }

    /// Open scopes, sorted
    pub fn observed_scopes(&self) -> Vec<ScopeKey> {
        let mut scopes: Vec<ScopeKey> = self.observed.iter().cloned().collect();
        scopes.sort();
        scopes
    }

    pub fn is_fetching(&self, scope: &ScopeKey) -> bool {
        self.in_flight.contains_key(scope)
    }

    pub fn messages(&self, scope: &ScopeKey) -> &[Message] {
        self.store.messages(scope)
    }

    pub fn typing_users(&self, scope: &ScopeKey) -> Vec<UserId> {
        self.typing.typing_users(scope)
    }

    pub fn pending_sends(&self) -> usize {
        self.pending_sends.len()
    }

    /// UI view of an open scope
    pub fn snapshot(&self, scope: &ScopeKey) -> Option<ScopeSnapshot> {
        if !self.observed.contains(scope) {
            return None;
        }
        Some(ScopeSnapshot {
            scope: scope.clone(),
            messages: self.store.messages(scope).to_vec(),
            has_more: self.store.has_more(scope),
            loading: self.in_flight.contains_key(scope),
        })
    }

    // =========================================================================
    // Scope lifecycle and history
    // =========================================================================

    /// Start observing a scope; returns its initial fetch unless already open
    pub fn open_scope(&mut self, scope: ScopeKey) -> Option<FetchRequest> {
        if !self.observed.insert(scope.clone()) {
            return None;
        }
        self.store.open(scope.clone());
        tracing::debug!(scope = %scope, "Scope opened");
        Some(self.start_fetch(scope, FetchKind::Initial, None))
    }

    /// Stop observing a scope and drop its state; late completions become stale
    pub fn close_scope(&mut self, scope: &ScopeKey) -> bool {
        if !self.observed.remove(scope) {
            return false;
        }
        self.in_flight.remove(scope);
        self.store.discard(scope);
        self.typing.clear(scope);
        tracing::debug!(scope = %scope, "Scope closed");
        true
    }

    /// Leave every open scope and open the given channel
    pub fn switch_channel(&mut self, channel_id: ChannelId) -> SwitchOutcome {
        let target = ScopeKey::Channel(channel_id);
        let closed: Vec<ScopeKey> = self
            .observed_scopes()
            .into_iter()
            .filter(|s| s != &target)
            .collect();
        for scope in &closed {
            self.close_scope(scope);
        }
        let fetch = self.open_scope(target);
        SwitchOutcome { closed, fetch }
    }

    /// Re-issue the initial fetch of an open scope (retry after failure)
    pub fn load_initial(&mut self, scope: &ScopeKey) -> Result<FetchRequest, DomainError> {
        if !self.observed.contains(scope) {
            return Err(DomainError::ScopeNotLoaded(scope.clone()));
        }
        Ok(self.start_fetch(scope.clone(), FetchKind::Initial, None))
    }

    /// Fetch the page before the oldest loaded message.
    ///
    /// `Ok(None)` when there is nothing more to load, the initial page has
    /// not arrived yet, or a fetch for the scope is already in flight.
    pub fn load_older(&mut self, scope: &ScopeKey) -> Result<Option<FetchRequest>, DomainError> {
        if !self.observed.contains(scope) {
            return Err(DomainError::ScopeNotLoaded(scope.clone()));
        }
        if self.in_flight.contains_key(scope)
            || !self.store.is_loaded(scope)
            || !self.store.has_more(scope)
        {
            return Ok(None);
        }
        let Some(cursor) = self.store.cursor(scope).cloned() else {
            return Ok(None);
        };
        Ok(Some(self.start_fetch(
            scope.clone(),
            FetchKind::Older,
            Some(cursor),
        )))
    }

    /// Newest page of every loaded scope, to fill the gap left by a disconnect
    pub fn resync(&mut self) -> Vec<FetchRequest> {
        let due: Vec<ScopeKey> = self
            .observed_scopes()
            .into_iter()
            .filter(|s| self.store.is_loaded(s) && !self.in_flight.contains_key(s))
            .collect();
        due.into_iter()
            .map(|s| self.start_fetch(s, FetchKind::Resync, None))
            .collect()
    }

    fn start_fetch(
        &mut self,
        scope: ScopeKey,
        kind: FetchKind,
        before: Option<MessageId>,
    ) -> FetchRequest {
        self.next_token += 1;
        let token = self.next_token;
        self.in_flight.insert(scope.clone(), InFlight { token, kind });
        tracing::debug!(scope = %scope, token, ?kind, "Fetch issued");
        FetchRequest {
            scope,
            token,
            kind,
            before,
            limit: self.page_size,
        }
    }

    /// Apply a fetch result if it still matches the scope's in-flight token
    pub fn complete_fetch(&mut self, completion: FetchCompletion) -> FetchOutcome {
        let FetchCompletion {
            scope,
            token,
            result,
        } = completion;

        let current = match self.in_flight.get(&scope) {
            Some(current) if current.token == token && self.observed.contains(&scope) => *current,
            _ => {
                tracing::debug!(scope = %scope, token, "Discarding stale fetch result");
                return FetchOutcome::Stale;
            }
        };
        self.in_flight.remove(&scope);

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                tracing::warn!(scope = %scope, error = %error, "Fetch failed");
                return FetchOutcome::Failed { scope, error };
            }
        };

        let count = page.messages.len();
        let mut messages = Vec::with_capacity(count);
        for message in page.messages {
            if !self.confirm_pending(&message) {
                messages.push(message);
            }
        }

        let full_page = count >= self.page_size;
        match current.kind {
            FetchKind::Initial => {
                self.store.merge(&scope, messages, InsertMode::ReplaceInitial);
                self.store.set_has_more(&scope, full_page);
                self.store.mark_loaded(&scope);
            }
            FetchKind::Older => {
                self.store.merge(&scope, messages, InsertMode::PrependHistory);
                self.store.set_has_more(&scope, full_page);
            }
            FetchKind::Resync => {
                self.store.merge(&scope, messages, InsertMode::AppendLive);
            }
        }

        FetchOutcome::Applied { scope, count }
    }

    // A history or live copy of a message this client sent; swaps out the
    // provisional entry. Returns `true` if the message was consumed.
    fn confirm_pending(&mut self, message: &Message) -> bool {
        let Some(nonce) = message.nonce.as_deref() else {
            return false;
        };
        let Some(pending) = self.pending_sends.remove(nonce) else {
            return false;
        };
        let changed = self.store.replace_provisional(&pending.provisional_id, message);
        !changed.is_empty()
    }

    // =========================================================================
    // Live events
    // =========================================================================

    /// Fold one live event into the store
    pub fn apply_live(&mut self, event: LiveEvent, now: Instant) -> Changes {
        let mut changes = Changes::default();
        tracing::trace!(event = event.event_type(), "Applying live event");

        match event {
            LiveEvent::MessageCreated(message) => {
                let scope = message.scope();
                if self.typing.stopped(&scope, &message.author_id) {
                    changes.touch_typing(scope.clone());
                }
                if self.store.is_tombstoned(&message.id) {
                    tracing::trace!(message_id = %message.id, "Ignoring create of deleted message");
                    return changes;
                }
                if let Some(pending) = message
                    .nonce
                    .as_deref()
                    .and_then(|n| self.pending_sends.remove(n))
                {
                    let replaced = self.store.replace_provisional(&pending.provisional_id, &message);
                    if !replaced.is_empty() {
                        changes.touch_all(replaced);
                        return changes;
                    }
                }
                if self.observed.contains(&scope)
                    && self
                        .store
                        .merge(&scope, vec![message], InsertMode::AppendLive)
                        .changed()
                {
                    changes.touch(scope);
                }
            }
            LiveEvent::MessageUpdated(message) => {
                if self.store.is_tombstoned(&message.id) {
                    return changes;
                }
                let id = message.id.clone();
                changes.touch_all(self.store.update(&id, |m| m.absorb(&message)));
            }
            LiveEvent::MessageDeleted(event) => {
                self.pending_deletes.remove(&event.message_id);
                self.delete_everywhere(&event.message_id, &mut changes);
                self.drop_thread_of(&event.message_id, &mut changes);
            }
            LiveEvent::ReactionChanged(event) => {
                let change = ReactionChange::from(&event);
                changes.touch_all(
                    self.store
                        .update(&event.message_id, |m| reactions::apply(m, &change)),
                );
            }
            LiveEvent::TypingStarted(event) => {
                let scope = typing_scope(&event);
                if self.observed.contains(&scope) && self.typing.started(&scope, &event.user_id, now)
                {
                    changes.touch_typing(scope);
                }
            }
            LiveEvent::TypingStopped(event) => {
                let scope = typing_scope(&event);
                if self.typing.stopped(&scope, &event.user_id) {
                    changes.touch_typing(scope);
                }
            }
        }
        changes
    }

    fn delete_everywhere(&mut self, id: &MessageId, changes: &mut Changes) -> Vec<(ScopeKey, Message)> {
        let removed = self.store.remove_everywhere(id);
        changes.touch_all(removed.iter().map(|(scope, _)| scope.clone()));
        removed
    }

    // The thread rooted at a deleted message cannot be shown any more
    fn drop_thread_of(&mut self, root_id: &MessageId, changes: &mut Changes) {
        let thread = ScopeKey::Thread(root_id.clone());
        if self.close_scope(&thread) {
            changes.close(thread);
        } else {
            self.store.discard(&thread);
        }
    }

    /// Prune expired typing indicators
    /// When the earliest typing entry lapses, if any is held
    pub fn next_typing_expiry(&self) -> Option<Instant> {
        self.typing.next_expiry()
    }

    pub fn expire_typing(&mut self, now: Instant) -> Changes {
        let mut changes = Changes::default();
        for scope in self.typing.expire(now) {
            changes.touch_typing(scope);
        }
        changes
    }

    /// Whether the local user's keystroke should be announced (throttled)
    pub fn local_typing(&mut self, scope: &ScopeKey, now: Instant) -> bool {
        self.observed.contains(scope) && self.typing.should_send(scope, now)
    }

    // =========================================================================
    // Local commands
    // =========================================================================

    /// Optimistically insert a message and return the send to run
    pub fn send(&mut self, command: SendMessage) -> Result<(SendRequest, Changes), DomainError> {
        command.check()?;
        let scope = command.scope();
        if !self.observed.contains(&scope) {
            return Err(DomainError::ScopeNotLoaded(scope));
        }

        let nonce = Uuid::new_v4().to_string();
        let provisional_id = MessageId::provisional(&nonce);
        let parent_id = command.parent_id.clone().or_else(|| command.thread_id.clone());

        let mut message = Message::new(
            provisional_id.clone(),
            command.channel_id.clone(),
            self.user_id.clone(),
            command.content.clone(),
        )
        .with_mentions(command.mentions.clone())
        .with_nonce(nonce.clone());
        message.thread_id = command.thread_id.clone();
        message.parent_id = parent_id.clone();
        message.attachments = command.attachments.clone();

        let payload = SendMessagePayload {
            channel_id: command.channel_id,
            thread_id: command.thread_id,
            parent_id,
            content: command.content,
            mentions: message.mentions.clone(),
            attachments: command.attachments,
            nonce: nonce.clone(),
        };

        self.store.merge(&scope, vec![message], InsertMode::AppendLive);
        self.typing.reset_outbound(&scope);
        self.pending_sends.insert(
            nonce,
            PendingSend {
                provisional_id: provisional_id.clone(),
                scope: scope.clone(),
            },
        );
        tracing::debug!(scope = %scope, provisional_id = %provisional_id, "Optimistic send");

        let mut changes = Changes::default();
        changes.touch(scope);
        Ok((
            SendRequest {
                provisional_id,
                payload,
            },
            changes,
        ))
    }

    /// Confirm or roll back an optimistic send
    pub fn complete_send(&mut self, nonce: &str, result: Result<Message, DomainError>) -> Changes {
        let mut changes = Changes::default();
        let pending = self.pending_sends.remove(nonce);

        match (pending, result) {
            (Some(pending), Ok(confirmed)) => {
                changes.touch_all(
                    self.store
                        .replace_provisional(&pending.provisional_id, &confirmed),
                );
            }
            // The live echo already replaced the provisional entry
            (None, Ok(confirmed)) => {
                let scope = confirmed.scope();
                if self.observed.contains(&scope)
                    && !self.store.is_tombstoned(&confirmed.id)
                    && self
                        .store
                        .merge(&scope, vec![confirmed], InsertMode::AppendLive)
                        .changed()
                {
                    changes.touch(scope);
                }
            }
            (Some(pending), Err(error)) => {
                tracing::warn!(scope = %pending.scope, error = %error, "Send failed, rolling back");
                changes.touch_all(self.store.take(&pending.provisional_id));
                changes.fail(ActionKind::Send, Some(pending.scope), error);
            }
            // The echo proved the server accepted it
            (None, Err(error)) => {
                tracing::debug!(error = %error, "Send reported failure after its echo arrived");
            }
        }
        changes
    }

    /// Optimistically replace a message body and return the edit to run
    pub fn edit(&mut self, command: EditMessage) -> Result<(EditRequest, Changes), DomainError> {
        command.check()?;
        let Some(current) = self.store.find(&command.message_id) else {
            return Err(DomainError::MessageNotFound(command.message_id));
        };
        let now = Utc::now();
        let pending = PendingEdit {
            message_id: command.message_id.clone(),
            content: current.content.clone(),
            edited: current.edited,
            edited_at: current.edited_at,
            applied_content: command.content.clone(),
            applied_at: now,
        };

        let op = self.next_op();
        self.pending_edits.insert(op, pending);

        let mut changes = Changes::default();
        changes.touch_all(self.store.update(&command.message_id, |m| {
            m.edit(command.content.clone(), now);
            true
        }));

        Ok((
            EditRequest {
                op,
                message_id: command.message_id,
                content: command.content,
            },
            changes,
        ))
    }

    /// Confirm or roll back an optimistic edit.
    ///
    /// Both outcomes only overwrite the entry while it still shows this
    /// edit's body; a newer update that landed meanwhile is kept.
    pub fn complete_edit(&mut self, op: OpId, result: Result<Message, DomainError>) -> Changes {
        let mut changes = Changes::default();
        let Some(pending) = self.pending_edits.remove(&op) else {
            return changes;
        };

        match result {
            Ok(server) => {
                if !self.store.is_tombstoned(&server.id) {
                    changes.touch_all(self.store.update(&pending.message_id, |m| {
                        if pending.is_current(m) {
                            m.take_edit(&server)
                        } else {
                            m.absorb(&server)
                        }
                    }));
                }
            }
            // The delete event will remove it
            Err(error) if error.is_not_found() => {
                changes.fail(ActionKind::Edit, self.first_scope(&pending.message_id), error);
            }
            Err(error) => {
                tracing::warn!(message_id = %pending.message_id, error = %error, "Edit failed, rolling back");
                changes.touch_all(self.store.update(&pending.message_id, |m| {
                    if !pending.is_current(m) {
                        return false;
                    }
                    m.content.clone_from(&pending.content);
                    m.edited = pending.edited;
                    m.edited_at = pending.edited_at;
                    true
                }));
                changes.fail(ActionKind::Edit, self.first_scope(&pending.message_id), error);
            }
        }
        changes
    }

    /// Optimistically remove a message and return the delete to run
    pub fn delete(&mut self, command: DeleteMessage) -> Result<(DeleteRequest, Changes), DomainError> {
        command.check()?;
        if self.store.find(&command.message_id).is_none() {
            return Err(DomainError::MessageNotFound(command.message_id));
        }

        let mut changes = Changes::default();
        let removed = self.delete_everywhere(&command.message_id, &mut changes);
        self.pending_deletes
            .insert(command.message_id.clone(), removed);

        Ok((
            DeleteRequest {
                message_id: command.message_id,
            },
            changes,
        ))
    }

    /// Confirm or roll back an optimistic delete
    pub fn complete_delete(&mut self, message_id: &MessageId, result: Result<(), DomainError>) -> Changes {
        let mut changes = Changes::default();
        let pending = self.pending_deletes.remove(message_id);

        match result {
            Ok(()) => self.drop_thread_of(message_id, &mut changes),
            // Already gone on the server; deletion is terminal
            Err(error) if error.is_not_found() => self.drop_thread_of(message_id, &mut changes),
            Err(error) => {
                // `None` means a live delete event confirmed it meanwhile
                if let Some(removed) = pending {
                    tracing::warn!(message_id = %message_id, error = %error, "Delete failed, restoring");
                    let scope = removed.first().map(|(scope, _)| scope.clone());
                    let restored = self.store.restore(removed);
                    changes.touch_all(restored);
                    changes.fail(ActionKind::Delete, scope, error);
                }
            }
        }
        changes
    }

    /// Optimistically toggle the local user's reaction and return the calls to run
    pub fn react(&mut self, command: ToggleReaction) -> Result<(ReactionRequest, Changes), DomainError> {
        command.check()?;
        let Some(message) = self.store.find(&command.message_id) else {
            return Err(DomainError::MessageNotFound(command.message_id));
        };
        let outcome = reactions::resolve(message, &self.user_id, &command.emoji);

        let mut changes = Changes::default();
        changes.touch_all(
            self.store
                .update(&command.message_id, |m| reactions::apply(m, &outcome.change)),
        );

        let calls = match &outcome.change {
            ReactionChange::Set { emoji, .. } => {
                let mut calls = Vec::with_capacity(2);
                if let Some(previous) = &outcome.previous {
                    calls.push(ReactionCall::Remove(previous.clone()));
                }
                calls.push(ReactionCall::Add(emoji.clone()));
                calls
            }
            ReactionChange::Clear { emoji, .. } => vec![ReactionCall::Remove(emoji.clone())],
        };

        let applied = match outcome.change {
            ReactionChange::Set { emoji, .. } => Some(emoji),
            ReactionChange::Clear { .. } => None,
        };
        let op = self.next_op();
        self.pending_reactions.insert(
            op,
            PendingReaction {
                message_id: command.message_id.clone(),
                previous: outcome.previous,
                applied,
            },
        );

        Ok((
            ReactionRequest {
                op,
                message_id: command.message_id,
                calls,
            },
            changes,
        ))
    }

    /// Confirm or roll back an optimistic reaction toggle.
    ///
    /// `completed` is the number of calls that succeeded before `result`.
    /// Nothing is rolled back once the user's reaction has moved on from
    /// what this toggle set, e.g. through a later toggle.
    pub fn complete_react(
        &mut self,
        op: OpId,
        completed: usize,
        result: Result<(), DomainError>,
    ) -> Changes {
        let mut changes = Changes::default();
        let Some(pending) = self.pending_reactions.remove(&op) else {
            return changes;
        };

        let error = match result {
            Ok(()) => return changes,
            Err(error) => error,
        };
        let scope = self.first_scope(&pending.message_id);
        if !error.is_not_found() {
            // A completed removal of the previous emoji stands on the server
            let target = if completed > 0 {
                None
            } else {
                pending.previous.as_deref()
            };
            tracing::warn!(message_id = %pending.message_id, error = %error, "Reaction failed, rolling back");
            let user_id = self.user_id.clone();
            let applied = pending.applied.as_deref();
            changes.touch_all(self.store.update(&pending.message_id, |m| {
                reactions::current(m, &user_id) == applied && reactions::restore(m, &user_id, target)
            }));
        }
        changes.fail(ActionKind::React, scope, error);
        changes
    }

    fn next_op(&mut self) -> OpId {
        self.next_op += 1;
        self.next_op
    }

    fn first_scope(&self, id: &MessageId) -> Option<ScopeKey> {
        let mut scopes = self.store.locate(id);
        scopes.sort();
        scopes.into_iter().next()
    }
}

fn typing_scope(event: &TypingEvent) -> ScopeKey {
    match &event.thread_id {
        Some(root) => ScopeKey::Thread(root.clone()),
        None => ScopeKey::Channel(event.channel_id.clone()),
    }
}
