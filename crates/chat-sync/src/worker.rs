//! Sync worker - runs the engine on one task
//!
//! All engine mutations are serialized through this task. API calls are
//! spawned and report back through a completion queue, so a slow request
//! never blocks live events.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use chat_common::{AppError, AppResult};
use chat_core::{
    ChannelId, DomainError, LiveChannel, LiveEvent, Message, MessageApi, MessageId, ScopeKey,
    UserId,
};

use crate::engine::{
    Changes, DeleteMessage, EditMessage, Failure, FetchCompletion, FetchRequest, OpId,
    ReactionCall, ReactionRequest, ReconciliationEngine, ScopeSnapshot, SendMessage,
    ToggleReaction,
};

const COMMAND_BUFFER: usize = 64;
const UPDATE_BUFFER: usize = 256;

/// What the UI hears about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    /// A scope's message list, loading flag or has-more flag changed
    Scope(ScopeSnapshot),
    /// The set of users typing in a scope changed
    Typing { scope: ScopeKey, users: Vec<UserId> },
    /// A scope was closed (switched away from, or its thread root deleted)
    Closed(ScopeKey),
    /// A user action failed and was rolled back
    Failed(Failure),
}

enum Command {
    SwitchChannel {
        channel_id: ChannelId,
        reply: oneshot::Sender<()>,
    },
    OpenThread {
        root_id: MessageId,
        reply: oneshot::Sender<()>,
    },
    CloseScope {
        scope: ScopeKey,
        reply: oneshot::Sender<bool>,
    },
    Reload {
        scope: ScopeKey,
        reply: oneshot::Sender<AppResult<()>>,
    },
    LoadOlder {
        scope: ScopeKey,
        reply: oneshot::Sender<AppResult<bool>>,
    },
    Send {
        command: SendMessage,
        reply: oneshot::Sender<AppResult<MessageId>>,
    },
    Edit {
        command: EditMessage,
        reply: oneshot::Sender<AppResult<()>>,
    },
    Delete {
        command: DeleteMessage,
        reply: oneshot::Sender<AppResult<()>>,
    },
    React {
        command: ToggleReaction,
        reply: oneshot::Sender<AppResult<()>>,
    },
    Typing {
        scope: ScopeKey,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        scope: ScopeKey,
        reply: oneshot::Sender<Option<ScopeSnapshot>>,
    },
    Resync,
    Shutdown,
}

enum Completion {
    Fetch(FetchCompletion),
    Send {
        nonce: String,
        result: Result<Message, DomainError>,
    },
    Edit {
        op: OpId,
        result: Result<Message, DomainError>,
    },
    Delete {
        message_id: MessageId,
        result: Result<(), DomainError>,
    },
    React {
        op: OpId,
        completed: usize,
        result: Result<(), DomainError>,
    },
}

/// Cloneable front door to a running [`SyncWorker`]
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<SyncUpdate>,
}

impl SyncHandle {
    /// Receive UI updates from now on
    pub fn subscribe_updates(&self) -> broadcast::Receiver<SyncUpdate> {
        self.updates.subscribe()
    }

    /// Make a channel the only open channel scope
    pub async fn switch_channel(&self, channel_id: impl Into<ChannelId>) -> AppResult<()> {
        let channel_id = channel_id.into();
        self.request(|reply| Command::SwitchChannel { channel_id, reply })
            .await
    }

    /// Open the thread rooted at a message
    pub async fn open_thread(&self, root_id: impl Into<MessageId>) -> AppResult<()> {
        let root_id = root_id.into();
        self.request(|reply| Command::OpenThread { root_id, reply })
            .await
    }

    /// Close a scope; `false` if it was not open
    pub async fn close_scope(&self, scope: ScopeKey) -> AppResult<bool> {
        self.request(|reply| Command::CloseScope { scope, reply }).await
    }

    /// Fetch the newest page of an open scope again
    pub async fn reload(&self, scope: ScopeKey) -> AppResult<()> {
        self.request(|reply| Command::Reload { scope, reply })
            .await?
    }

    /// Load the page before the oldest loaded message; `false` if nothing was started
    pub async fn load_older(&self, scope: ScopeKey) -> AppResult<bool> {
        self.request(|reply| Command::LoadOlder { scope, reply })
            .await?
    }

    /// Send a message; returns the provisional id shown until confirmation
    pub async fn send(&self, command: SendMessage) -> AppResult<MessageId> {
        self.request(|reply| Command::Send { command, reply }).await?
    }

    pub async fn edit(&self, command: EditMessage) -> AppResult<()> {
        self.request(|reply| Command::Edit { command, reply }).await?
    }

    pub async fn delete(&self, command: DeleteMessage) -> AppResult<()> {
        self.request(|reply| Command::Delete { command, reply }).await?
    }

    pub async fn toggle_reaction(&self, command: ToggleReaction) -> AppResult<()> {
        self.request(|reply| Command::React { command, reply }).await?
    }

    /// Local keystroke in a scope; `true` if a typing notice went out
    pub async fn typing(&self, scope: ScopeKey) -> AppResult<bool> {
        self.request(|reply| Command::Typing { scope, reply }).await
    }

    /// Current view of an open scope
    pub async fn snapshot(&self, scope: ScopeKey) -> AppResult<Option<ScopeSnapshot>> {
        self.request(|reply| Command::Snapshot { scope, reply }).await
    }

    /// Refetch every loaded scope after the live connection came back
    pub async fn resync(&self) -> AppResult<()> {
        self.commands
            .send(Command::Resync)
            .await
            .map_err(|_| AppError::WorkerStopped)
    }

    /// Stop the worker; pending API calls are abandoned
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> AppResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| AppError::WorkerStopped)?;
        rx.await.map_err(|_| AppError::WorkerStopped)
    }
}

/// Owner of the engine
pub struct SyncWorker {
    engine: ReconciliationEngine,
    api: Arc<dyn MessageApi>,
    live: Arc<dyn LiveChannel>,
    updates: broadcast::Sender<SyncUpdate>,
    done_tx: mpsc::UnboundedSender<Completion>,
}

impl SyncWorker {
    /// Start the worker task.
    ///
    /// `live_events` carries events for the subscribed scopes; the worker
    /// keeps running if it closes.
    pub fn spawn(
        engine: ReconciliationEngine,
        api: Arc<dyn MessageApi>,
        live: Arc<dyn LiveChannel>,
        live_events: mpsc::UnboundedReceiver<LiveEvent>,
    ) -> (SyncHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let worker = Self {
            engine,
            api,
            live,
            updates: updates.clone(),
            done_tx,
        };
        let task = tokio::spawn(worker.run(command_rx, done_rx, live_events));

        (
            SyncHandle {
                commands: command_tx,
                updates,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut done: mpsc::UnboundedReceiver<Completion>,
        mut live_events: mpsc::UnboundedReceiver<LiveEvent>,
    ) {
        tracing::info!(user_id = %self.engine.user_id(), "Sync worker started");

        let mut live_open = true;

        loop {
            let typing_deadline = self.engine.next_typing_expiry().map(Instant::from_std);

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }

                Some(completion) = done.recv() => self.handle_completion(completion),

                event = live_events.recv(), if live_open => {
                    match event {
                        Some(event) => {
                            let changes = self.engine.apply_live(event, now());
                            self.publish(changes);
                        }
                        None => {
                            tracing::warn!("Live event stream closed");
                            live_open = false;
                        }
                    }
                }

                () = tokio::time::sleep_until(typing_deadline.unwrap_or_else(Instant::now)),
                    if typing_deadline.is_some() => {
                    let changes = self.engine.expire_typing(now());
                    self.publish(changes);
                }
            }
        }

        for scope in self.engine.observed_scopes() {
            self.live.unsubscribe(&scope);
        }
        tracing::info!("Sync worker stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SwitchChannel { channel_id, reply } => {
                tracing::debug!(channel_id = %channel_id, "Switching channel");
                let outcome = self.engine.switch_channel(channel_id);
                let mut changes = Changes::default();
                for scope in outcome.closed {
                    changes.close(scope);
                }
                self.publish(changes);
                if let Some(fetch) = outcome.fetch {
                    self.opened(fetch);
                }
                let _ = reply.send(());
            }
            Command::OpenThread { root_id, reply } => {
                if let Some(fetch) = self.engine.open_scope(ScopeKey::Thread(root_id)) {
                    self.opened(fetch);
                }
                let _ = reply.send(());
            }
            Command::CloseScope { scope, reply } => {
                let closed = self.engine.close_scope(&scope);
                if closed {
                    let mut changes = Changes::default();
                    changes.close(scope);
                    self.publish(changes);
                }
                let _ = reply.send(closed);
            }
            Command::Reload { scope, reply } => {
                let result = self.engine.load_initial(&scope).map(|fetch| {
                    self.spawn_fetch(fetch);
                    self.publish_scope(&scope);
                });
                let _ = reply.send(result.map_err(AppError::from));
            }
            Command::LoadOlder { scope, reply } => {
                let result = self.engine.load_older(&scope).map(|fetch| match fetch {
                    Some(fetch) => {
                        self.spawn_fetch(fetch);
                        self.publish_scope(&scope);
                        true
                    }
                    None => false,
                });
                let _ = reply.send(result.map_err(AppError::from));
            }
            Command::Send { command, reply } => {
                let result = self.engine.send(command).map(|(request, changes)| {
                    self.publish(changes);
                    let api = Arc::clone(&self.api);
                    let done = self.done_tx.clone();
                    let provisional_id = request.provisional_id.clone();
                    tokio::spawn(async move {
                        let result = api.send_message(&request.payload).await;
                        let _ = done.send(Completion::Send {
                            nonce: request.payload.nonce,
                            result,
                        });
                    });
                    provisional_id
                });
                let _ = reply.send(result.map_err(AppError::from));
            }
            Command::Edit { command, reply } => {
                let result = self.engine.edit(command).map(|(request, changes)| {
                    self.publish(changes);
                    let api = Arc::clone(&self.api);
                    let done = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = api
                            .edit_message(&request.message_id, &request.content)
                            .await;
                        let _ = done.send(Completion::Edit {
                            op: request.op,
                            result,
                        });
                    });
                });
                let _ = reply.send(result.map_err(AppError::from));
            }
            Command::Delete { command, reply } => {
                let result = self.engine.delete(command).map(|(request, changes)| {
                    self.publish(changes);
                    let api = Arc::clone(&self.api);
                    let done = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = api.delete_message(&request.message_id).await;
                        let _ = done.send(Completion::Delete {
                            message_id: request.message_id,
                            result,
                        });
                    });
                });
                let _ = reply.send(result.map_err(AppError::from));
            }
            Command::React { command, reply } => {
                let result = self.engine.react(command).map(|(request, changes)| {
                    self.publish(changes);
                    self.spawn_reaction(request);
                });
                let _ = reply.send(result.map_err(AppError::from));
            }
            Command::Typing { scope, reply } => {
                let sent = self.engine.local_typing(&scope, now()) && self.live.send_typing(&scope);
                let _ = reply.send(sent);
            }
            Command::Snapshot { scope, reply } => {
                let _ = reply.send(self.engine.snapshot(&scope));
            }
            Command::Resync => {
                let fetches = self.engine.resync();
                tracing::info!(scopes = fetches.len(), "Resyncing after reconnect");
                for fetch in fetches {
                    self.spawn_fetch(fetch);
                }
            }
            // Handled by the loop
            Command::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let changes = match completion {
            Completion::Fetch(completion) => self.engine.complete_fetch(completion).changes(),
            Completion::Send { nonce, result } => self.engine.complete_send(&nonce, result),
            Completion::Edit { op, result } => self.engine.complete_edit(op, result),
            Completion::Delete { message_id, result } => {
                self.engine.complete_delete(&message_id, result)
            }
            Completion::React {
                op,
                completed,
                result,
            } => self.engine.complete_react(op, completed, result),
        };
        self.publish(changes);
    }

    // A scope was just opened: subscribe, fetch, show it as loading
    fn opened(&mut self, fetch: FetchRequest) {
        self.live.subscribe(&fetch.scope);
        let scope = fetch.scope.clone();
        self.spawn_fetch(fetch);
        self.publish_scope(&scope);
    }

    fn spawn_fetch(&self, fetch: FetchRequest) {
        let api = Arc::clone(&self.api);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = api
                .list_messages(&fetch.scope, fetch.before.as_ref(), fetch.limit)
                .await;
            let _ = done.send(Completion::Fetch(fetch.complete(result)));
        });
    }

    fn spawn_reaction(&self, request: ReactionRequest) {
        let api = Arc::clone(&self.api);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let mut completed = 0;
            let mut result = Ok(());
            for call in &request.calls {
                let outcome = match call {
                    ReactionCall::Add(emoji) => api.add_reaction(&request.message_id, emoji).await,
                    ReactionCall::Remove(emoji) => {
                        api.remove_reaction(&request.message_id, emoji).await
                    }
                };
                if let Err(e) = outcome {
                    result = Err(e);
                    break;
                }
                completed += 1;
            }
            let _ = done.send(Completion::React {
                op: request.op,
                completed,
                result,
            });
        });
    }

    fn publish(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        for scope in &changes.scopes {
            self.publish_scope(scope);
        }
        for scope in changes.typing {
            let users = self.engine.typing_users(&scope);
            let _ = self.updates.send(SyncUpdate::Typing { scope, users });
        }
        for scope in changes.closed {
            self.live.unsubscribe(&scope);
            let _ = self.updates.send(SyncUpdate::Closed(scope));
        }
        if let Some(failure) = changes.failure {
            tracing::debug!(action = failure.action.as_str(), error = %failure.error, "Action failed");
            let _ = self.updates.send(SyncUpdate::Failed(failure));
        }
    }

    fn publish_scope(&self, scope: &ScopeKey) {
        if let Some(snapshot) = self.engine.snapshot(scope) {
            let _ = self.updates.send(SyncUpdate::Scope(snapshot));
        }
    }
}

// Follows tokio's clock so paused-time tests drive typing expiry
fn now() -> std::time::Instant {
    Instant::now().into_std()
}
