//! Session wiring
//!
//! Builds the live connection, the subscription manager and the sync worker
//! for one authenticated user, and watches the connection for the signals
//! that need a resync or end the session.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use chat_common::{AppConfig, AppError, AppResult, TokenAuth};
use chat_core::{AuthProvider, LiveChannel, MessageApi, UserId};
use chat_sync::{ReconciliationEngine, SyncHandle, SyncWorker};
use chat_transport::{
    Connector, HttpMessageApi, SubscriptionManager, TransportClient, TransportSignal, WsConnector,
};

/// A running session
pub struct ChatSession {
    user_id: UserId,
    transport: TransportClient,
    subscriptions: Arc<SubscriptionManager>,
    handle: SyncHandle,
    worker: JoinHandle<()>,
    supervisor: JoinHandle<()>,
    fatal: watch::Receiver<Option<TransportSignal>>,
}

impl ChatSession {
    /// Connect with the HTTP API and the WebSocket gateway from `config`
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let token = config.auth.token.clone().ok_or(AppError::Unauthenticated)?;
        let auth: Arc<dyn AuthProvider> = Arc::new(TokenAuth::new(token));
        let api = HttpMessageApi::new(&config.api, Arc::clone(&auth)).map_err(AppError::internal)?;
        Self::start(config, Arc::new(api), Arc::new(WsConnector), auth).await
    }

    /// Connect and start syncing.
    ///
    /// Returns once the first handshake completed, since the engine needs the
    /// user id the server reports.
    pub async fn start(
        config: &AppConfig,
        api: Arc<dyn MessageApi>,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthProvider>,
    ) -> AppResult<Self> {
        let transport = TransportClient::new(
            config.gateway.url.clone(),
            connector,
            auth,
            config.reconnect.clone(),
        );
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new(transport.clone(), events_tx);

        let mut signals = transport.signals();
        transport.connect()?;
        let user_id = match wait_connected(&transport, &mut signals).await {
            Ok(user_id) => user_id,
            Err(e) => {
                subscriptions.detach();
                transport.disconnect();
                return Err(e);
            }
        };
        tracing::info!(user_id = %user_id, "Session established");

        let engine = ReconciliationEngine::new(user_id.clone(), &config.sync);
        let (handle, worker) = SyncWorker::spawn(
            engine,
            api,
            Arc::clone(&subscriptions) as Arc<dyn LiveChannel>,
            events_rx,
        );

        let (fatal_tx, fatal) = watch::channel(None);
        let supervisor = tokio::spawn(supervise(signals, handle.clone(), fatal_tx));

        Ok(Self {
            user_id,
            transport,
            subscriptions,
            handle,
            worker,
            supervisor,
            fatal,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Front door to the sync worker
    pub fn handle(&self) -> &SyncHandle {
        &self.handle
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Resolves when the connection is gone for good
    pub async fn terminated(&self) -> AppError {
        let mut fatal = self.fatal.clone();
        let error = match fatal.wait_for(Option::is_some).await {
            Ok(signal) => (*signal).as_ref().map_or(AppError::NotConnected, fatal_error),
            Err(_) => AppError::WorkerStopped,
        };
        error
    }

    /// Stop the worker and close the connection
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "Sync worker ended abnormally");
        }
        self.supervisor.abort();
        self.subscriptions.detach();
        self.transport.disconnect();
        tracing::info!("Session closed");
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("user_id", &self.user_id)
            .field("transport", &self.transport)
            .finish()
    }
}

async fn wait_connected(
    transport: &TransportClient,
    signals: &mut broadcast::Receiver<TransportSignal>,
) -> AppResult<UserId> {
    loop {
        match signals.recv().await {
            Ok(TransportSignal::Connected) => {
                return transport
                    .user_id()
                    .ok_or_else(|| AppError::internal_msg("handshake completed without a user id"));
            }
            Ok(signal) if signal.is_fatal() => return Err(fatal_error(&signal)),
            Ok(TransportSignal::Reconnecting { attempt, delay }) => {
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Still connecting");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Missed connection signals");
                if let Some(user_id) = transport.user_id().filter(|_| transport.is_connected()) {
                    return Ok(user_id);
                }
            }
            Err(broadcast::error::RecvError::Closed) => return Err(AppError::NotConnected),
        }
    }
}

// Every Connected after the first is a reconnect: refetch what the gap may have hidden
async fn supervise(
    mut signals: broadcast::Receiver<TransportSignal>,
    handle: SyncHandle,
    fatal: watch::Sender<Option<TransportSignal>>,
) {
    loop {
        match signals.recv().await {
            Ok(TransportSignal::Connected) => {
                tracing::info!("Reconnected, resyncing open scopes");
                if handle.resync().await.is_err() {
                    break;
                }
            }
            Ok(TransportSignal::Disconnected) => tracing::warn!("Connection lost"),
            Ok(signal) if signal.is_fatal() => {
                tracing::error!(signal = ?signal, "Session terminated");
                let _ = fatal.send(Some(signal));
                break;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Missed connection signals");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn fatal_error(signal: &TransportSignal) -> AppError {
    match signal {
        TransportSignal::ReconnectFailed { attempts } => AppError::ReconnectExhausted {
            attempts: *attempts,
        },
        TransportSignal::AuthRejected => AppError::Unauthenticated,
        other => AppError::internal_msg(format!("unexpected signal {other:?}")),
    }
}
