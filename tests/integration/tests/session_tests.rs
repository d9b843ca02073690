//! End-to-end session tests
//!
//! A full `ChatSession` (transport, subscriptions, sync worker) against the
//! in-memory gateway and the scripted message API.
//!
//! Run with: cargo test -p integration-tests --test session_tests

use std::sync::Arc;
use std::time::Duration;

use chat_client::ChatSession;
use chat_common::{AppError, TokenAuth};
use chat_core::{DomainError, MessageId, ScopeKey};
use chat_sync::{ActionKind, DeleteMessage, SendMessage, SyncUpdate, ToggleReaction};
use chat_transport::{GatewayMessage, TransportSignal};
use integration_tests::*;
use tokio::sync::mpsc;

struct Harness {
    session: ChatSession,
    api: Arc<ScriptedApi>,
    gateway: Arc<FakeGateway>,
    link: ServerLink,
    links: mpsc::UnboundedReceiver<ServerLink>,
}

async fn start(api: ScriptedApi) -> Harness {
    let (gateway, mut links) = FakeGateway::start();
    let api = Arc::new(api);
    let config = test_config();
    let auth = Arc::new(TokenAuth::new("test-token"));

    let (session, link) = tokio::join!(
        ChatSession::start(&config, api.clone(), gateway.clone(), auth),
        async {
            let mut link = next_link(&mut links).await;
            link.accept("me", QUIET_HEARTBEAT_MS).await;
            link
        }
    );

    Harness {
        session: session.expect("session start"),
        api,
        gateway,
        link,
        links,
    }
}

fn c1() -> ScopeKey {
    ScopeKey::channel("c1")
}

/// Open c1 and wait for its first page
async fn open_c1(harness: &mut Harness) -> tokio::sync::broadcast::Receiver<SyncUpdate> {
    let mut updates = harness.session.handle().subscribe_updates();
    harness.session.handle().switch_channel("c1").await.unwrap();
    assert_eq!(harness.link.joined(1).await, vec![c1()]);
    wait_update(&mut updates, |u| loaded_ids(u, &c1()).is_some()).await;
    updates
}

fn has_ids(update: &SyncUpdate, scope: &ScopeKey, expected: &[&str]) -> bool {
    loaded_ids(update, scope).is_some_and(|ids| ids == expected)
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn test_start_reports_user() {
    let harness = start(ScriptedApi::new("me")).await;
    assert_eq!(harness.session.user_id().as_str(), "me");
    assert!(harness.session.transport().is_connected());
    harness.session.shutdown().await;
}

#[tokio::test]
async fn test_start_fails_on_rejected_credential() {
    let (gateway, mut links) = FakeGateway::start();
    let config = test_config();
    let auth = Arc::new(TokenAuth::new("expired"));

    let (session, ()) = tokio::join!(
        ChatSession::start(&config, Arc::new(ScriptedApi::new("me")), gateway, auth),
        async {
            let mut link = next_link(&mut links).await;
            link.reject().await;
        }
    );
    assert!(matches!(session, Err(AppError::Unauthenticated)));
}

// ============================================================================
// Loading and live events
// ============================================================================

#[tokio::test]
async fn test_open_channel_loads_then_applies_live() {
    let api = ScriptedApi::new("me").with_history(c1(), history("c1", 3));
    let mut harness = start(api).await;
    let mut updates = harness.session.handle().subscribe_updates();

    harness.session.handle().switch_channel("c1").await.unwrap();
    assert_eq!(harness.link.joined(1).await, vec![c1()]);
    wait_update(&mut updates, |u| has_ids(u, &c1(), &["m000", "m001", "m002"])).await;

    // Out of order: the later message arrives first
    let late = message("m010", "c1", "u2", 10);
    let early = message("m005", "c1", "u2", 5);
    harness.link.dispatch("MESSAGE_CREATED", 2, serde_json::to_value(&late).unwrap());
    harness.link.dispatch("MESSAGE_CREATED", 3, serde_json::to_value(&early).unwrap());
    wait_update(&mut updates, |u| {
        has_ids(u, &c1(), &["m000", "m001", "m002", "m005", "m010"])
    })
    .await;

    // Events for other channels are filtered out
    let elsewhere = message("x1", "c2", "u2", 20);
    harness.link.dispatch("MESSAGE_CREATED", 4, serde_json::to_value(&elsewhere).unwrap());
    let snapshot = harness.session.handle().snapshot(c1()).await.unwrap().unwrap();
    assert_eq!(snapshot.messages.len(), 5);

    harness.session.shutdown().await;
}

#[tokio::test]
async fn test_load_older_pages() {
    let api = ScriptedApi::new("me").with_history(c1(), history("c1", 120));
    let mut harness = start(api).await;
    let mut updates = open_c1(&mut harness).await;

    let snapshot = harness.session.handle().snapshot(c1()).await.unwrap().unwrap();
    assert_eq!(snapshot.messages.len(), 50);
    assert!(snapshot.has_more);

    assert!(harness.session.handle().load_older(c1()).await.unwrap());
    let update = wait_update(&mut updates, |u| {
        loaded_ids(u, &c1()).is_some_and(|ids| ids.len() == 100)
    })
    .await;
    let ids = loaded_ids(&update, &c1()).unwrap();
    assert_eq!(ids.first().map(String::as_str), Some("m020"));
    assert_eq!(ids.last().map(String::as_str), Some("m119"));

    harness.session.shutdown().await;
}

#[tokio::test]
async fn test_stale_page_discarded_after_switch() {
    let api = ScriptedApi::new("me")
        .with_history(ScopeKey::channel("a"), vec![message("a1", "a", "u2", 1)])
        .with_history(ScopeKey::channel("b"), vec![message("b1", "b", "u2", 1)]);
    let gate = api.gate(ScopeKey::channel("a"));
    let harness = start(api).await;
    let handle = harness.session.handle().clone();
    let mut updates = handle.subscribe_updates();

    handle.switch_channel("a").await.unwrap();
    handle.switch_channel("b").await.unwrap();
    wait_update(&mut updates, |u| has_ids(u, &ScopeKey::channel("b"), &["b1"])).await;

    // A's page arrives after the switch
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.api.count("list channel:a"), 1);
    assert!(handle.snapshot(ScopeKey::channel("a")).await.unwrap().is_none());
    let b = handle.snapshot(ScopeKey::channel("b")).await.unwrap().unwrap();
    assert_eq!(ids(&b.messages), vec!["b1"]);

    harness.session.shutdown().await;
}

// ============================================================================
// Reconnect
// ============================================================================

#[tokio::test]
async fn test_reconnect_rejoins_and_resyncs() {
    let api = ScriptedApi::new("me").with_history(c1(), history("c1", 2));
    let mut harness = start(api).await;
    let mut updates = open_c1(&mut harness).await;
    let mut signals = harness.session.transport().signals();

    // Server goes away; a message is posted while we are offline
    harness.link.close(1001);
    harness.api.push_history(message("gap", "c1", "u2", 50));

    harness.link = next_link(&mut harness.links).await;
    harness.link.accept("me", QUIET_HEARTBEAT_MS).await;
    wait_signal(&mut signals, |s| *s == TransportSignal::Connected).await;
    assert_eq!(harness.link.joined(1).await, vec![c1()]);

    wait_update(&mut updates, |u| has_ids(u, &c1(), &["m000", "m001", "gap"])).await;
    assert_eq!(harness.api.count("list channel:c1"), 2);
    assert_eq!(harness.gateway.attempts(), 2);

    harness.session.shutdown().await;
}

// ============================================================================
// Optimistic mutations
// ============================================================================

#[tokio::test]
async fn test_send_confirmed_and_echo_deduplicated() {
    let mut harness = start(ScriptedApi::new("me")).await;
    let mut updates = open_c1(&mut harness).await;
    let handle = harness.session.handle().clone();

    let provisional_id = handle.send(SendMessage::new("c1", "hello")).await.unwrap();
    assert!(provisional_id.is_provisional());
    wait_update(&mut updates, |u| has_ids(u, &c1(), &["srv-1"])).await;

    // The live echo of our own message changes nothing
    let echo = harness.api.sent("hello").unwrap();
    harness.link.dispatch("MESSAGE_CREATED", 2, serde_json::to_value(&echo).unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = handle.snapshot(c1()).await.unwrap().unwrap();
    assert_eq!(ids(&snapshot.messages), vec!["srv-1"]);
    assert_eq!(snapshot.messages[0].content, "hello");

    harness.session.shutdown().await;
}

#[tokio::test]
async fn test_send_failure_rolls_back() {
    let mut harness = start(ScriptedApi::new("me")).await;
    let mut updates = open_c1(&mut harness).await;
    harness.api.fail_next(
        ApiCall::Send,
        DomainError::Rejected {
            status: 503,
            message: "unavailable".to_string(),
        },
    );

    harness
        .session
        .handle()
        .send(SendMessage::new("c1", "hello"))
        .await
        .unwrap();
    let update = wait_update(&mut updates, |u| matches!(u, SyncUpdate::Failed(_))).await;
    let SyncUpdate::Failed(failure) = update else {
        unreachable!()
    };
    assert_eq!(failure.action, ActionKind::Send);
    assert!(failure.is_retryable());

    let snapshot = harness.session.handle().snapshot(c1()).await.unwrap().unwrap();
    assert!(snapshot.messages.is_empty());

    harness.session.shutdown().await;
}

#[tokio::test]
async fn test_invalid_send_rejected_before_mutation() {
    let mut harness = start(ScriptedApi::new("me")).await;
    let _updates = open_c1(&mut harness).await;

    let err = harness
        .session
        .handle()
        .send(SendMessage::new("c1", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Domain(DomainError::EmptyContent)));
    assert_eq!(harness.api.count("send"), 0);

    harness.session.shutdown().await;
}

#[tokio::test]
async fn test_reaction_rollback() {
    let api = ScriptedApi::new("me").with_history(c1(), history("c1", 1));
    let mut harness = start(api).await;
    let mut updates = open_c1(&mut harness).await;
    harness.api.fail_next(ApiCall::AddReaction, DomainError::Timeout);

    harness
        .session
        .handle()
        .toggle_reaction(ToggleReaction::new("m000", "👍"))
        .await
        .unwrap();
    let update = wait_update(&mut updates, |u| matches!(u, SyncUpdate::Failed(_))).await;
    let SyncUpdate::Failed(failure) = update else {
        unreachable!()
    };
    assert_eq!(failure.action, ActionKind::React);

    let snapshot = harness.session.handle().snapshot(c1()).await.unwrap().unwrap();
    assert!(snapshot.messages[0].reactions.is_empty());
    assert_eq!(harness.api.calls().last().map(String::as_str), Some("react+ m000 👍"));

    harness.session.shutdown().await;
}

#[tokio::test]
async fn test_delete_then_late_update_ignored() {
    let api = ScriptedApi::new("me").with_history(c1(), history("c1", 2));
    let mut harness = start(api).await;
    let mut updates = open_c1(&mut harness).await;

    harness
        .session
        .handle()
        .delete(DeleteMessage::new("m000"))
        .await
        .unwrap();
    wait_update(&mut updates, |u| has_ids(u, &c1(), &["m001"])).await;

    let stale = message("m000", "c1", "u2", 0);
    harness.link.dispatch("MESSAGE_UPDATED", 2, serde_json::to_value(&stale).unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = harness.session.handle().snapshot(c1()).await.unwrap().unwrap();
    assert_eq!(ids(&snapshot.messages), vec!["m001"]);
    assert!(!snapshot.messages.iter().any(|m| m.id == MessageId::from("m000")));

    harness.session.shutdown().await;
}

// ============================================================================
// Termination
// ============================================================================

#[tokio::test]
async fn test_auth_rejection_ends_session() {
    let harness = start(ScriptedApi::new("me")).await;

    harness.link.send(&GatewayMessage::invalid_session());
    let err = tokio::time::timeout(WAIT, harness.session.terminated())
        .await
        .expect("session should terminate");
    assert!(matches!(err, AppError::Unauthenticated));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_reconnect_exhaustion_ends_session() {
    let harness = start(ScriptedApi::new("me")).await;
    harness.gateway.refuse_all();

    drop(harness.link);
    let err = tokio::time::timeout(WAIT, harness.session.terminated())
        .await
        .expect("session should terminate");
    assert!(matches!(err, AppError::ReconnectExhausted { attempts: 3 }));
    assert_eq!(harness.gateway.attempts(), 4);
}
