//! Reconciliation properties
//!
//! Exercise the engine directly with scripted pages and live events, the way
//! the worker feeds it.
//!
//! Run with: cargo test -p integration-tests --test sync_tests

use std::time::Instant;

use chat_core::{
    ChannelId, DomainError, LiveEvent, MessageDeletedEvent, MessageId, MessagePage, ScopeKey,
    UserId,
};
use chat_sync::{EditMessage, ReconciliationEngine, ToggleReaction};
use integration_tests::*;

fn engine() -> ReconciliationEngine {
    ReconciliationEngine::new(UserId::from("me"), &test_settings())
}

fn channel(id: &str) -> ScopeKey {
    ScopeKey::channel(id)
}

/// Open `channel_id` and complete its initial fetch with `page`
fn open_with(engine: &mut ReconciliationEngine, channel_id: &str, page: Vec<chat_core::Message>) {
    let fetch = engine
        .switch_channel(ChannelId::from(channel_id))
        .fetch
        .expect("initial fetch");
    engine.complete_fetch(fetch.complete(Ok(MessagePage::new(page))));
}

fn live(engine: &mut ReconciliationEngine, event: LiveEvent) {
    engine.apply_live(event, Instant::now());
}

// ============================================================================
// Ordering and deduplication
// ============================================================================

#[test]
fn test_out_of_order_live_delivery_is_sorted() {
    let mut engine = engine();
    open_with(&mut engine, "c1", Vec::new());

    for (id, secs) in [("t3", 3), ("t1", 1), ("t2", 2)] {
        live(&mut engine, LiveEvent::MessageCreated(message(id, "c1", "u2", secs)));
    }
    assert_eq!(ids(engine.messages(&channel("c1"))), vec!["t1", "t2", "t3"]);
}

#[test]
fn test_same_message_from_page_and_live_appears_once() {
    let mut engine = engine();
    let m1 = message("m1", "c1", "u2", 1);
    let m2 = message("m2", "c1", "u2", 2);

    let fetch = engine.switch_channel(ChannelId::from("c1")).fetch.unwrap();
    // The live copy lands while the page is in flight
    live(&mut engine, LiveEvent::MessageCreated(m2.clone()));
    engine.complete_fetch(fetch.complete(Ok(MessagePage::new(vec![m1, m2.clone()]))));
    live(&mut engine, LiveEvent::MessageCreated(m2));

    assert_eq!(ids(engine.messages(&channel("c1"))), vec!["m1", "m2"]);
}

#[test]
fn test_update_and_stale_page_converge_in_either_order() {
    let m1 = message("m1", "c1", "u2", 1);
    let mut edited = m1.clone();
    edited.edit("edited", at(100));

    for update_first in [true, false] {
        let mut engine = engine();
        let fetch = engine.switch_channel(ChannelId::from("c1")).fetch.unwrap();
        live(&mut engine, LiveEvent::MessageCreated(m1.clone()));

        // The page was read before the edit
        let page = fetch.complete(Ok(MessagePage::new(vec![m1.clone()])));
        if update_first {
            live(&mut engine, LiveEvent::MessageUpdated(edited.clone()));
            engine.complete_fetch(page);
        } else {
            engine.complete_fetch(page);
            live(&mut engine, LiveEvent::MessageUpdated(edited.clone()));
        }

        let held = engine.messages(&channel("c1"));
        assert_eq!(ids(held), vec!["m1"], "update first: {update_first}");
        assert_eq!(held[0].content, "edited", "update first: {update_first}");
        assert_eq!(held[0].edited_at, Some(at(100)));
    }
}

#[test]
fn test_page_copy_keeps_live_reactions() {
    let mut engine = engine();
    let m1 = message("m1", "c1", "u2", 1);
    let fetch = engine.switch_channel(ChannelId::from("c1")).fetch.unwrap();
    live(&mut engine, LiveEvent::MessageCreated(m1.clone()));
    live(&mut engine, reaction_event("m1", "c1", "u3", "👍", true));

    engine.complete_fetch(fetch.complete(Ok(MessagePage::new(vec![m1]))));
    let held = &engine.messages(&channel("c1"))[0];
    assert_eq!(held.reaction("👍").map(|r| r.count), Some(1));
}

#[test]
fn test_equal_timestamps_order_by_id() {
    let mut engine = engine();
    open_with(
        &mut engine,
        "c1",
        vec![message("b", "c1", "u2", 5), message("a", "c1", "u2", 5)],
    );
    assert_eq!(ids(engine.messages(&channel("c1"))), vec!["a", "b"]);
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_tombstone_absorbs_late_events() {
    let mut engine = engine();
    open_with(&mut engine, "c1", vec![message("m1", "c1", "u2", 1)]);

    live(
        &mut engine,
        LiveEvent::MessageDeleted(MessageDeletedEvent {
            message_id: MessageId::from("m1"),
            channel_id: ChannelId::from("c1"),
            thread_id: None,
        }),
    );
    assert!(engine.messages(&channel("c1")).is_empty());

    // A delayed create and update for the deleted id change nothing
    live(&mut engine, LiveEvent::MessageCreated(message("m1", "c1", "u2", 1)));
    live(&mut engine, LiveEvent::MessageUpdated(message("m1", "c1", "u2", 1)));
    assert!(engine.messages(&channel("c1")).is_empty());

    // Nor does a resync page that still contains it
    let fetch = engine.resync().pop().expect("resync fetch");
    engine.complete_fetch(fetch.complete(Ok(MessagePage::new(vec![message("m1", "c1", "u2", 1)]))));
    assert!(engine.messages(&channel("c1")).is_empty());
}

// ============================================================================
// Pagination
// ============================================================================

#[test]
fn test_older_page_prepends_without_reorder() {
    let all = history("c1", 100);
    let mut engine = engine();
    open_with(&mut engine, "c1", all[50..].to_vec());

    let snapshot = engine.snapshot(&channel("c1")).unwrap();
    assert_eq!(snapshot.messages.len(), 50);
    assert!(snapshot.has_more);

    let older = engine.load_older(&channel("c1")).unwrap().expect("older fetch");
    assert_eq!(older.before, Some(MessageId::from("m050")));
    assert_eq!(older.limit, 50);
    // Overlapping page: the boundary message comes back once more
    engine.complete_fetch(older.complete(Ok(MessagePage::new(all[0..=50].to_vec()))));

    assert_eq!(ids(engine.messages(&channel("c1"))), ids(&all));

    let last = engine.load_older(&channel("c1")).unwrap().expect("final fetch");
    engine.complete_fetch(last.complete(Ok(MessagePage::new(Vec::new()))));
    let snapshot = engine.snapshot(&channel("c1")).unwrap();
    assert!(!snapshot.has_more);
    assert_eq!(snapshot.messages.len(), 100);
    assert!(engine.load_older(&channel("c1")).unwrap().is_none());
}

#[test]
fn test_load_older_requires_loaded_scope() {
    let mut engine = engine();
    let err = engine.load_older(&channel("nowhere")).unwrap_err();
    assert_eq!(err, DomainError::ScopeNotLoaded(channel("nowhere")));
}

// ============================================================================
// Scope switching
// ============================================================================

#[test]
fn test_stale_page_never_touches_new_scope() {
    let mut engine = engine();
    let fetch_a = engine.switch_channel(ChannelId::from("a")).fetch.unwrap();
    let outcome = engine.switch_channel(ChannelId::from("b"));
    assert_eq!(outcome.closed, vec![channel("a")]);
    let fetch_b = outcome.fetch.unwrap();

    engine.complete_fetch(fetch_b.complete(Ok(MessagePage::new(vec![message("b1", "b", "u2", 1)]))));
    engine.complete_fetch(fetch_a.complete(Ok(MessagePage::new(vec![message("a1", "a", "u2", 1)]))));

    assert_eq!(ids(engine.messages(&channel("b"))), vec!["b1"]);
    assert!(engine.snapshot(&channel("a")).is_none());
    assert_eq!(engine.observed_scopes(), vec![channel("b")]);
}

// ============================================================================
// Reactions
// ============================================================================

#[test]
fn test_remote_reaction_switch_converges() {
    let mut engine = engine();
    open_with(&mut engine, "c1", vec![message("m1", "c1", "u2", 1)]);

    live(&mut engine, reaction_event("m1", "c1", "u3", "👍", true));
    live(&mut engine, reaction_event("m1", "c1", "u3", "❤️", true));

    let m1 = &engine.messages(&channel("c1"))[0];
    assert!(m1.reaction("👍").is_none());
    assert_eq!(m1.reaction("❤️").map(|r| r.count), Some(1));

    // Duplicate delivery is harmless
    live(&mut engine, reaction_event("m1", "c1", "u3", "❤️", true));
    assert_eq!(engine.messages(&channel("c1"))[0].reactions.len(), 1);
}

#[test]
fn test_self_toggle_cancels() {
    let mut engine = engine();
    open_with(&mut engine, "c1", vec![message("m1", "c1", "u2", 1)]);
    let me = UserId::from("me");

    let (add, _) = engine.react(ToggleReaction::new("m1", "👍")).unwrap();
    engine.complete_react(add.op, add.calls.len(), Ok(()));
    assert_eq!(engine.messages(&channel("c1"))[0].reaction_of(&me), Some("👍"));

    let (remove, _) = engine.react(ToggleReaction::new("m1", "👍")).unwrap();
    engine.complete_react(remove.op, remove.calls.len(), Ok(()));
    let m1 = &engine.messages(&channel("c1"))[0];
    assert_eq!(m1.reaction_of(&me), None);
    assert!(m1.reaction("👍").is_none());
}

#[test]
fn test_reaction_echo_matches_optimistic_state() {
    let mut engine = engine();
    open_with(&mut engine, "c1", vec![message("m1", "c1", "u2", 1)]);

    let (request, _) = engine.react(ToggleReaction::new("m1", "🎉")).unwrap();
    // Our own reaction comes back live before the call completes
    live(&mut engine, reaction_event("m1", "c1", "me", "🎉", true));
    engine.complete_react(request.op, request.calls.len(), Ok(()));

    let m1 = &engine.messages(&channel("c1"))[0];
    assert_eq!(m1.reaction("🎉").map(|r| r.count), Some(1));
}

#[test]
fn test_overlapping_toggle_survives_earlier_failure() {
    let mut engine = engine();
    open_with(&mut engine, "c1", vec![message("m1", "c1", "u2", 1)]);
    let me = UserId::from("me");

    let (add, _) = engine.react(ToggleReaction::new("m1", "👍")).unwrap();
    engine.complete_react(add.op, add.calls.len(), Ok(()));

    // Clear 👍, then pick ❤️ before the clear has completed
    let (clear, _) = engine.react(ToggleReaction::new("m1", "👍")).unwrap();
    let (pick, _) = engine.react(ToggleReaction::new("m1", "❤️")).unwrap();
    assert_eq!(pick.calls, vec![chat_sync::engine::ReactionCall::Add("❤️".to_string())]);

    let changes = engine.complete_react(clear.op, 0, Err(DomainError::Timeout));
    assert!(changes.failure.is_some());
    engine.complete_react(pick.op, pick.calls.len(), Ok(()));

    let m1 = &engine.messages(&channel("c1"))[0];
    assert_eq!(m1.reaction_of(&me), Some("❤️"));
    assert!(m1.reaction("👍").is_none());
}

// ============================================================================
// Edits
// ============================================================================

#[test]
fn test_failed_edit_keeps_update_from_elsewhere() {
    let mut engine = engine();
    open_with(&mut engine, "c1", vec![message("m1", "c1", "me", 1)]);

    let (request, _) = engine.edit(EditMessage::new("m1", "draft")).unwrap();
    let mut elsewhere = message("m1", "c1", "me", 1);
    elsewhere.edit("from phone", chrono::Utc::now() + chrono::Duration::minutes(1));
    live(&mut engine, LiveEvent::MessageUpdated(elsewhere));

    let changes = engine.complete_edit(request.op, Err(DomainError::Timeout));
    assert!(changes.failure.is_some());
    assert_eq!(engine.messages(&channel("c1"))[0].content, "from phone");
}

#[test]
fn test_failed_edit_without_interference_rolls_back() {
    let mut engine = engine();
    open_with(&mut engine, "c1", vec![message("m1", "c1", "me", 1)]);

    let (request, _) = engine.edit(EditMessage::new("m1", "draft")).unwrap();
    engine.complete_edit(request.op, Err(DomainError::Timeout));

    let m1 = &engine.messages(&channel("c1"))[0];
    assert_eq!(m1.content, "message m1");
    assert!(!m1.edited);
}

// ============================================================================
// Typing
// ============================================================================

#[test]
fn test_typing_expires_after_ttl() {
    let mut engine = engine();
    open_with(&mut engine, "c1", Vec::new());
    let start = Instant::now();

    engine.apply_live(typing_event("c1", "u2"), start);
    assert_eq!(engine.typing_users(&channel("c1")), vec![UserId::from("u2")]);

    let changes = engine.expire_typing(start + test_settings().typing_ttl + std::time::Duration::from_secs(1));
    assert_eq!(changes.typing, vec![channel("c1")]);
    assert!(engine.typing_users(&channel("c1")).is_empty());
}
