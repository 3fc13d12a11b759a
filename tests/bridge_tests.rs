// ABOUTME: Tests for the event bridge - create-only handling, sender enrichment, and cleanup ordering
// ABOUTME: Drives handle_room_message directly and the attach/detach cycle through MockGitter

mod common;

use common::{eventually, message_model, room, user, MockGitter};
use puppet_gitter::gitter::{GitterApi, MessageOperation, RoomMessageEvent};
use puppet_gitter::puppet_core::{
    CacheConfig, CacheNamespace, EventEmitter, PuppetError, PuppetEvent,
};
use puppet_gitter::{handle_room_message, BridgeOutcome, EventBridge, GitterRawCache};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn started_cache(root: &TempDir) -> Arc<GitterRawCache> {
    let namespace = CacheNamespace::new("PuppetGitter", "U0").unwrap();
    let cache = Arc::new(GitterRawCache::new(namespace, CacheConfig::new(root.path())));
    cache.start().unwrap();
    cache
}

fn event(operation: MessageOperation, model: serde_json::Value) -> RoomMessageEvent {
    RoomMessageEvent { operation, model }
}

// =============================================================================
// handle_room_message
// =============================================================================

#[tokio::test]
async fn test_create_caches_message_with_room_and_announces_id() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let emitter = EventEmitter::new();
    let mut events = emitter.subscribe();
    let alice = user("U1", "Alice");

    let outcome = handle_room_message(
        &cache,
        &emitter,
        "R1",
        RoomMessageEvent::create(message_model("M1", "hello", Some(&alice))),
    )
    .unwrap();
    assert_eq!(outcome, BridgeOutcome::Bridged);

    let cached = cache.message("M1").unwrap().unwrap();
    assert_eq!(cached.room_id, "R1");
    assert_eq!(cached.message.text, "hello");
    assert_eq!(cached.message.from_user.as_ref().unwrap().id, "U1");

    assert_eq!(
        events.recv().await.unwrap(),
        PuppetEvent::Message {
            message_id: "M1".to_string()
        }
    );

    assert_eq!(cache.contact("U1").unwrap(), Some(alice));
}

#[tokio::test]
async fn test_known_sender_is_not_overwritten() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let emitter = EventEmitter::new();

    let original = user("U1", "Alice");
    cache.set_contact("U1", &original).unwrap();

    let renamed = user("U1", "Alice Renamed");
    handle_room_message(
        &cache,
        &emitter,
        "R1",
        RoomMessageEvent::create(message_model("M1", "hi", Some(&renamed))),
    )
    .unwrap();

    assert_eq!(cache.contact("U1").unwrap().unwrap().display_name, "Alice");
}

#[tokio::test]
async fn test_message_without_sender_is_still_bridged() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let emitter = EventEmitter::new();

    let outcome = handle_room_message(
        &cache,
        &emitter,
        "R1",
        RoomMessageEvent::create(message_model("M1", "system notice", None)),
    )
    .unwrap();

    assert_eq!(outcome, BridgeOutcome::Bridged);
    assert!(cache.message("M1").unwrap().is_some());
    assert!(cache.contact_ids().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_create_operations_are_ignored() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let emitter = EventEmitter::new();
    let mut events = emitter.subscribe();
    let alice = user("U1", "Alice");

    for operation in [
        MessageOperation::Update,
        MessageOperation::Patch,
        MessageOperation::Remove,
        MessageOperation::Unknown,
    ] {
        let outcome = handle_room_message(
            &cache,
            &emitter,
            "R1",
            event(operation, message_model("M1", "edited", Some(&alice))),
        )
        .unwrap();
        assert_eq!(outcome, BridgeOutcome::Ignored);
    }

    assert!(cache.message("M1").unwrap().is_none());
    assert!(cache.contact_ids().unwrap().is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_model_fails_without_side_effects() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let emitter = EventEmitter::new();
    let mut events = emitter.subscribe();

    let err = handle_room_message(
        &cache,
        &emitter,
        "R1",
        RoomMessageEvent::create(json!({ "text": "no id" })),
    )
    .unwrap_err();
    assert!(matches!(err, PuppetError::Serialization(_)));
    assert!(events.try_recv().is_err());

    // The next well-formed message still goes through
    handle_room_message(
        &cache,
        &emitter,
        "R1",
        RoomMessageEvent::create(message_model("M2", "ok", None)),
    )
    .unwrap();
    assert!(cache.message("M2").unwrap().is_some());
}

#[tokio::test]
async fn test_handling_after_cache_stop_writes_nothing() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let emitter = EventEmitter::new();
    let mut events = emitter.subscribe();
    cache.stop().unwrap();

    let err = handle_room_message(
        &cache,
        &emitter,
        "R1",
        RoomMessageEvent::create(message_model("M1", "late", Some(&user("U1", "Alice")))),
    )
    .unwrap_err();
    assert!(matches!(err, PuppetError::Terminated));
    assert!(events.try_recv().is_err());
}

// =============================================================================
// Cleanup handles
// =============================================================================

#[tokio::test]
async fn test_detach_runs_cleanups_in_reverse_and_tolerates_failures() {
    let mut bridge = EventBridge::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for n in 1..=3 {
        let order = Arc::clone(&order);
        bridge.push_cleanup(format!("step {}", n), move || async move {
            order.lock().unwrap().push(n);
            if n == 2 {
                anyhow::bail!("cleanup {} failed", n);
            }
            Ok(())
        });
    }
    assert_eq!(bridge.pending_cleanups(), 3);

    let failures = bridge.detach().await;
    assert_eq!(failures, 1);
    assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
    assert_eq!(bridge.pending_cleanups(), 0);

    // Nothing left to run
    assert_eq!(bridge.detach().await, 0);
}

// =============================================================================
// attach / detach
// =============================================================================

#[tokio::test]
async fn test_attach_subscribes_every_found_room() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let mock = MockGitter::new(user("U0", "Bot"));
    mock.add_room(room("R1", "wechaty/ChatOps"));
    mock.add_hidden_room(room("R2", "gone/room"));
    mock.add_room(room("R3", "wechaty/wechaty"));

    let mut bridge = EventBridge::new();
    bridge
        .attach(
            Arc::clone(&mock) as Arc<dyn GitterApi>,
            Arc::clone(&cache),
            EventEmitter::new(),
        )
        .await
        .unwrap();

    assert_eq!(mock.subscribed(), vec!["R1".to_string(), "R3".to_string()]);
    assert_eq!(bridge.pending_cleanups(), 4);

    bridge.detach().await;
    assert_eq!(mock.unsubscribed(), vec!["R3".to_string(), "R1".to_string()]);
}

#[tokio::test]
async fn test_attach_fails_when_room_listing_fails() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let mock = MockGitter::new(user("U0", "Bot"));
    mock.add_room(room("R1", "wechaty/ChatOps"));
    mock.fail_list_rooms(true);

    let mut bridge = EventBridge::new();
    let result = bridge
        .attach(
            Arc::clone(&mock) as Arc<dyn GitterApi>,
            cache,
            EventEmitter::new(),
        )
        .await;

    assert!(result.is_err());
    assert!(mock.subscribed().is_empty());
    assert_eq!(bridge.pending_cleanups(), 0);
}

#[tokio::test]
async fn test_room_events_flow_until_detach() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let emitter = EventEmitter::new();
    let mut events = emitter.subscribe();
    let mock = MockGitter::new(user("U0", "Bot"));
    mock.add_room(room("R1", "wechaty/ChatOps"));

    let mut bridge = EventBridge::new();
    bridge
        .attach(
            Arc::clone(&mock) as Arc<dyn GitterApi>,
            Arc::clone(&cache),
            emitter.clone(),
        )
        .await
        .unwrap();

    let alice = user("U1", "Alice");
    assert!(
        mock.push(
            "R1",
            RoomMessageEvent::create(message_model("M1", "ding", Some(&alice)))
        )
        .await
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PuppetEvent::Message {
            message_id: "M1".to_string()
        }
    );
    assert_eq!(cache.message("M1").unwrap().unwrap().room_id, "R1");
    assert!(eventually(|| cache.has_contact("U1").unwrap()).await);

    // Keep a sender past detach to prove nothing is listening anymore
    let late_sender = mock.sender("R1").unwrap();
    bridge.detach().await;
    cache.stop().unwrap();

    let late = RoomMessageEvent::create(message_model("M2", "late", Some(&alice)));
    assert!(late_sender.send(late).await.is_err());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_events_within_a_room_keep_order() {
    let root = TempDir::new().unwrap();
    let cache = started_cache(&root);
    let emitter = EventEmitter::new();
    let mut events = emitter.subscribe();
    let mock = MockGitter::new(user("U0", "Bot"));
    mock.add_room(room("R1", "wechaty/ChatOps"));

    let mut bridge = EventBridge::new();
    bridge
        .attach(
            Arc::clone(&mock) as Arc<dyn GitterApi>,
            Arc::clone(&cache),
            emitter,
        )
        .await
        .unwrap();

    for n in 1..=5 {
        let id = format!("M{}", n);
        assert!(
            mock.push("R1", RoomMessageEvent::create(message_model(&id, "x", None)))
                .await
        );
    }

    for n in 1..=5 {
        assert_eq!(
            events.recv().await.unwrap(),
            PuppetEvent::Message {
                message_id: format!("M{}", n)
            }
        );
    }

    bridge.detach().await;
}
