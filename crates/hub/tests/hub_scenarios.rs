//! End-to-end behaviour of the hub, its rooms and connections over the
//! in-memory transport.

mod support;

use std::time::Duration;

use parlor_config::ChatConfig;
use parlor_hub::transport::memory;
use parlor_hub::{Frame, Hub, HubError, RoomId, TransportError, UserId};

use support::{
    chat_config, chat_frame, eventually, expect_closed, expect_no_chat, next_chat, user, within,
    MemoryStore, TestResult,
};

async fn start_hub(store: &std::sync::Arc<MemoryStore>, config: &ChatConfig) -> TestResult<Hub> {
    Ok(Hub::start(store.stores(), config).await?)
}

async fn create_room(hub: &Hub, store: &MemoryStore, name: &str) -> TestResult<RoomId> {
    let room = store.add_room(name);
    hub.room_create(room.id).await?;
    Ok(room.id)
}

async fn join(hub: &Hub, store: &MemoryStore, user_id: UserId, room_id: RoomId) -> TestResult {
    store.add_member(room_id, user_id);
    hub.user_join_room(user_id, room_id).await?;
    Ok(())
}

#[tokio::test]
async fn message_is_persisted_and_delivered_to_other_members_only() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;

    let (transport, mut alice_peer) = memory::pair();
    hub.user_connect(transport, user(1, "alice")).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(1), general).await?;

    let (transport, mut bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;
    join(&hub, &store, UserId(2), general).await?;

    alice_peer.send_text(
        serde_json::json!({ "roomId": general, "userId": 1, "body": "hi" }).to_string(),
    )?;

    let received = next_chat(&mut bob_peer).await;
    assert_eq!(received.body, "hi");
    assert_eq!(received.user_id, UserId(1));
    assert_eq!(received.username, "alice");
    assert_eq!(received.room_id, general);

    let stored = store.messages();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].user_id, UserId(1));
    assert_eq!(stored[0].room_id, general);
    assert_eq!(stored[0].body, "hi");
    // The delivered frame carries the stored id, so the save finished first.
    assert_eq!(received.id, Some(stored[0].id));
    assert_eq!(received.timestamp, stored[0].timestamp);

    expect_no_chat(&mut alice_peer, Duration::from_millis(200)).await;

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn second_connection_supersedes_the_first() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(1), general).await?;
    join(&hub, &store, UserId(2), general).await?;

    let (transport, mut first_peer) = memory::pair();
    let first = hub.user_connect(transport, user(1, "alice")).await?;

    let (transport, mut second_peer) = memory::pair();
    let second = hub.user_connect(transport, user(1, "alice")).await?;

    within(first.closed()).await;
    expect_closed(&mut first_peer).await;
    assert!(!second.is_closed());

    // Give the stale disconnect time to reach the hub; it must not evict the successor.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let registry = hub.registry();
    assert_eq!(registry.connection_count(), 1);
    assert_eq!(
        registry.connection(UserId(1)).map(|c| c.id()),
        Some(second.id())
    );

    let (transport, bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;
    bob_peer.send_text(chat_frame(general, "still there?"))?;
    assert_eq!(next_chat(&mut second_peer).await.body, "still there?");

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_connects_leave_exactly_one_live_connection() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;

    let mut attempts = Vec::new();
    let mut peers = Vec::new();
    for _ in 0..8 {
        let (transport, peer) = memory::pair();
        peers.push(peer);
        let hub = hub.clone();
        attempts.push(tokio::spawn(async move {
            hub.user_connect(transport, user(1, "alice")).await
        }));
    }

    let mut handles = Vec::new();
    for attempt in attempts {
        handles.push(attempt.await??);
    }

    let live: Vec<_> = handles.iter().filter(|h| !h.is_closed()).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(
        hub.registry().connection(UserId(1)).map(|c| c.id()),
        Some(live[0].id())
    );

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn offline_member_is_skipped_without_error() -> TestResult {
    let store = MemoryStore::new();
    let general = store.add_room("general");
    store.add_member(general.id, UserId(1));
    store.add_member(general.id, UserId(2));
    store.add_member(general.id, UserId(3));
    let hub = start_hub(&store, &chat_config()).await?;

    let (transport, bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;
    let (transport, mut carol_peer) = memory::pair();
    hub.user_connect(transport, user(3, "carol")).await?;

    bob_peer.send_text(chat_frame(general.id, "anyone?"))?;
    assert_eq!(next_chat(&mut carol_peer).await.body, "anyone?");

    let stored = store.messages();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].body, "anyone?");
    assert!(!hub.registry().is_connected(UserId(1)));

    // The room keeps serving.
    bob_peer.send_text(chat_frame(general.id, "hello?"))?;
    assert_eq!(next_chat(&mut carol_peer).await.body, "hello?");
    assert_eq!(store.messages().len(), 2);

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn silent_peer_is_disconnected_after_the_read_deadline() -> TestResult {
    let store = MemoryStore::new();
    let config = ChatConfig {
        pong_wait_ms: 200,
        ping_interval_ms: 50,
        ..chat_config()
    };
    let hub = start_hub(&store, &config).await?;

    let (transport, mut peer) = memory::pair();
    let handle = hub.user_connect(transport, user(1, "alice")).await?;
    assert!(hub.registry().is_connected(UserId(1)));

    let mut registry = hub.watch_registry();
    within(registry.wait_for(|registry| !registry.is_connected(UserId(1)))).await?;
    assert!(handle.is_closed());

    let mut saw_ping = false;
    while let Some(frame) = within(peer.recv()).await {
        saw_ping |= frame == Frame::Ping;
    }
    assert!(saw_ping, "the writer should have probed the peer before giving up");

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn answering_pings_keeps_a_quiet_connection_alive() -> TestResult {
    let store = MemoryStore::new();
    let config = ChatConfig {
        pong_wait_ms: 300,
        ping_interval_ms: 100,
        ..chat_config()
    };
    let hub = start_hub(&store, &config).await?;

    let (transport, mut peer) = memory::pair();
    let handle = hub.user_connect(transport, user(1, "alice")).await?;

    let responder = tokio::spawn(async move {
        let mut pongs = 0;
        while let Some(frame) = peer.recv().await {
            if frame == Frame::Ping {
                pongs += 1;
                if peer.send(Frame::Pong).is_err() {
                    break;
                }
            }
        }
        pongs
    });

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(!handle.is_closed());
    assert!(hub.registry().is_connected(UserId(1)));

    hub.shutdown().await;
    let pongs = within(responder).await?;
    assert!(pongs >= 3, "expected several keepalive rounds, got {pongs}");
    Ok(())
}

#[tokio::test]
async fn failed_save_drops_only_that_message() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(1), general).await?;
    join(&hub, &store, UserId(2), general).await?;

    let (transport, alice_peer) = memory::pair();
    hub.user_connect(transport, user(1, "alice")).await?;
    let (transport, mut bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;

    store.fail_saves(true);
    alice_peer.send_text(chat_frame(general, "lost"))?;
    expect_no_chat(&mut bob_peer, Duration::from_millis(200)).await;

    store.fail_saves(false);
    alice_peer.send_text(chat_frame(general, "kept"))?;
    assert_eq!(next_chat(&mut bob_peer).await.body, "kept");

    let bodies: Vec<_> = store.messages().into_iter().map(|m| m.body).collect();
    assert_eq!(bodies, vec!["kept".to_string()]);

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn messages_from_one_sender_arrive_in_send_order() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(1), general).await?;
    join(&hub, &store, UserId(2), general).await?;

    let (transport, alice_peer) = memory::pair();
    hub.user_connect(transport, user(1, "alice")).await?;
    let (transport, mut bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;

    for i in 0..40 {
        alice_peer.send_text(chat_frame(general, &i.to_string()))?;
    }

    let mut received = Vec::new();
    for _ in 0..40 {
        received.push(next_chat(&mut bob_peer).await.body);
    }
    let expected: Vec<_> = (0..40).map(|i| i.to_string()).collect();
    assert_eq!(received, expected);

    let persisted: Vec<_> = store.messages().iter().map(|m| m.body.clone()).collect();
    assert_eq!(persisted, expected);

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn join_and_leave_are_idempotent() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;

    hub.user_join_room(UserId(1), general).await?;
    let once = hub.registry().room(general).map(|r| r.members()).unwrap();
    hub.user_join_room(UserId(1), general).await?;
    let twice = hub.registry().room(general).map(|r| r.members()).unwrap();
    assert_eq!(once, twice);
    assert_eq!(twice.len(), 1);

    hub.user_leave_room(UserId(7), general).await?;
    let after_absent_leave = hub.registry().room(general).map(|r| r.members()).unwrap();
    assert_eq!(after_absent_leave, twice);

    hub.user_leave_room(UserId(1), general).await?;
    assert!(hub.registry().room(general).unwrap().members().is_empty());

    assert!(matches!(
        hub.user_join_room(UserId(1), RoomId(404)).await,
        Err(HubError::RoomNotFound(RoomId(404)))
    ));

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn join_racing_a_connect_still_delivers() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(2), general).await?;

    // The join reaches the room before alice's connection is registered, and
    // the store never learns about it, so only the room knows she is a member.
    let (transport, mut alice_peer) = memory::pair();
    let connecting = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.user_connect(transport, user(1, "alice")).await })
    };
    hub.user_join_room(UserId(1), general).await?;
    let alice = connecting.await??;
    assert!(!alice.is_closed());

    let (transport, bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;
    assert_eq!(hub.registry().connected_users(), vec![UserId(1), UserId(2)]);

    bob_peer.send_text(chat_frame(general, "hi"))?;
    let received = next_chat(&mut alice_peer).await;
    assert_eq!(received.body, "hi");
    assert_eq!(received.user_id, UserId(2));
    assert_eq!(store.messages().len(), 1);

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn joining_before_connecting_delivers_once_online() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(2), general).await?;
    hub.user_join_room(UserId(1), general).await?;

    let (transport, mut alice_peer) = memory::pair();
    hub.user_connect(transport, user(1, "alice")).await?;
    let (transport, bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;

    bob_peer.send_text(chat_frame(general, "welcome"))?;
    assert_eq!(next_chat(&mut alice_peer).await.body, "welcome");

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn leaving_a_room_stops_delivery() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(1), general).await?;
    join(&hub, &store, UserId(2), general).await?;

    let (transport, alice_peer) = memory::pair();
    hub.user_connect(transport, user(1, "alice")).await?;
    let (transport, mut bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;

    hub.user_leave_room(UserId(2), general).await?;
    alice_peer.send_text(chat_frame(general, "bob?"))?;

    eventually(|| store.messages().len() == 1).await;
    expect_no_chat(&mut bob_peer, Duration::from_millis(200)).await;

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn frames_from_non_members_and_for_unknown_rooms_are_dropped() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(2), general).await?;

    let (transport, alice_peer) = memory::pair();
    let alice = hub.user_connect(transport, user(1, "alice")).await?;
    let (transport, mut bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;

    alice_peer.send_text(chat_frame(general, "let me in"))?;
    alice_peer.send_text(chat_frame(RoomId(999), "hello void"))?;
    alice_peer.send_text(chat_frame(general, "   "))?;
    expect_no_chat(&mut bob_peer, Duration::from_millis(200)).await;

    assert!(store.messages().is_empty());
    assert!(!alice.is_closed());
    assert!(hub.registry().is_connected(UserId(1)));

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn malformed_frame_closes_the_connection() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;

    let (transport, mut peer) = memory::pair();
    let handle = hub.user_connect(transport, user(1, "alice")).await?;

    peer.send_text("{ not json")?;
    expect_closed(&mut peer).await;
    assert!(handle.is_closed());

    let mut registry = hub.watch_registry();
    within(registry.wait_for(|registry| !registry.is_connected(UserId(1)))).await?;

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn oversized_frame_is_rejected_before_parsing() -> TestResult {
    let store = MemoryStore::new();
    let config = ChatConfig {
        max_message_size: 64,
        ..chat_config()
    };
    let hub = start_hub(&store, &config).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(1), general).await?;

    let (transport, mut peer) = memory::pair();
    hub.user_connect(transport, user(1, "alice")).await?;

    peer.send_text(chat_frame(general, &"a".repeat(100)))?;
    expect_closed(&mut peer).await;

    let mut registry = hub.watch_registry();
    within(registry.wait_for(|registry| !registry.is_connected(UserId(1)))).await?;
    assert!(store.messages().is_empty());

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn read_error_and_hang_up_both_disconnect() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;

    let (transport, peer) = memory::pair();
    let failing = hub.user_connect(transport, user(1, "alice")).await?;
    peer.fail(TransportError::Io("connection reset".into()))?;

    let (transport, quitter) = memory::pair();
    let hung_up = hub.user_connect(transport, user(2, "bob")).await?;
    quitter.hang_up();

    within(failing.closed()).await;
    within(hung_up.closed()).await;

    let mut registry = hub.watch_registry();
    within(registry.wait_for(|registry| registry.connection_count() == 0)).await?;

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn startup_registers_every_persisted_room_with_its_members() -> TestResult {
    let store = MemoryStore::new();
    let general = store.add_room("general");
    let random = store.add_room("random");
    store.add_member(general.id, UserId(1));
    store.add_member(general.id, UserId(2));
    store.add_member(random.id, UserId(2));

    let hub = start_hub(&store, &chat_config()).await?;
    let registry = hub.registry();

    assert_eq!(registry.room_ids(), vec![general.id, random.id]);
    let general_members = registry.room(general.id).unwrap().members();
    assert!(general_members.contains(&UserId(1)) && general_members.contains(&UserId(2)));
    assert_eq!(registry.room(random.id).unwrap().members().len(), 1);
    assert_eq!(registry.room(random.id).unwrap().room().name, "random");

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn destroying_a_room_detaches_its_members() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;
    let general = create_room(&hub, &store, "general").await?;
    join(&hub, &store, UserId(1), general).await?;
    join(&hub, &store, UserId(2), general).await?;

    let (transport, alice_peer) = memory::pair();
    let alice = hub.user_connect(transport, user(1, "alice")).await?;
    let (transport, mut bob_peer) = memory::pair();
    hub.user_connect(transport, user(2, "bob")).await?;

    let room = hub.registry().room(general).cloned().unwrap();
    hub.room_destroy(general).await?;
    assert!(hub.registry().room(general).is_none());
    within(async {
        while !room.is_closed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    alice_peer.send_text(chat_frame(general, "echo?"))?;
    expect_no_chat(&mut bob_peer, Duration::from_millis(200)).await;
    assert!(!alice.is_closed());

    assert!(matches!(
        hub.room_destroy(general).await,
        Err(HubError::RoomNotFound(_))
    ));
    assert!(matches!(
        hub.user_join_room(UserId(1), general).await,
        Err(HubError::RoomNotFound(_))
    ));

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn room_create_for_unknown_room_is_a_setup_error() -> TestResult {
    let store = MemoryStore::new();
    let hub = start_hub(&store, &chat_config()).await?;

    assert!(matches!(
        hub.room_create(RoomId(12)).await,
        Err(HubError::Store(_))
    ));

    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_everything_and_refuses_new_work() -> TestResult {
    let store = MemoryStore::new();
    let general = store.add_room("general");
    let hub = start_hub(&store, &chat_config()).await?;

    let (transport, mut peer) = memory::pair();
    let handle = hub.user_connect(transport, user(1, "alice")).await?;

    within(hub.shutdown()).await;
    assert!(handle.is_closed());
    assert!(hub.registry().room(general.id).unwrap().is_closed());
    expect_closed(&mut peer).await;

    let (transport, _peer) = memory::pair();
    assert!(matches!(
        hub.user_connect(transport, user(2, "bob")).await,
        Err(HubError::Stopped)
    ));
    Ok(())
}

#[tokio::test]
async fn invalid_keepalive_settings_are_rejected_at_start() {
    let store = MemoryStore::new();
    let config = ChatConfig {
        pong_wait_ms: 100,
        ping_interval_ms: 100,
        ..chat_config()
    };
    assert!(matches!(
        Hub::start(store.stores(), &config).await,
        Err(HubError::InvalidSettings(_))
    ));
}
