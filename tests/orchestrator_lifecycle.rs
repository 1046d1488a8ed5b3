//! End-to-end orchestrator lifecycle tests
//!
//! These tests drive the orchestrator through recorded loopback connections
//! and tokio's paused clock, covering matchmaking, the countdown, progress
//! aggregation, and the disconnect grace machinery.

use paceline::config::AppConfig;
use paceline::external::{GuestIdentityProvider, RecordingResultStore};
use paceline::orchestrator::RaceOrchestrator;
use paceline::transport::{
    ClientConnection, ClientEvent, Connection, RecordingConnection, ServerEvent,
};
use paceline::types::{CompletionCause, IdentityCredentials, RoomId, RoomStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn test_orchestrator() -> (RaceOrchestrator, Arc<RecordingResultStore>) {
    let store = Arc::new(RecordingResultStore::new());
    let orchestrator = RaceOrchestrator::new(
        AppConfig::default(),
        Arc::new(GuestIdentityProvider::new()),
        store.clone(),
    );
    (orchestrator, store)
}

fn as_conn(conn: &Arc<RecordingConnection>) -> Connection {
    conn.clone()
}

async fn register(
    orchestrator: &RaceOrchestrator,
    token: &str,
    name: &str,
) -> Arc<RecordingConnection> {
    let conn = RecordingConnection::new();
    orchestrator
        .register(
            as_conn(&conn),
            IdentityCredentials {
                token: Some(token.to_string()),
                display_name: Some(name.to_string()),
            },
        )
        .await
        .expect("registration should succeed");
    conn
}

async fn join(orchestrator: &RaceOrchestrator, conn: &Arc<RecordingConnection>, name: &str) {
    orchestrator
        .handle_event(
            as_conn(conn),
            ClientEvent::JoinQueue {
                display_name: name.to_string(),
            },
        )
        .await
        .expect("joinQueue should succeed");
}

fn room_of(conn: &RecordingConnection) -> RoomId {
    match conn.last_event_named("roomReady") {
        Some(ServerEvent::RoomReady { room_id, .. }) => room_id,
        other => panic!("expected roomReady, got {:?}", other),
    }
}

/// Register two players, match them, and run the countdown to completion
async fn start_two_player_race(
    orchestrator: &RaceOrchestrator,
) -> (Arc<RecordingConnection>, Arc<RecordingConnection>, RoomId) {
    let alice = register(orchestrator, "alice", "Alice").await;
    let bob = register(orchestrator, "bob", "Bob").await;
    join(orchestrator, &alice, "Alice").await;
    join(orchestrator, &bob, "Bob").await;

    // Matchmaking buffer
    sleep(Duration::from_millis(600)).await;
    let room_id = room_of(&alice);
    assert_eq!(room_of(&bob), room_id);

    // Countdown runs at 1 Hz from 10 down to 0
    sleep(Duration::from_secs(11)).await;
    assert_eq!(alice.count_events_named("raceStarted"), 1);
    assert_eq!(bob.count_events_named("raceStarted"), 1);

    (alice, bob, room_id)
}

#[tokio::test(start_paused = true)]
async fn test_two_players_matched_into_one_room() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;
    let bob = register(&orchestrator, "bob", "Bob").await;

    join(&orchestrator, &alice, "Alice").await;
    assert!(matches!(
        alice.last_event_named("queued"),
        Some(ServerEvent::Queued { position: 1 })
    ));

    join(&orchestrator, &bob, "Bob").await;

    // No room exists until the aggregation window elapses
    assert_eq!(alice.count_events_named("roomReady"), 0);
    sleep(Duration::from_millis(600)).await;

    let room_id = room_of(&alice);
    assert_eq!(room_of(&bob), room_id);

    match alice.last_event_named("roomReady") {
        Some(ServerEvent::RoomReady { roster, text, .. }) => {
            assert_eq!(roster.len(), 2);
            assert!(!text.is_empty());
        }
        other => panic!("expected roomReady, got {:?}", other),
    }

    // Countdown starts immediately
    sleep(Duration::from_millis(10)).await;
    assert!(alice.count_events_named("countdown") >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_player_joins_buffering_room_directly() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;
    let bob = register(&orchestrator, "bob", "Bob").await;
    join(&orchestrator, &alice, "Alice").await;
    join(&orchestrator, &bob, "Bob").await;
    sleep(Duration::from_millis(600)).await;
    let room_id = room_of(&alice);

    // Carol arrives during the countdown and slots into the open room
    let carol = register(&orchestrator, "carol", "Carol").await;
    join(&orchestrator, &carol, "Carol").await;

    assert_eq!(room_of(&carol), room_id);
    match carol.last_event_named("roomReady") {
        Some(ServerEvent::RoomReady { roster, .. }) => assert_eq!(roster.len(), 3),
        other => panic!("expected roomReady, got {:?}", other),
    }
    assert!(alice.count_events_named("playerJoinedDuringBuffer") >= 1);
    assert!(bob.count_events_named("playerJoinedDuringBuffer") >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_join_requests_are_rejected() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;

    join(&orchestrator, &alice, "Alice").await;
    join(&orchestrator, &alice, "Alice").await;
    assert_eq!(alice.count_events_named("alreadyWaiting"), 1);

    let bob = register(&orchestrator, "bob", "Bob").await;
    join(&orchestrator, &bob, "Bob").await;
    sleep(Duration::from_millis(600)).await;
    let room_id = room_of(&alice);

    join(&orchestrator, &alice, "Alice").await;
    match alice.last_event_named("alreadyInRace") {
        Some(ServerEvent::AlreadyInRace { room_id: reported }) => assert_eq!(reported, room_id),
        other => panic!("expected alreadyInRace, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_leave_queue_prevents_matching() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;
    let bob = register(&orchestrator, "bob", "Bob").await;
    join(&orchestrator, &alice, "Alice").await;
    join(&orchestrator, &bob, "Bob").await;

    orchestrator
        .handle_event(as_conn(&alice), ClientEvent::LeaveQueue)
        .await
        .unwrap();

    sleep(Duration::from_millis(600)).await;
    assert_eq!(alice.count_events_named("roomReady"), 0);
    assert_eq!(bob.count_events_named("roomReady"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_progress_and_finish_complete_race() {
    let (orchestrator, store) = test_orchestrator();
    let (alice, bob, room_id) = start_two_player_race(&orchestrator).await;

    orchestrator
        .handle_event(
            as_conn(&alice),
            ClientEvent::ReportProgress {
                room_id,
                progress: 50,
                wpm: 82.0,
                accuracy: 97.0,
            },
        )
        .await
        .unwrap();
    assert!(bob.count_events_named("progressSnapshot") >= 1);

    orchestrator
        .handle_event(
            as_conn(&alice),
            ClientEvent::ReportFinished {
                room_id,
                wpm: 85.0,
                accuracy: 97.5,
                completion_ms: 42_000,
            },
        )
        .await
        .unwrap();
    match bob.last_event_named("playerFinished") {
        Some(ServerEvent::PlayerFinished { position, .. }) => assert_eq!(position, 1),
        other => panic!("expected playerFinished, got {:?}", other),
    }
    assert_eq!(bob.count_events_named("raceFinished"), 0);

    orchestrator
        .handle_event(
            as_conn(&bob),
            ClientEvent::ReportFinished {
                room_id,
                wpm: 70.0,
                accuracy: 95.0,
                completion_ms: 51_000,
            },
        )
        .await
        .unwrap();

    for conn in [&alice, &bob] {
        match conn.last_event_named("raceFinished") {
            Some(ServerEvent::RaceFinished { results, cause }) => {
                assert_eq!(cause, CompletionCause::Completed);
                assert_eq!(results.len(), 2);
                assert_eq!(results[0].display_name, "Alice");
                assert_eq!(results[0].position, 1);
                assert_eq!(results[1].display_name, "Bob");
                assert_eq!(results[1].position, 2);
            }
            other => panic!("expected raceFinished, got {:?}", other),
        }
    }

    // The persistence write is fire and forget; let it run
    sleep(Duration::from_millis(10)).await;
    let saved = store.saved_races();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].room_id, room_id);
    assert_eq!(saved[0].cause, CompletionCause::Completed);
    assert_eq!(saved[0].results[0].display_name, "Alice");
}

#[tokio::test(start_paused = true)]
async fn test_stale_progress_never_lowers_reported_progress() {
    let (orchestrator, _) = test_orchestrator();
    let (alice, bob, room_id) = start_two_player_race(&orchestrator).await;

    for progress in [40u8, 25u8] {
        orchestrator
            .handle_event(
                as_conn(&alice),
                ClientEvent::ReportProgress {
                    room_id,
                    progress,
                    wpm: 80.0,
                    accuracy: 96.0,
                },
            )
            .await
            .unwrap();
    }

    match bob.last_event_named("progressSnapshot") {
        Some(ServerEvent::ProgressSnapshot { roster }) => {
            let alice_entry = roster
                .iter()
                .find(|p| p.display_name == "Alice")
                .expect("alice in roster");
            assert_eq!(alice_entry.progress, 40);
        }
        other => panic!("expected progressSnapshot, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_then_reconnect_restores_slot() {
    let (orchestrator, _) = test_orchestrator();
    let (alice, bob, room_id) = start_two_player_race(&orchestrator).await;

    orchestrator
        .handle_event(
            as_conn(&alice),
            ClientEvent::ReportProgress {
                room_id,
                progress: 40,
                wpm: 75.0,
                accuracy: 96.0,
            },
        )
        .await
        .unwrap();

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();

    match bob.last_event_named("playerDisconnected") {
        Some(ServerEvent::PlayerDisconnected {
            display_name,
            grace_seconds,
        }) => {
            assert_eq!(display_name, "Alice");
            assert_eq!(grace_seconds, 10);
        }
        other => panic!("expected playerDisconnected, got {:?}", other),
    }

    // Alice comes back on a fresh connection within the grace period
    sleep(Duration::from_secs(3)).await;
    let alice2 = register(&orchestrator, "alice", "Alice").await;
    match alice2.last_event_named("alreadyInRace") {
        Some(ServerEvent::AlreadyInRace { room_id: reported }) => assert_eq!(reported, room_id),
        other => panic!("expected alreadyInRace, got {:?}", other),
    }

    orchestrator
        .handle_event(as_conn(&alice2), ClientEvent::Reconnect { room_id })
        .await
        .unwrap();

    match alice2.last_event_named("reconnectSucceeded") {
        Some(ServerEvent::ReconnectSucceeded {
            room_id: reported,
            roster,
            status,
            ..
        }) => {
            assert_eq!(reported, room_id);
            assert_eq!(status, RoomStatus::Racing);
            let restored = roster
                .iter()
                .find(|p| p.display_name == "Alice")
                .expect("alice in roster");
            assert_eq!(restored.progress, 40);
            assert!(restored.connected);
        }
        other => panic!("expected reconnectSucceeded, got {:?}", other),
    }
    assert_eq!(bob.count_events_named("playerReconnected"), 1);

    // The expiry must not fire after a successful reconnect
    sleep(Duration::from_secs(15)).await;
    assert_eq!(bob.count_events_named("playerRemoved"), 0);
    assert_eq!(bob.count_events_named("raceFinished"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_grace_expiry_gives_survivor_the_win() {
    let (orchestrator, store) = test_orchestrator();
    let (alice, bob, room_id) = start_two_player_race(&orchestrator).await;

    orchestrator
        .handle_event(
            as_conn(&bob),
            ClientEvent::ReportProgress {
                room_id,
                progress: 60,
                wpm: 68.0,
                accuracy: 94.0,
            },
        )
        .await
        .unwrap();

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();

    // Grace period (10s) then the survivor window (2s)
    sleep(Duration::from_secs(11)).await;
    match bob.last_event_named("playerRemoved") {
        Some(ServerEvent::PlayerRemoved { reason, .. }) => assert_eq!(reason, "timeout"),
        other => panic!("expected playerRemoved, got {:?}", other),
    }
    assert_eq!(bob.count_events_named("raceFinished"), 0);

    sleep(Duration::from_secs(3)).await;
    match bob.last_event_named("raceFinished") {
        Some(ServerEvent::RaceFinished { results, cause }) => {
            assert_eq!(cause, CompletionCause::OpponentLeft);
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].display_name, "Bob");
            assert_eq!(results[0].position, 1);
            assert!(results[0].finished);
        }
        other => panic!("expected raceFinished, got {:?}", other),
    }

    sleep(Duration::from_millis(10)).await;
    let saved = store.saved_races();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].cause, CompletionCause::OpponentLeft);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_cancelled_when_quorum_lost() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;
    let bob = register(&orchestrator, "bob", "Bob").await;
    join(&orchestrator, &alice, "Alice").await;
    join(&orchestrator, &bob, "Bob").await;
    sleep(Duration::from_millis(600)).await;
    room_of(&alice);

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();

    // The next countdown tick notices the missing quorum
    sleep(Duration::from_millis(1100)).await;
    assert_eq!(bob.count_events_named("countdownCancelled"), 1);
    assert_eq!(bob.count_events_named("raceStarted"), 0);

    // Bob goes back to the front of the queue
    assert!(matches!(
        bob.last_event_named("queued"),
        Some(ServerEvent::Queued { position: 1 })
    ));

    // A new arrival pairs with him again
    let carol = register(&orchestrator, "carol", "Carol").await;
    join(&orchestrator, &carol, "Carol").await;
    sleep(Duration::from_millis(600)).await;
    assert_eq!(bob.count_events_named("roomReady"), 2);
    assert_eq!(carol.count_events_named("roomReady"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_rejections() {
    let (orchestrator, _) = test_orchestrator();
    let (alice, _bob, room_id) = start_two_player_race(&orchestrator).await;

    // Not a member
    let carol = register(&orchestrator, "carol", "Carol").await;
    orchestrator
        .handle_event(as_conn(&carol), ClientEvent::Reconnect { room_id })
        .await
        .unwrap();
    match carol.last_event_named("reconnectFailed") {
        Some(ServerEvent::ReconnectFailed { reason }) => {
            assert!(reason.contains("not a member"));
        }
        other => panic!("expected reconnectFailed, got {:?}", other),
    }

    // Unknown room
    orchestrator
        .handle_event(
            as_conn(&carol),
            ClientEvent::Reconnect {
                room_id: uuid::Uuid::new_v4(),
            },
        )
        .await
        .unwrap();
    match carol.last_event_named("reconnectFailed") {
        Some(ServerEvent::ReconnectFailed { reason }) => {
            assert!(reason.contains("no longer exists"));
        }
        other => panic!("expected reconnectFailed, got {:?}", other),
    }

    // A registered outsider cannot claim someone else's slot either
    let intruder = register(&orchestrator, "dave", "Dave").await;
    orchestrator
        .handle_event(as_conn(&intruder), ClientEvent::Reconnect { room_id })
        .await
        .unwrap();
    match intruder.last_event_named("reconnectFailed") {
        Some(ServerEvent::ReconnectFailed { reason }) => {
            assert!(reason.contains("not a member"));
        }
        other => panic!("expected reconnectFailed, got {:?}", other),
    }
    drop(alice);
}

#[tokio::test(start_paused = true)]
async fn test_buffering_disconnect_holds_slot_for_reconnect() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;
    let bob = register(&orchestrator, "bob", "Bob").await;
    let carol = register(&orchestrator, "carol", "Carol").await;
    join(&orchestrator, &alice, "Alice").await;
    join(&orchestrator, &bob, "Bob").await;
    join(&orchestrator, &carol, "Carol").await;
    sleep(Duration::from_millis(600)).await;
    let room_id = room_of(&alice);

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();

    // The slot is held, not vacated
    match bob.last_event_named("playerDisconnected") {
        Some(ServerEvent::PlayerDisconnected {
            display_name,
            grace_seconds,
        }) => {
            assert_eq!(display_name, "Alice");
            assert_eq!(grace_seconds, 10);
        }
        other => panic!("expected playerDisconnected, got {:?}", other),
    }
    assert_eq!(bob.count_events_named("playerRemoved"), 0);

    // Two players remain connected, so the countdown keeps running
    sleep(Duration::from_millis(1100)).await;
    assert_eq!(bob.count_events_named("countdownCancelled"), 0);

    let alice2 = register(&orchestrator, "alice", "Alice").await;
    match alice2.last_event_named("alreadyInRace") {
        Some(ServerEvent::AlreadyInRace { room_id: reported }) => assert_eq!(reported, room_id),
        other => panic!("expected alreadyInRace, got {:?}", other),
    }
    orchestrator
        .handle_event(as_conn(&alice2), ClientEvent::Reconnect { room_id })
        .await
        .unwrap();
    match alice2.last_event_named("reconnectSucceeded") {
        Some(ServerEvent::ReconnectSucceeded { status, .. }) => {
            assert_eq!(status, RoomStatus::Buffering);
        }
        other => panic!("expected reconnectSucceeded, got {:?}", other),
    }
    assert_eq!(bob.count_events_named("playerReconnected"), 1);

    // The race starts on schedule with all three aboard
    sleep(Duration::from_secs(10)).await;
    assert_eq!(alice2.count_events_named("raceStarted"), 1);
    assert_eq!(bob.count_events_named("raceStarted"), 1);
    assert_eq!(carol.count_events_named("raceStarted"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_buffering_grace_expiry_removes_player() {
    let store = Arc::new(RecordingResultStore::new());
    let mut config = AppConfig::default();
    config.race.countdown_seconds = 30;
    let orchestrator = RaceOrchestrator::new(
        config,
        Arc::new(GuestIdentityProvider::new()),
        store.clone(),
    );

    let alice = register(&orchestrator, "alice", "Alice").await;
    let bob = register(&orchestrator, "bob", "Bob").await;
    let carol = register(&orchestrator, "carol", "Carol").await;
    join(&orchestrator, &alice, "Alice").await;
    join(&orchestrator, &bob, "Bob").await;
    join(&orchestrator, &carol, "Carol").await;
    sleep(Duration::from_millis(600)).await;
    let room_id = room_of(&alice);

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();

    // Grace runs out well before the long countdown does
    sleep(Duration::from_secs(11)).await;
    match bob.last_event_named("playerRemoved") {
        Some(ServerEvent::PlayerRemoved { reason, .. }) => assert_eq!(reason, "timeout"),
        other => panic!("expected playerRemoved, got {:?}", other),
    }
    assert_eq!(bob.count_events_named("countdownCancelled"), 0);

    // The vacated slot cannot be reclaimed
    let alice2 = register(&orchestrator, "alice", "Alice").await;
    orchestrator
        .handle_event(as_conn(&alice2), ClientEvent::Reconnect { room_id })
        .await
        .unwrap();
    match alice2.last_event_named("reconnectFailed") {
        Some(ServerEvent::ReconnectFailed { reason }) => {
            assert!(reason.contains("not a member"));
        }
        other => panic!("expected reconnectFailed, got {:?}", other),
    }

    // The remaining pair still reaches the start
    sleep(Duration::from_secs(20)).await;
    assert_eq!(bob.count_events_named("raceStarted"), 1);
    assert_eq!(carol.count_events_named("raceStarted"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_cancel_clears_held_slots() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;
    let bob = register(&orchestrator, "bob", "Bob").await;
    join(&orchestrator, &alice, "Alice").await;
    join(&orchestrator, &bob, "Bob").await;
    sleep(Duration::from_millis(600)).await;
    room_of(&alice);

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();
    sleep(Duration::from_millis(1100)).await;
    assert_eq!(bob.count_events_named("countdownCancelled"), 1);

    // The discarded room no longer pins Alice; she queues afresh
    let alice2 = register(&orchestrator, "alice", "Alice").await;
    assert_eq!(alice2.count_events_named("alreadyInRace"), 0);
    join(&orchestrator, &alice2, "Alice").await;
    assert!(matches!(
        alice2.last_event_named("queued"),
        Some(ServerEvent::Queued { position: 2 })
    ));

    sleep(Duration::from_millis(600)).await;
    assert_eq!(bob.count_events_named("roomReady"), 2);
    assert_eq!(alice2.count_events_named("roomReady"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_register_broadcasts_stats_to_existing_sessions() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;
    alice.clear_events();

    let _bob = register(&orchestrator, "bob", "Bob").await;

    match alice.last_event_named("statsSnapshot") {
        Some(ServerEvent::StatsSnapshot { online, .. }) => assert_eq!(online, 2),
        other => panic!("expected statsSnapshot, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_reconnect_against_live_slot_is_rejected() {
    let (orchestrator, _) = test_orchestrator();
    let (alice, _bob, room_id) = start_two_player_race(&orchestrator).await;

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();

    let alice2 = register(&orchestrator, "alice", "Alice").await;
    orchestrator
        .handle_event(as_conn(&alice2), ClientEvent::Reconnect { room_id })
        .await
        .unwrap();
    assert_eq!(alice2.count_events_named("reconnectSucceeded"), 1);

    // A third connection signs in, displacing the second, and tries to
    // claim the slot the second still holds
    let alice3 = register(&orchestrator, "alice", "Alice").await;
    assert_eq!(alice2.count_events_named("sessionInvalidated"), 1);
    orchestrator
        .handle_event(as_conn(&alice3), ClientEvent::Reconnect { room_id })
        .await
        .unwrap();
    match alice3.last_event_named("reconnectFailed") {
        Some(ServerEvent::ReconnectFailed { reason }) => {
            assert!(reason.contains("not disconnected"));
        }
        other => panic!("expected reconnectFailed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_leaving_last_grace_holder_disposes_finished_room() {
    let (orchestrator, _) = test_orchestrator();
    let (alice, bob, room_id) = start_two_player_race(&orchestrator).await;

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();

    orchestrator
        .handle_event(
            as_conn(&bob),
            ClientEvent::ReportFinished {
                room_id,
                wpm: 72.0,
                accuracy: 95.0,
                completion_ms: 48_000,
            },
        )
        .await
        .unwrap();
    match bob.last_event_named("raceFinished") {
        Some(ServerEvent::RaceFinished { cause, .. }) => {
            assert_eq!(cause, CompletionCause::Completed);
        }
        other => panic!("expected raceFinished, got {:?}", other),
    }

    // Alice returns, declines to rejoin, and releases the held slot
    let alice2 = register(&orchestrator, "alice", "Alice").await;
    assert_eq!(alice2.count_events_named("alreadyInRace"), 1);
    orchestrator
        .handle_event(as_conn(&alice2), ClientEvent::LeaveRoom { room_id })
        .await
        .unwrap();

    // The room went with the last held slot, not with the next sweep
    orchestrator
        .handle_event(as_conn(&bob), ClientEvent::Reconnect { room_id })
        .await
        .unwrap();
    match bob.last_event_named("reconnectFailed") {
        Some(ServerEvent::ReconnectFailed { reason }) => {
            assert!(reason.contains("no longer exists"));
        }
        other => panic!("expected reconnectFailed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_sign_in_displaces_first() {
    let (orchestrator, _) = test_orchestrator();
    let first = register(&orchestrator, "alice", "Alice").await;
    let second = register(&orchestrator, "alice", "Alice").await;

    assert_eq!(first.count_events_named("sessionInvalidated"), 1);
    assert!(!first.is_live());
    assert!(second.is_live());
}

#[tokio::test(start_paused = true)]
async fn test_voluntary_leave_ends_two_player_race() {
    let (orchestrator, _) = test_orchestrator();
    let (alice, bob, room_id) = start_two_player_race(&orchestrator).await;

    orchestrator
        .handle_event(as_conn(&alice), ClientEvent::LeaveRoom { room_id })
        .await
        .unwrap();

    match bob.last_event_named("playerRemoved") {
        Some(ServerEvent::PlayerRemoved { reason, .. }) => assert_eq!(reason, "left"),
        other => panic!("expected playerRemoved, got {:?}", other),
    }

    // Survivor window, then the win by default
    sleep(Duration::from_secs(3)).await;
    match bob.last_event_named("raceFinished") {
        Some(ServerEvent::RaceFinished { cause, results }) => {
            assert_eq!(cause, CompletionCause::OpponentLeft);
            assert_eq!(results[0].display_name, "Bob");
        }
        other => panic!("expected raceFinished, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_all_players_disconnecting_ends_race() {
    let (orchestrator, store) = test_orchestrator();
    let (alice, bob, _room_id) = start_two_player_race(&orchestrator).await;

    alice.drop_link();
    orchestrator.handle_disconnect(alice.id()).unwrap();
    bob.drop_link();
    orchestrator.handle_disconnect(bob.id()).unwrap();

    sleep(Duration::from_millis(10)).await;
    let saved = store.saved_races();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].cause, CompletionCause::AllPlayersDisconnected);
    assert!(saved[0].results.iter().all(|r| !r.finished));
}

#[tokio::test]
async fn test_sweep_force_finishes_overlong_race() {
    let store = Arc::new(RecordingResultStore::new());
    let mut config = AppConfig::default();
    config.race.race_timeout_seconds = 1;
    config.race.matchmaking_buffer_ms = 10;
    config.race.countdown_seconds = 1;
    let orchestrator = RaceOrchestrator::new(
        config,
        Arc::new(GuestIdentityProvider::new()),
        store.clone(),
    );

    let alice = register(&orchestrator, "alice", "Alice").await;
    let bob = register(&orchestrator, "bob", "Bob").await;
    join(&orchestrator, &alice, "Alice").await;
    join(&orchestrator, &bob, "Bob").await;
    sleep(Duration::from_millis(100)).await;
    room_of(&alice);
    sleep(Duration::from_millis(2200)).await;
    assert_eq!(alice.count_events_named("raceStarted"), 1);

    // Wall-clock based duration cap; the sweep runs after it elapses
    sleep(Duration::from_millis(1200)).await;
    orchestrator.sweep_stale_rooms().unwrap();

    match bob.last_event_named("raceFinished") {
        Some(ServerEvent::RaceFinished { cause, .. }) => {
            assert_eq!(cause, CompletionCause::Timeout);
        }
        other => panic!("expected raceFinished, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stats_reflect_queue_and_race_membership() {
    let (orchestrator, _) = test_orchestrator();
    let alice = register(&orchestrator, "alice", "Alice").await;
    let _bob = register(&orchestrator, "bob", "Bob").await;

    join(&orchestrator, &alice, "Alice").await;
    orchestrator
        .handle_event(as_conn(&alice), ClientEvent::RequestStats)
        .await
        .unwrap();

    match alice.last_event_named("statsSnapshot") {
        Some(ServerEvent::StatsSnapshot {
            online,
            racing,
            waiting,
        }) => {
            assert_eq!(online, 2);
            assert_eq!(racing, 0);
            assert_eq!(waiting, 1);
        }
        other => panic!("expected statsSnapshot, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_orchestrator_stats_counters() {
    let (orchestrator, _) = test_orchestrator();
    let (_alice, _bob, _room_id) = start_two_player_race(&orchestrator).await;

    let stats = orchestrator.get_stats().unwrap();
    assert_eq!(stats.players_queued, 2);
    assert_eq!(stats.rooms_created, 1);
    assert_eq!(stats.races_started, 1);
    assert_eq!(stats.active_rooms, 1);
    assert_eq!(stats.players_waiting, 0);
}
