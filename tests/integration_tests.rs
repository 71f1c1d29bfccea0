//! End-to-end tests against a mock server on a loopback socket.
//!
//! Each test stands in for the real server with a plain `TcpListener`
//! speaking the newline-delimited protocol, so the full path from user
//! intent to bytes on the wire (and back) is exercised.

use client::network::{Connector, ConnectorConfig, TransportEvent};
use client::session::{Phase, SessionEvent, UserIntent};
use serde_json::Value;
use shared::{GameEventType, Participant, ServerPhase, Snapshot, WireMessage};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;

fn test_config(addr: String) -> ConnectorConfig {
    ConnectorConfig {
        addr,
        heartbeat_interval: Duration::from_millis(50),
        reconnect_delay: Duration::from_millis(20),
        max_reconnect_attempts: 2,
    }
}

async fn recv_event(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
) -> TransportEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport channel closed")
}

#[tokio::test]
async fn test_outbound_message_reaches_wire_intact() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (mut connector, mut events) = Connector::new(test_config(addr));
    connector.connect();

    let (stream, _) = timeout(Duration::from_secs(1), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let (read_half, _write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    assert_eq!(recv_event(&mut events).await, TransportEvent::Open);

    let message = WireMessage {
        event_type: GameEventType::Guess,
        game_code: "WXYZ".to_string(),
        user: Participant::new("id-42", "alice"),
        data: Some("1969".to_string()),
        timestamp: Some(1_700_000_000_000),
    };
    connector.send(&message).unwrap();

    // Heartbeat probes share the wire; skip them until the JSON frame shows up.
    let frame = loop {
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if line != shared::HEARTBEAT_PROBE {
            break line;
        }
    };

    let parsed: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(parsed["eventType"], "GUESS");
    assert_eq!(parsed["gameCode"], "WXYZ");
    assert_eq!(parsed["user"]["id"], "id-42");
    assert_eq!(parsed["user"]["name"], "alice");
    assert_eq!(parsed["data"], "1969");
    assert_eq!(parsed["timestamp"], 1_700_000_000_000u64);

    connector.close();
}

#[tokio::test]
async fn test_heartbeat_probe_and_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (mut connector, mut events) = Connector::new(test_config(addr));
    connector.connect();

    let (stream, _) = timeout(Duration::from_secs(1), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    assert_eq!(recv_event(&mut events).await, TransportEvent::Open);

    // The idle connection probes on its own.
    let line = timeout(Duration::from_secs(2), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(line, shared::HEARTBEAT_PROBE);

    // The reply is consumed silently; the next real push still arrives.
    write_half
        .write_all(format!("{}\n", shared::HEARTBEAT_REPLY).as_bytes())
        .await
        .unwrap();

    let snapshot = Snapshot {
        game_code: "ABCD".to_string(),
        users: vec![Participant::new("u1", "alice")],
        current_state: ServerPhase::WaitingForGuesses,
        current_event: None,
        player_scores: HashMap::new(),
        current_guesses: HashMap::new(),
    };
    let push = serde_json::to_string(&snapshot).unwrap();
    write_half
        .write_all(format!("{}\n", push).as_bytes())
        .await
        .unwrap();

    match recv_event(&mut events).await {
        TransportEvent::Snapshot(received) => assert_eq!(received.game_code, "ABCD"),
        other => panic!("expected snapshot, got {:?}", other),
    }

    connector.close();
}

#[tokio::test]
async fn test_malformed_frames_do_not_kill_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (mut connector, mut events) = Connector::new(test_config(addr));
    connector.connect();

    let (stream, _) = timeout(Duration::from_secs(1), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let (_read_half, mut write_half) = stream.into_split();

    assert_eq!(recv_event(&mut events).await, TransportEvent::Open);

    write_half.write_all(b"{not json at all\n").await.unwrap();
    write_half.write_all(b"\n").await.unwrap();
    write_half
        .write_all(b"{\"unexpected\": \"shape\"}\n")
        .await
        .unwrap();

    let snapshot = Snapshot {
        game_code: "ABCD".to_string(),
        users: vec![Participant::new("u1", "alice")],
        current_state: ServerPhase::GameStart,
        current_event: None,
        player_scores: HashMap::new(),
        current_guesses: HashMap::new(),
    };
    write_half
        .write_all(format!("{}\n", serde_json::to_string(&snapshot).unwrap()).as_bytes())
        .await
        .unwrap();

    // The garbage is dropped, the valid snapshot still comes through.
    match recv_event(&mut events).await {
        TransportEvent::Snapshot(received) => {
            assert_eq!(received.current_state, ServerPhase::GameStart)
        }
        other => panic!("expected snapshot, got {:?}", other),
    }

    connector.close();
}

#[tokio::test]
async fn test_reconnect_resumes_after_transient_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (mut connector, mut events) = Connector::new(test_config(addr));
    connector.connect();

    // First session: accept, then slam the door.
    let (stream, _) = timeout(Duration::from_secs(1), listener.accept())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recv_event(&mut events).await, TransportEvent::Open);
    drop(stream);

    // Second session: the connector comes back on its own.
    let (stream, _) = timeout(Duration::from_secs(2), listener.accept())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recv_event(&mut events).await, TransportEvent::Open);

    // And the revived socket still carries pushes.
    let (_read_half, mut write_half) = stream.into_split();
    let snapshot = Snapshot {
        game_code: "ABCD".to_string(),
        users: vec![Participant::new("u1", "alice")],
        current_state: ServerPhase::RoundOver,
        current_event: None,
        player_scores: HashMap::new(),
        current_guesses: HashMap::new(),
    };
    write_half
        .write_all(format!("{}\n", serde_json::to_string(&snapshot).unwrap()).as_bytes())
        .await
        .unwrap();

    match recv_event(&mut events).await {
        TransportEvent::Snapshot(received) => {
            assert_eq!(received.current_state, ServerPhase::RoundOver)
        }
        other => panic!("expected snapshot, got {:?}", other),
    }

    connector.close();
}

#[tokio::test]
async fn test_full_round_against_mock_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let identity = Participant::new("", "alice");
    let (mut runner, handle) =
        client::runner::SessionRunner::new(identity, test_config(addr));
    runner.connect();
    let runner_task = tokio::spawn(runner.run());

    let (stream, _) = timeout(Duration::from_secs(1), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    handle.intent(UserIntent::Join {
        code: "abcd".to_string(),
    });

    // The join frame carries the uppercased code and the player's name.
    let frame = loop {
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if line != shared::HEARTBEAT_PROBE {
            break line;
        }
    };
    let parsed: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(parsed["eventType"], "PLAYER_JOINED");
    assert_eq!(parsed["gameCode"], "ABCD");
    assert_eq!(parsed["user"]["name"], "alice");

    // Server assigns an id and moves the session into a guessing round.
    let mut scores = HashMap::new();
    scores.insert("id-alice".to_string(), 0u32);
    scores.insert("id-bob".to_string(), 0u32);
    let snapshot = Snapshot {
        game_code: "ABCD".to_string(),
        users: vec![
            Participant::new("id-alice", "alice"),
            Participant::new("id-bob", "bob"),
        ],
        current_state: ServerPhase::WaitingForGuesses,
        current_event: Some(shared::HistoricalEvent {
            event: "Moon landing".to_string(),
            year: 1969,
        }),
        player_scores: scores,
        current_guesses: HashMap::new(),
    };
    write_half
        .write_all(format!("{}\n", serde_json::to_string(&snapshot).unwrap()).as_bytes())
        .await
        .unwrap();

    let mut view_rx = handle.view();
    timeout(Duration::from_secs(2), async {
        loop {
            view_rx.changed().await.unwrap();
            if view_rx.borrow().phase == Phase::AwaitingGuesses {
                break;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(view_rx.borrow().opponent_name.as_deref(), Some("bob"));

    // The player guesses; the guess goes out stamped with the assigned id.
    handle.intent(UserIntent::SubmitGuess { year: 1970 });
    let frame = loop {
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if line != shared::HEARTBEAT_PROBE {
            break line;
        }
    };
    let parsed: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(parsed["eventType"], "GUESS");
    assert_eq!(parsed["user"]["id"], "id-alice");
    assert_eq!(parsed["data"], "1970");

    handle.intent(UserIntent::Leave);
    let frame = loop {
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if line != shared::HEARTBEAT_PROBE {
            break line;
        }
    };
    let parsed: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(parsed["eventType"], "PLAYER_LEFT");

    handle.close();
    timeout(Duration::from_secs(2), runner_task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_reconnect_ceiling_is_fatal() {
    // Bind, grab the port, then close it so every connect fails.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let (mut connector, mut events) = Connector::new(test_config(addr));
    connector.connect();

    assert_eq!(recv_event(&mut events).await, TransportEvent::Fatal);

    // Exactly once: the channel stays quiet afterwards.
    let extra = timeout(Duration::from_millis(200), events.recv()).await;
    assert!(extra.is_err(), "expected no events after fatal");
}

#[tokio::test]
async fn test_session_event_snapshot_is_cloneable_for_fanout() {
    // The runner hands the same snapshot to reducer and view; make sure the
    // event type supports that without surprises.
    let snapshot = Snapshot {
        game_code: "ABCD".to_string(),
        users: vec![],
        current_state: ServerPhase::GameStart,
        current_event: None,
        player_scores: HashMap::new(),
        current_guesses: HashMap::new(),
    };
    let event = SessionEvent::Snapshot(snapshot);
    let copy = event.clone();
    assert_eq!(format!("{:?}", event), format!("{:?}", copy));
}
