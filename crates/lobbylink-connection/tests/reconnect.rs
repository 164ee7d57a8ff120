//! Integration tests for the connection supervisor.
//!
//! Uses the in-memory transport and `start_paused = true`: the Tokio clock
//! only moves when every task is idle, and then jumps straight to the next
//! timer. Backoff delays therefore show up as exact gaps between recorded
//! connect attempts.

use std::sync::Arc;
use std::time::Duration;

use lobbylink_connection::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionState, Reply,
};
use lobbylink_protocol::{
    ClientRequest, Codec, Envelope, JsonCodec, MatchmakerAdd, MatchmakerMatched, QueueMode,
    ServerMessage,
};
use lobbylink_session::Session;
use lobbylink_transport::{MemoryConnector, MemoryPeer};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

fn session() -> Session {
    Session::new("t1", "Player-abc123")
}

fn manager(connector: &MemoryConnector) -> ConnectionManager<MemoryConnector> {
    ConnectionManager::new(connector.clone(), ConnectionConfig::default())
}

/// Asserts `later - earlier` is `expected`, give or take the timer wheel's
/// 1 ms resolution.
fn assert_gap(earlier: Instant, later: Instant, expected: Duration) {
    let gap = later - earlier;
    assert!(
        gap >= expected && gap <= expected + Duration::from_millis(1),
        "expected a gap of {expected:?}, got {gap:?}"
    );
}

/// Reads one request from the peer.
async fn read_request(peer: &mut MemoryPeer) -> (String, ClientRequest) {
    let frame = peer.recv().await.expect("client closed the connection");
    let envelope: Envelope = JsonCodec.decode(&frame).unwrap();
    envelope.into_client_request().unwrap()
}

/// Sends a server message, as a reply when `cid` is set.
fn send(peer: &MemoryPeer, cid: Option<String>, message: ServerMessage) {
    let frame = JsonCodec.encode(&Envelope::server(cid, message)).unwrap();
    assert!(peer.send(frame));
}

fn add_request() -> ClientRequest {
    ClientRequest::MatchmakerAdd(MatchmakerAdd::for_mode(QueueMode::Casual, 2, 2))
}

// =========================================================================
// Connect and backoff
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_first_try_resolves_connected() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);

    let handle = manager.connect(&session()).await.unwrap();

    let status = handle.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.attempt_count, 0);
    assert_eq!(status.generation, 1);

    let peer = listener.accept().await.unwrap();
    assert_eq!(peer.token(), "t1");
}

#[tokio::test(start_paused = true)]
async fn test_connect_two_failures_then_success_waits_2s_then_4s() {
    let (connector, _listener) = MemoryConnector::pair();
    connector.fail_next(2);
    let manager = manager(&connector);

    let handle = manager.connect(&session()).await.unwrap();

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 3);
    assert!(!attempts[0].accepted);
    assert!(!attempts[1].accepted);
    assert!(attempts[2].accepted);
    assert_gap(attempts[0].at, attempts[1].at, Duration::from_millis(2_000));
    assert_gap(attempts[1].at, attempts[2].at, Duration::from_millis(4_000));

    assert_eq!(handle.status().state, ConnectionState::Connected);
    assert_eq!(handle.status().attempt_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failing_reports_reconnecting_with_attempt_count() {
    let (connector, _listener) = MemoryConnector::pair();
    connector.refuse_all(true);
    let manager = Arc::new(manager(&connector));

    let background = Arc::clone(&manager);
    let connecting = tokio::spawn(async move { background.connect(&session()).await });

    let mut status = manager.watch_status();
    let seen = *status
        .wait_for(|s| s.state == ConnectionState::Reconnecting && s.attempt_count == 3)
        .await
        .unwrap();
    assert_eq!(seen.generation, 0);
    assert_eq!(connector.attempt_count(), 3);

    manager.disconnect().await;
    assert!(matches!(
        connecting.await.unwrap(),
        Err(ConnectionError::Shutdown)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_backoff_cancels_retry() {
    let (connector, _listener) = MemoryConnector::pair();
    connector.refuse_all(true);
    let manager = Arc::new(manager(&connector));

    let background = Arc::clone(&manager);
    let connecting = tokio::spawn(async move { background.connect(&session()).await });

    let mut status = manager.watch_status();
    status
        .wait_for(|s| s.state == ConnectionState::Reconnecting)
        .await
        .unwrap();
    assert_eq!(connector.attempt_count(), 1);

    manager.disconnect().await;
    assert!(matches!(
        connecting.await.unwrap(),
        Err(ConnectionError::Shutdown)
    ));

    // Way past every possible backoff delay: nothing fires.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempt_count(), 1);

    let final_status = manager.status();
    assert_eq!(final_status.state, ConnectionState::Disconnected);
    assert_eq!(final_status.attempt_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_stalled_handshake_times_out_then_retries() {
    let (connector, mut listener) = MemoryConnector::pair();
    connector.stall_next(1);
    let manager = manager(&connector);

    let handle = manager.connect(&session()).await.unwrap();

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(!attempts[0].accepted);
    assert!(attempts[1].accepted);
    // The 10 s connect timeout, then the first backoff delay.
    assert_gap(attempts[0].at, attempts[1].at, Duration::from_secs(12));

    assert_eq!(handle.status().state, ConnectionState::Connected);
    assert_eq!(handle.status().attempt_count, 0);
    assert!(listener.accept().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_connect_stalling_server_counts_each_timeout_as_failure() {
    let (connector, _listener) = MemoryConnector::pair();
    connector.stall_next(u32::MAX);
    let manager = Arc::new(manager(&connector));

    let background = Arc::clone(&manager);
    let connecting = tokio::spawn(async move { background.connect(&session()).await });

    let mut status = manager.watch_status();
    let seen = *status
        .wait_for(|s| s.state == ConnectionState::Reconnecting && s.attempt_count == 2)
        .await
        .unwrap();
    assert_eq!(seen.generation, 0);

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 2);
    assert_gap(attempts[0].at, attempts[1].at, Duration::from_secs(12));

    manager.disconnect().await;
    assert!(matches!(
        connecting.await.unwrap(),
        Err(ConnectionError::Shutdown)
    ));
}

// =========================================================================
// Drops and reconnects
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_peer_hang_up_emits_close_event_and_reconnects_after_2s() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let mut closes = manager.on_close();

    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();

    peer.hang_up();

    let event = closes.recv().await.unwrap();
    assert_eq!(event.generation, 1);
    assert!(!handle.is_live(1));
    assert_eq!(handle.status().state, ConnectionState::Reconnecting);
    assert_eq!(handle.status().attempt_count, 1);

    let mut status = manager.watch_status();
    let reconnected = *status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(reconnected.generation, 2);
    assert_eq!(reconnected.attempt_count, 0);
    assert!(handle.is_live(2));

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 2);
    assert_gap(attempts[0].at, attempts[1].at, Duration::from_millis(2_000));

    // The new transport is a different connection.
    let second = listener.accept().await.unwrap();
    assert_ne!(second.id(), peer.id());
}

#[tokio::test(start_paused = true)]
async fn test_drop_then_failed_reconnect_counts_each_failure() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let mut closes = manager.on_close();
    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();

    connector.fail_next(1);
    let dropped_at = Instant::now();
    peer.hang_up();

    let event = closes.recv().await.unwrap();
    assert_eq!(event.generation, 1);
    assert_eq!(handle.status().attempt_count, 1);

    let mut status = manager.watch_status();
    let failed = *status.wait_for(|s| s.attempt_count == 2).await.unwrap();
    assert_eq!(failed.state, ConnectionState::Reconnecting);
    assert_eq!(failed.generation, 1);

    let reconnected = *status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(reconnected.generation, 2);
    assert_eq!(reconnected.attempt_count, 0);

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 3);
    assert!(attempts[0].accepted);
    assert!(!attempts[1].accepted);
    assert!(attempts[2].accepted);
    assert_gap(dropped_at, attempts[1].at, Duration::from_millis(2_000));
    assert_gap(attempts[1].at, attempts[2].at, Duration::from_millis(4_000));
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_dropped_after_idle_timeout() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let mut closes = manager.on_close();
    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();
    let connected_at = Instant::now();

    let event = closes.recv().await.unwrap();

    assert_gap(connected_at, Instant::now(), Duration::from_secs(60));
    assert_eq!(event.generation, 1);
    assert!(event.reason.contains("no traffic"), "{}", event.reason);
    assert_eq!(handle.status().state, ConnectionState::Reconnecting);
    assert_eq!(handle.status().attempt_count, 1);
    assert!(!handle.is_live(1));

    // The client pinged before giving up.
    let (_, request) = read_request(&mut peer).await;
    assert_eq!(request, ClientRequest::Ping);
}

#[tokio::test(start_paused = true)]
async fn test_answered_pings_keep_connection_alive() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();

    let server = tokio::spawn(async move {
        let mut pings = 0;
        while let Some(frame) = peer.recv().await {
            let envelope: Envelope = JsonCodec.decode(&frame).unwrap();
            let (cid, request) = envelope.into_client_request().unwrap();
            assert_eq!(request, ClientRequest::Ping);
            pings += 1;
            // May race with the disconnect below.
            let pong = JsonCodec.encode(&Envelope::server(Some(cid), ServerMessage::Pong));
            peer.send(pong.unwrap());
        }
        pings
    });

    tokio::time::sleep(Duration::from_secs(300)).await;

    let status = handle.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.generation, 1);
    assert_eq!(connector.attempt_count(), 1);

    manager.disconnect().await;
    let pings = server.await.unwrap();
    assert!(pings >= 19, "only {pings} pings in 300 s");
}

#[tokio::test(start_paused = true)]
async fn test_connect_again_supersedes_running_supervisor() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);

    manager.connect(&session()).await.unwrap();
    let mut first = listener.accept().await.unwrap();

    let handle = manager
        .connect(&Session::new("t2", "Player-abc123"))
        .await
        .unwrap();
    let second = listener.accept().await.unwrap();

    // The old transport was closed, the new one uses the new token.
    assert_eq!(first.recv().await, None);
    assert_eq!(second.token(), "t2");
    assert_eq!(handle.status().generation, 2);
    assert_eq!(connector.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_transport_and_resets_status() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();

    manager.disconnect().await;

    assert_eq!(peer.recv().await, None);
    assert_eq!(handle.status().state, ConnectionState::Disconnected);
    assert_eq!(handle.status().attempt_count, 0);
    assert!(!handle.is_live(1));

    // Idempotent.
    manager.disconnect().await;
    assert_eq!(manager.status().state, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_drop_manager_stops_retrying() {
    let (connector, _listener) = MemoryConnector::pair();
    connector.refuse_all(true);
    let manager = Arc::new(manager(&connector));

    let background = Arc::clone(&manager);
    let connecting = tokio::spawn(async move { background.connect(&session()).await });

    let mut status = manager.watch_status();
    status
        .wait_for(|s| s.state == ConnectionState::Reconnecting)
        .await
        .unwrap();

    // The spawned connect holds the other reference; dropping it first
    // leaves the test as the last owner.
    connecting.abort();
    let _ = connecting.await;
    drop(status);
    drop(Arc::into_inner(manager).unwrap());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempt_count(), 1);
}

// =========================================================================
// Requests and pushes
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_request_while_disconnected_returns_not_connected() {
    let (connector, _listener) = MemoryConnector::pair();
    let manager = manager(&connector);

    let result = manager.handle().request(add_request()).await;

    assert!(matches!(result, Err(ConnectionError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_request_reply_correlated_by_cid() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();

    let requester = handle.clone();
    let pending = tokio::spawn(async move { requester.request(add_request()).await });

    let (cid, request) = read_request(&mut peer).await;
    assert_eq!(request, add_request());
    // A push in between must not be mistaken for the reply.
    send(
        &peer,
        None,
        ServerMessage::MatchmakerMatched(MatchmakerMatched {
            ticket: "other".into(),
            match_id: None,
            token: None,
        }),
    );
    send(
        &peer,
        Some(cid),
        ServerMessage::MatchmakerTicket {
            ticket: "ticket-1".into(),
        },
    );

    let reply = pending.await.unwrap().unwrap();
    assert_eq!(
        reply,
        Reply {
            generation: 1,
            message: ServerMessage::MatchmakerTicket {
                ticket: "ticket-1".into()
            },
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_request_in_flight_when_peer_hangs_up_returns_closed() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();

    let requester = handle.clone();
    let pending = tokio::spawn(async move { requester.request(add_request()).await });

    read_request(&mut peer).await;
    peer.hang_up();

    assert!(matches!(
        pending.await.unwrap(),
        Err(ConnectionError::Closed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_request_without_reply_times_out() {
    let (connector, mut listener) = MemoryConnector::pair();
    let config = ConnectionConfig {
        request_timeout: Duration::from_secs(1),
        ..ConnectionConfig::default()
    };
    let manager = ConnectionManager::new(connector.clone(), config);
    let handle = manager.connect(&session()).await.unwrap();
    let _peer = listener.accept().await.unwrap();

    let result = handle.request(add_request()).await;

    assert!(matches!(
        result,
        Err(ConnectionError::Timeout(d)) if d == Duration::from_secs(1)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_server_error_reply_is_delivered_as_message() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();

    let requester = handle.clone();
    let pending = tokio::spawn(async move { requester.request(add_request()).await });

    let (cid, _) = read_request(&mut peer).await;
    send(
        &peer,
        Some(cid),
        ServerMessage::Error {
            code: 3,
            message: "bad query".into(),
        },
    );

    let reply = pending.await.unwrap().unwrap();
    assert!(matches!(reply.message, ServerMessage::Error { code: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_reply_with_cid_returns_protocol_error() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let handle = manager.connect(&session()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();

    let requester = handle.clone();
    let pending = tokio::spawn(async move { requester.request(add_request()).await });

    let (cid, _) = read_request(&mut peer).await;
    // Two payloads in one envelope.
    let frame = format!(
        r#"{{"cid":"{cid}","matchmaker_ticket":{{"ticket":"a"}},"error":{{"code":1,"message":"x"}}}}"#
    );
    assert!(peer.send(frame));

    assert!(matches!(
        pending.await.unwrap(),
        Err(ConnectionError::Protocol(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_push_is_forwarded_to_subscribers() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = manager(&connector);
    let handle = manager.connect(&session()).await.unwrap();
    let peer = listener.accept().await.unwrap();
    let mut pushes = handle.subscribe();

    // Garbage is dropped without killing the connection.
    assert!(peer.send("not json"));
    let matched = MatchmakerMatched {
        ticket: "ticket-1".into(),
        match_id: Some("match-9".into()),
        token: None,
    };
    send(&peer, None, ServerMessage::MatchmakerMatched(matched.clone()));

    let push = pushes.recv().await.unwrap();
    assert_eq!(push, ServerMessage::MatchmakerMatched(matched));
    assert_eq!(handle.status().state, ConnectionState::Connected);
}
