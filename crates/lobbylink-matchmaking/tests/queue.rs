//! Integration tests for the matchmaking client over the in-memory
//! transport, with a scripted matchmaker playing the server.

use std::sync::{Arc, Mutex};

use lobbylink_connection::{ConnectionConfig, ConnectionError, ConnectionManager, ConnectionState};
use lobbylink_matchmaking::{MatchmakerConfig, MatchmakingClient, MatchmakingError};
use lobbylink_protocol::{
    ClientRequest, Codec, Envelope, JsonCodec, MatchmakerMatched, QueueMode, ServerMessage,
};
use lobbylink_session::Session;
use lobbylink_transport::{MemoryConnector, MemoryListener, MemoryPeer};
use tokio::task::JoinHandle;

// =========================================================================
// Scripted matchmaker
// =========================================================================

/// Everything the fake server received, in order.
type Log = Arc<Mutex<Vec<ClientRequest>>>;

/// How the fake server answers `matchmaker_add`.
#[derive(Clone, Copy)]
enum AddBehavior {
    Ticket,
    Reject,
}

fn send(peer: &MemoryPeer, cid: Option<String>, message: ServerMessage) {
    let frame = JsonCodec.encode(&Envelope::server(cid, message)).unwrap();
    peer.send(frame);
}

/// Answers requests on one peer until the client goes away. Keepalive
/// pings are answered but not logged.
fn serve(mut peer: MemoryPeer, log: Log, behavior: AddBehavior) -> JoinHandle<MemoryPeer> {
    tokio::spawn(async move {
        let mut issued = 0;
        while let Some(frame) = peer.recv().await {
            let envelope: Envelope = JsonCodec.decode(&frame).unwrap();
            let (cid, request) = envelope.into_client_request().unwrap();
            if request == ClientRequest::Ping {
                send(&peer, Some(cid), ServerMessage::Pong);
                continue;
            }
            log.lock().unwrap().push(request.clone());

            let reply = match (request, behavior) {
                (ClientRequest::MatchmakerAdd(_), AddBehavior::Ticket) => {
                    issued += 1;
                    ServerMessage::MatchmakerTicket {
                        ticket: format!("ticket-{issued}"),
                    }
                }
                (ClientRequest::MatchmakerAdd(_), AddBehavior::Reject) => ServerMessage::Error {
                    code: 3,
                    message: "invalid query".into(),
                },
                (ClientRequest::MatchmakerRemove(_), _) => ServerMessage::Ack,
                (ClientRequest::Ping, _) => ServerMessage::Pong,
            };
            send(&peer, Some(cid), reply);
        }
        peer
    })
}

struct Harness {
    connector: MemoryConnector,
    listener: MemoryListener,
    manager: ConnectionManager<MemoryConnector>,
    client: MatchmakingClient,
    log: Log,
}

async fn connected(behavior: AddBehavior) -> (Harness, JoinHandle<MemoryPeer>) {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = ConnectionManager::new(connector.clone(), ConnectionConfig::default());
    let handle = manager
        .connect(&Session::new("t1", "Player-abc123"))
        .await
        .unwrap();
    let log = Log::default();
    let peer = listener.accept().await.unwrap();
    let server = serve(peer, Arc::clone(&log), behavior);

    let client = MatchmakingClient::new(handle, MatchmakerConfig::default());
    (
        Harness {
            connector,
            listener,
            manager,
            client,
            log,
        },
        server,
    )
}

fn requests(log: &Log) -> Vec<ClientRequest> {
    log.lock().unwrap().clone()
}

// =========================================================================
// enqueue
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_enqueue_while_disconnected_returns_not_connected() {
    let (connector, _listener) = MemoryConnector::pair();
    let manager = ConnectionManager::new(connector, ConnectionConfig::default());
    let client = MatchmakingClient::new(manager.handle(), MatchmakerConfig::default());

    let result = client.enqueue(QueueMode::Casual).await;

    assert!(matches!(result, Err(MatchmakingError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_connected_returns_live_ticket() {
    let (h, _server) = connected(AddBehavior::Ticket).await;

    let ticket = h.client.enqueue(QueueMode::Ranked).await.unwrap();

    assert_eq!(ticket.id(), "ticket-1");
    assert_eq!(ticket.mode(), QueueMode::Ranked);
    assert_eq!(ticket.generation(), 1);
    assert!(h.client.is_live(&ticket));

    let sent = requests(&h.log);
    assert_eq!(sent.len(), 1);
    let ClientRequest::MatchmakerAdd(add) = &sent[0] else {
        panic!("expected matchmaker_add, got {:?}", sent[0]);
    };
    assert_eq!(add.min_count, 2);
    assert_eq!(add.max_count, 2);
    assert_eq!(add.query, "+properties.mode:ranked");
    assert_eq!(add.string_properties.get("mode").map(String::as_str), Some("ranked"));
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_rejected_returns_rejected_with_code() {
    let (h, _server) = connected(AddBehavior::Reject).await;

    let result = h.client.enqueue(QueueMode::Casual).await;

    match result {
        Err(MatchmakingError::Rejected { code, message }) => {
            assert_eq!(code, 3);
            assert_eq!(message, "invalid query");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

// =========================================================================
// dequeue and ticket liveness
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_dequeue_live_ticket_sends_remove() {
    let (h, _server) = connected(AddBehavior::Ticket).await;
    let ticket = h.client.enqueue(QueueMode::Casual).await.unwrap();

    h.client.dequeue(&ticket).await.unwrap();

    let sent = requests(&h.log);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], ClientRequest::remove("ticket-1"));
}

#[tokio::test(start_paused = true)]
async fn test_dequeue_after_connection_drop_is_noop() {
    let (mut h, server) = connected(AddBehavior::Ticket).await;
    let ticket = h.client.enqueue(QueueMode::Casual).await.unwrap();
    let mut closes = h.manager.on_close();

    // The server hangs up; the ticket dies with its connection.
    server.abort();
    let _ = server.await;
    closes.recv().await.unwrap();

    assert!(!h.client.is_live(&ticket));
    h.client.dequeue(&ticket).await.unwrap();
    assert_eq!(requests(&h.log).len(), 1);

    // Still dead after the reconnect: different generation.
    let mut status = h.manager.watch_status();
    status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap();
    let _peer = h.listener.accept().await.unwrap();
    assert!(!h.client.is_live(&ticket));
    h.client.dequeue(&ticket).await.unwrap();
    assert_eq!(requests(&h.log).len(), 1);
    assert_eq!(h.connector.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_after_connection_drop_returns_not_connected() {
    let (h, server) = connected(AddBehavior::Ticket).await;
    let ticket = h.client.enqueue(QueueMode::Casual).await.unwrap();
    let mut closes = h.manager.on_close();

    server.abort();
    let _ = server.await;
    closes.recv().await.unwrap();

    assert!(!h.client.is_live(&ticket));
    assert!(matches!(
        h.client.enqueue(QueueMode::Casual).await,
        Err(MatchmakingError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dequeue_after_disconnect_is_noop() {
    let (h, _server) = connected(AddBehavior::Ticket).await;
    let ticket = h.client.enqueue(QueueMode::Casual).await.unwrap();

    h.manager.disconnect().await;

    assert!(!h.client.is_live(&ticket));
    h.client.dequeue(&ticket).await.unwrap();
    assert_eq!(requests(&h.log).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dequeue_unrecognized_reply_returns_error() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = ConnectionManager::new(connector, ConnectionConfig::default());
    let handle = manager
        .connect(&Session::new("t1", "Player-abc123"))
        .await
        .unwrap();
    let mut peer = listener.accept().await.unwrap();
    let client = MatchmakingClient::new(handle, MatchmakerConfig::default());

    let enqueue = {
        let client = client.clone();
        tokio::spawn(async move { client.enqueue(QueueMode::Casual).await })
    };
    let frame = peer.recv().await.unwrap();
    let (cid, _) = JsonCodec
        .decode::<Envelope>(&frame)
        .unwrap()
        .into_client_request()
        .unwrap();
    send(
        &peer,
        Some(cid),
        ServerMessage::MatchmakerTicket {
            ticket: "ticket-1".into(),
        },
    );
    let ticket = enqueue.await.unwrap().unwrap();

    let dequeue = {
        let client = client.clone();
        tokio::spawn(async move { client.dequeue(&ticket).await })
    };
    let frame = peer.recv().await.unwrap();
    let (cid, request) = JsonCodec
        .decode::<Envelope>(&frame)
        .unwrap()
        .into_client_request()
        .unwrap();
    assert_eq!(request, ClientRequest::remove("ticket-1"));
    // A payload kind the client does not model is not an acknowledgement.
    assert!(peer.send(format!(r#"{{"cid":"{cid}","status_presence_event":{{}}}}"#)));

    assert!(matches!(
        dequeue.await.unwrap(),
        Err(MatchmakingError::Connection(ConnectionError::Protocol(_)))
    ));
}

// =========================================================================
// Match notifications
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_matches_yields_matched_push_for_ticket() {
    let (connector, mut listener) = MemoryConnector::pair();
    let manager = ConnectionManager::new(connector, ConnectionConfig::default());
    let handle = manager
        .connect(&Session::new("t1", "Player-abc123"))
        .await
        .unwrap();
    let mut peer = listener.accept().await.unwrap();
    let client = MatchmakingClient::new(handle, MatchmakerConfig::default());
    let mut matches = client.matches();

    let enqueue = {
        let client = client.clone();
        tokio::spawn(async move { client.enqueue(QueueMode::Casual).await })
    };
    let frame = peer.recv().await.unwrap();
    let (cid, _) = JsonCodec
        .decode::<Envelope>(&frame)
        .unwrap()
        .into_client_request()
        .unwrap();
    send(
        &peer,
        Some(cid),
        ServerMessage::MatchmakerTicket {
            ticket: "ticket-7".into(),
        },
    );
    let ticket = enqueue.await.unwrap().unwrap();

    // An unrelated push first, then the match.
    send(&peer, None, ServerMessage::Error {
        code: 0,
        message: "noise".into(),
    });
    send(
        &peer,
        None,
        ServerMessage::MatchmakerMatched(MatchmakerMatched {
            ticket: "ticket-7".into(),
            match_id: Some("match-1".into()),
            token: None,
        }),
    );

    let found = matches.recv().await.unwrap();
    assert!(found.is_for(&ticket));
    assert_eq!(found.match_id.as_deref(), Some("match-1"));
}
