//! Integration tests for the Wharf connection engine
//!
//! These tests drive a real server over loopback with tokio-tungstenite
//! clients, covering the connection lifecycle, the send path, admission
//! control, raw HTTP routing, statistics, and shutdown.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use wharf_server::prelude::*;

/// Events observed by the recording handler, in arrival order
#[derive(Debug)]
enum Event {
    Connected(ClientId, String),
    Disconnected(ClientId),
    Message(IncomingMessage),
    Stopped,
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_client_connected(&self, client: ClientInfo, request: &UpgradeRequest) {
        let _ = self.tx.send(Event::Connected(client.id, request.path.clone()));
    }

    async fn on_client_disconnected(&self, client_id: ClientId) {
        let _ = self.tx.send(Event::Disconnected(client_id));
    }

    async fn on_message_received(&self, message: IncomingMessage) {
        let _ = self.tx.send(Event::Message(message));
    }

    async fn on_server_stopped(&self) {
        let _ = self.tx.send(Event::Stopped);
    }
}

/// Start a server on an ephemeral port with a recording handler attached
async fn start_recorded(
    builder: ServerBuilder,
) -> (Server, SocketAddr, mpsc::UnboundedReceiver<Event>) {
    let server = builder.port(0).build().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    server.add_event_handler(Arc::new(Recorder { tx })).await;
    server.start().await.unwrap();
    let addr = server.local_addresses().await[0];
    (server, addr, rx)
}

async fn recv_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn expect_connected(rx: &mut mpsc::UnboundedReceiver<Event>) -> ClientId {
    match recv_event(rx).await {
        Event::Connected(id, _) => id,
        other => panic!("expected a connect event, got {:?}", other),
    }
}

/// Full lifecycle: connect, exchange messages both ways, disconnect
#[tokio::test]
async fn test_connect_roundtrip_disconnect() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/live")).await.unwrap();
    let id = match recv_event(&mut rx).await {
        Event::Connected(id, path) => {
            assert_eq!(path, "/live");
            id
        }
        other => panic!("expected a connect event, got {:?}", other),
    };

    assert!(server.is_client_connected(id).await);
    assert_eq!(server.client_count().await, 1);
    let clients = server.list_clients().await;
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].id, id);
    assert!(clients[0].remote_addr.ip().is_loopback());

    client.send(Message::text("hello wharf")).await.unwrap();
    match recv_event(&mut rx).await {
        Event::Message(message) => {
            assert_eq!(message.client_id, id);
            assert_eq!(message.kind, MessageKind::Text);
            assert_eq!(message.as_text(), "hello wharf");
        }
        other => panic!("expected a message event, got {:?}", other),
    }

    assert!(server.send_text(id, "roger").await);
    let received = client.next().await.unwrap().unwrap();
    assert_eq!(received, Message::text("roger"));

    assert!(server.send(id, vec![1u8, 2, 3], MessageKind::Binary).await);
    let received = client.next().await.unwrap().unwrap();
    assert_eq!(received.into_data().as_ref(), &[1u8, 2, 3]);

    client.close(None).await.unwrap();
    match recv_event(&mut rx).await {
        Event::Disconnected(gone) => assert_eq!(gone, id),
        other => panic!("expected a disconnect event, got {:?}", other),
    }
    assert!(!server.is_client_connected(id).await);

    server.shutdown().await;
}

/// The connect notification completes before the first message is read
#[tokio::test]
async fn test_connect_notification_blocks_reads() {
    struct SlowConnect {
        tx: mpsc::UnboundedSender<&'static str>,
    }

    #[async_trait]
    impl EventHandler for SlowConnect {
        async fn on_client_connected(&self, _client: ClientInfo, _request: &UpgradeRequest) {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = self.tx.send("connected");
        }

        async fn on_message_received(&self, _message: IncomingMessage) {
            let _ = self.tx.send("message");
        }
    }

    let server = Server::builder().port(0).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    server.add_event_handler(Arc::new(SlowConnect { tx })).await;
    server.start().await.unwrap();
    let addr = server.local_addresses().await[0];

    // The peer fires a message the moment its handshake completes, while the
    // connect handler is still sleeping
    let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    client.send(Message::text("early")).await.unwrap();

    let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, "connected");
    assert_eq!(second, "message");

    server.shutdown().await;
}

/// Identities never repeat, even when the same peer reconnects repeatedly
#[tokio::test]
async fn test_identity_unique_across_reconnects() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;

    let mut seen = HashSet::new();
    for _ in 0..5 {
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let id = expect_connected(&mut rx).await;
        assert!(seen.insert(id), "identity {id} handed out twice");

        client.close(None).await.unwrap();
        match recv_event(&mut rx).await {
            Event::Disconnected(gone) => assert_eq!(gone, id),
            other => panic!("expected a disconnect event, got {:?}", other),
        }
    }

    // A concurrent pair from the same address gets distinct identities too
    let (_c1, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let (_c2, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let first = expect_connected(&mut rx).await;
    let second = expect_connected(&mut rx).await;
    assert_ne!(first, second);
    seen.insert(first);
    seen.insert(second);
    assert_eq!(seen.len(), 7);

    server.shutdown().await;
}

/// Sends to unknown identities and with empty payloads fail without errors
#[tokio::test]
async fn test_send_failure_modes() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;
    let (_client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let id = expect_connected(&mut rx).await;

    assert!(!server.send(Uuid::new_v4(), vec![1u8], MessageKind::Binary).await);
    assert!(!server.send(id, Vec::<u8>::new(), MessageKind::Binary).await);
    assert!(!server.send_text(id, "").await);
    assert_eq!(server.statistics().messages_sent, 0);

    assert!(server.send(id, vec![1u8], MessageKind::Binary).await);
    assert_eq!(server.statistics().messages_sent, 1);

    server.shutdown().await;
}

/// A pre-cancelled call token abandons the send before it reaches the wire
#[tokio::test]
async fn test_send_with_cancellation() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;
    let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let id = expect_connected(&mut rx).await;

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(
        !server
            .send_with_cancellation(id, vec![9u8], MessageKind::Binary, &cancelled)
            .await
    );

    let live = CancellationToken::new();
    assert!(
        server
            .send_with_cancellation(id, vec![7u8], MessageKind::Binary, &live)
            .await
    );
    let received = client.next().await.unwrap().unwrap();
    assert_eq!(received.into_data().as_ref(), &[7u8]);

    server.shutdown().await;
}

/// Peers outside the allow-list are refused with 403 before any registration
#[tokio::test]
async fn test_admission_allow_list() {
    let (server, addr, mut rx) = start_recorded(
        Server::builder().permit_address("10.1.2.3".parse().unwrap()),
    )
    .await;

    match connect_async(format!("ws://{addr}")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 403),
        other => panic!("expected a 403 refusal, got {:?}", other),
    }
    assert_eq!(server.client_count().await, 0);

    // Admit loopback at runtime and connect again
    assert!(server.admission().permit("127.0.0.1".parse().unwrap()).await);
    let (_client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    expect_connected(&mut rx).await;

    server.shutdown().await;
}

/// Connections past the capacity limit are refused with 503
#[tokio::test]
async fn test_max_connections_cap() {
    let (server, addr, mut rx) = start_recorded(Server::builder().max_connections(1)).await;

    let (_first, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    expect_connected(&mut rx).await;

    match connect_async(format!("ws://{addr}")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 503),
        other => panic!("expected a 503 refusal, got {:?}", other),
    }
    assert_eq!(server.client_count().await, 1);

    server.shutdown().await;
}

/// Server-initiated disconnect closes politely and is idempotent
#[tokio::test]
async fn test_disconnect_client() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;
    let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let id = expect_connected(&mut rx).await;

    server.disconnect_client(id).await;

    let received = client.next().await.unwrap().unwrap();
    match received {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason.as_str(), "disconnected by server");
        }
        other => panic!("expected a close frame, got {:?}", other),
    }

    match recv_event(&mut rx).await {
        Event::Disconnected(gone) => assert_eq!(gone, id),
        other => panic!("expected a disconnect event, got {:?}", other),
    }
    assert!(!server.is_client_connected(id).await);

    // Disconnecting an absent identity is a silent no-op
    server.disconnect_client(id).await;
    server.disconnect_client(Uuid::new_v4()).await;
    assert!(
        timeout(Duration::from_millis(300), rx.recv()).await.is_err(),
        "no further disconnect events expected"
    );

    server.shutdown().await;
}

/// Stop closes every client, refuses new connections, and raises exactly one
/// stopped notification
#[tokio::test]
async fn test_stop_tears_everything_down() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;

    let (_c1, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let (_c2, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    expect_connected(&mut rx).await;
    expect_connected(&mut rx).await;

    server.stop().await.unwrap();
    assert!(!server.is_listening());
    assert!(connect_async(format!("ws://{addr}")).await.is_err());

    let mut stopped = 0;
    let mut disconnected = 0;
    while stopped == 0 || disconnected < 2 {
        match recv_event(&mut rx).await {
            Event::Stopped => stopped += 1,
            Event::Disconnected(_) => disconnected += 1,
            other => panic!("unexpected event during shutdown: {:?}", other),
        }
    }
    assert_eq!(stopped, 1);
    assert_eq!(disconnected, 2);

    // The quiet period after teardown must not produce a second stopped
    // notification
    assert!(
        timeout(Duration::from_millis(300), rx.recv()).await.is_err(),
        "no further events expected after teardown"
    );
}

/// An externally cancelled run stops accepting and reports stopped once
#[tokio::test]
async fn test_external_cancellation() {
    let server = Server::builder().port(0).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    server.add_event_handler(Arc::new(Recorder { tx })).await;

    let external = CancellationToken::new();
    server.start_with_cancellation(external.clone()).await.unwrap();
    let addr = server.local_addresses().await[0];

    let (_client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    expect_connected(&mut rx).await;

    external.cancel();

    let mut stopped = 0;
    let mut disconnected = 0;
    while stopped == 0 || disconnected == 0 {
        match recv_event(&mut rx).await {
            Event::Stopped => stopped += 1,
            Event::Disconnected(_) => disconnected += 1,
            other => panic!("unexpected event after cancellation: {:?}", other),
        }
    }
    assert!(!server.is_listening());
    assert!(connect_async(format!("ws://{addr}")).await.is_err());

    // The run is gone, so stop reports the lifecycle error
    assert!(server.stop().await.is_err());
    server.shutdown().await;
}

/// Statistics count messages and bytes in both directions
#[tokio::test]
async fn test_statistics() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;
    let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let id = expect_connected(&mut rx).await;

    for size in [10usize, 20, 30] {
        client.send(Message::binary(vec![0u8; size])).await.unwrap();
    }
    for _ in 0..3 {
        match recv_event(&mut rx).await {
            Event::Message(_) => {}
            other => panic!("expected a message event, got {:?}", other),
        }
    }

    assert!(server.send(id, vec![0u8; 5], MessageKind::Binary).await);
    assert!(server.send(id, vec![0u8; 15], MessageKind::Binary).await);

    let stats = server.statistics();
    assert_eq!(stats.messages_received, 3);
    assert_eq!(stats.bytes_received, 60);
    assert_eq!(stats.average_received_size, 20);
    assert_eq!(stats.messages_sent, 2);
    assert_eq!(stats.bytes_sent, 20);
    assert_eq!(stats.average_sent_size, 10);

    let started_at = stats.started_at;
    server.reset_statistics();
    let stats = server.statistics();
    assert_eq!(stats.messages_received, 0);
    assert_eq!(stats.bytes_received, 0);
    assert_eq!(stats.average_received_size, 0);
    assert_eq!(stats.started_at, started_at);

    server.shutdown().await;
}

/// Statistics can be disabled without affecting delivery
#[tokio::test]
async fn test_statistics_disabled() {
    let (server, addr, mut rx) =
        start_recorded(Server::builder().enable_statistics(false)).await;
    let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let id = expect_connected(&mut rx).await;

    client.send(Message::text("counted nowhere")).await.unwrap();
    match recv_event(&mut rx).await {
        Event::Message(message) => assert_eq!(message.as_text(), "counted nowhere"),
        other => panic!("expected a message event, got {:?}", other),
    }
    assert!(server.send_text(id, "still delivered").await);
    let received = client.next().await.unwrap().unwrap();
    assert_eq!(received, Message::text("still delivered"));

    let stats = server.statistics();
    assert_eq!(stats.messages_received, 0);
    assert_eq!(stats.messages_sent, 0);

    server.shutdown().await;
}

/// Pings are answered with pongs and never surface as messages
#[tokio::test]
async fn test_ping_answered_with_pong() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;
    let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    expect_connected(&mut rx).await;

    client.send(Message::Ping("ka".into())).await.unwrap();
    let received = client.next().await.unwrap().unwrap();
    match received {
        Message::Pong(payload) => assert_eq!(payload.as_ref(), b"ka"),
        other => panic!("expected a pong, got {:?}", other),
    }
    assert_eq!(server.statistics().messages_received, 0);

    server.shutdown().await;
}

/// Broadcast reaches every connected client
#[tokio::test]
async fn test_broadcast() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;
    let (mut c1, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let (mut c2, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    expect_connected(&mut rx).await;
    expect_connected(&mut rx).await;

    let delivered = server.broadcast("all hands", MessageKind::Text).await;
    assert_eq!(delivered, 2);

    assert_eq!(c1.next().await.unwrap().unwrap(), Message::text("all hands"));
    assert_eq!(c2.next().await.unwrap().unwrap(), Message::text("all hands"));

    server.shutdown().await;
}

/// Concurrent senders share one channel without corrupting messages
#[tokio::test]
async fn test_concurrent_sends_stay_whole() {
    let (server, addr, mut rx) = start_recorded(Server::builder()).await;
    let (client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let id = expect_connected(&mut rx).await;

    let payload_a = vec![0xAAu8; 32 * 1024];
    let payload_b = vec![0xBBu8; 32 * 1024];

    let sender_a = {
        let server = server.clone();
        let payload = payload_a.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                assert!(server.send(id, payload.clone(), MessageKind::Binary).await);
            }
        })
    };
    let sender_b = {
        let server = server.clone();
        let payload = payload_b.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                assert!(server.send(id, payload.clone(), MessageKind::Binary).await);
            }
        })
    };

    let (mut sink, mut stream) = client.split();
    let mut seen_a = 0;
    let mut seen_b = 0;
    for _ in 0..100 {
        let message = timeout(Duration::from_secs(10), stream.next())
            .await
            .expect("timed out receiving")
            .unwrap()
            .unwrap();
        let data = message.into_data();
        if data.as_ref() == payload_a.as_slice() {
            seen_a += 1;
        } else if data.as_ref() == payload_b.as_slice() {
            seen_b += 1;
        } else {
            panic!("received a corrupted message of {} bytes", data.len());
        }
    }
    assert_eq!(seen_a, 50);
    assert_eq!(seen_b, 50);

    sender_a.await.unwrap();
    sender_b.await.unwrap();
    sink.close().await.unwrap();
    server.shutdown().await;
}

/// Non-upgrade requests reach the raw handler; without one they get 400
#[tokio::test]
async fn test_raw_http_routing() {
    struct Health;

    #[async_trait]
    impl HttpRequestHandler for Health {
        async fn handle(&self, request: HttpRequest) -> HttpResponse {
            if request.path == "/health" {
                HttpResponse::text("healthy")
            } else {
                HttpResponse::not_found()
            }
        }
    }

    let (server, addr, _rx) =
        start_recorded(Server::builder().http_handler(Arc::new(Health))).await;

    let body = http_get(addr, "/health").await;
    assert!(body.starts_with("HTTP/1.1 200 OK"));
    assert!(body.ends_with("healthy"));

    let body = http_get(addr, "/nope").await;
    assert!(body.starts_with("HTTP/1.1 404 Not Found"));

    server.shutdown().await;

    // Without a handler the engine refuses the request itself
    let (server, addr, _rx) = start_recorded(Server::builder()).await;
    let body = http_get(addr, "/health").await;
    assert!(body.starts_with("HTTP/1.1 400 Bad Request"));
    server.shutdown().await;
}

/// Data pipelined behind the upgrade head is refused
#[tokio::test]
async fn test_pipelined_upgrade_rejected() {
    let (server, addr, _rx) = start_recorded(Server::builder()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET / HTTP/1.1\r\nHost: {addr}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\nEXTRA"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));

    server.shutdown().await;
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}
