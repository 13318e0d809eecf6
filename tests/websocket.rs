//! End-to-end tests using a real WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use nvr_events::{Envelope, EventHub, HubConfig, HubServer, ServerConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    url: String,
    hub: Arc<EventHub>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<nvr_events::Result<()>>,
}

impl TestServer {
    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(TIMEOUT, self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Boot a server on an ephemeral port
async fn boot_server(config: ServerConfig) -> TestServer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let hub = Arc::new(EventHub::with_config(
        HubConfig::default().close_grace_period(Duration::from_millis(20)),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let server = HubServer::new(config, Arc::clone(&hub));
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
    });

    TestServer {
        url: format!("ws://{addr}"),
        hub,
        shutdown: Some(tx),
        handle,
    }
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

/// Next text frame decoded as JSON
async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("no frame received")
            .expect("stream ended")
            .expect("read failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Connect and consume the welcome frame, returning the client id
async fn connect_client(url: &str) -> (WsStream, String) {
    let mut ws = connect(url).await;
    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["topic"], "system");
    let id = welcome["payload"]["client_id"].as_str().unwrap().to_owned();
    (ws, id)
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_subscribe_and_receive_broadcast() {
    let server = boot_server(ServerConfig::default()).await;
    let (mut ws, client_id) = connect_client(&server.url).await;

    send_json(
        &mut ws,
        json!({"type": "subscribe", "topic": "stream_status", "payload": {"client_id": client_id}}),
    )
    .await;
    let ack = next_json(&mut ws).await;
    assert_eq!(
        ack,
        json!({"type": "ack", "topic": "system", "payload": {"message": "Subscribed"}})
    );
    assert!(server.hub.is_subscribed(&client_id, "stream_status"));

    let event = Envelope::new(
        "stream_status",
        "stream_status",
        json!({"name": "cam1", "running": true}),
    );
    assert_eq!(server.hub.broadcast("stream_status", &event), 1);
    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "stream_status", "topic": "stream_status", "payload": {"name": "cam1", "running": true}})
    );

    send_json(&mut ws, json!({"type": "unsubscribe", "topic": "stream_status"})).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["payload"]["message"], "Unsubscribed");
    assert_eq!(server.hub.broadcast("stream_status", &event), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_handler_replies_to_sender() {
    let server = boot_server(ServerConfig::default()).await;
    let weak = Arc::downgrade(&server.hub);
    server
        .hub
        .register_handler("discovery", move |client_id, payload| {
            let Some(hub) = weak.upgrade() else { return };
            let reply = Envelope::from_raw_payload("result", "discovery", payload);
            hub.send_to_client(client_id, &reply);
        })
        .unwrap();

    let (mut ws, _) = connect_client(&server.url).await;
    send_json(
        &mut ws,
        json!({"type": "start_discovery", "topic": "discovery", "payload": {"network": "auto"}}),
    )
    .await;

    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "result", "topic": "discovery", "payload": {"network": "auto"}})
    );

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let server = boot_server(ServerConfig::default()).await;
    let (mut ws, _) = connect_client(&server.url).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    send_json(&mut ws, json!({"type": "subscribe", "topic": "recordings"})).await;

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["payload"]["message"], "Subscribed");

    server.stop().await;
}

#[tokio::test]
async fn test_client_close_releases_slot() {
    let server = boot_server(ServerConfig::default()).await;
    let (mut ws, client_id) = connect_client(&server.url).await;
    send_json(&mut ws, json!({"type": "subscribe", "topic": "stream_status"})).await;
    next_json(&mut ws).await;

    ws.close(None).await.unwrap();

    let hub = Arc::clone(&server.hub);
    wait_for(|| hub.stats().active_clients == 0).await;
    assert!(server.hub.list_subscribers("stream_status").is_empty());
    assert!(!server.hub.is_subscribed(&client_id, "stream_status"));

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_sends_close_frame() {
    let server = boot_server(ServerConfig::default()).await;
    let (mut ws, _) = connect_client(&server.url).await;
    let hub = Arc::clone(&server.hub);

    server.stop().await;

    let closed = timeout(TIMEOUT, async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);
    assert!(!hub.is_initialized());
}

#[tokio::test]
async fn test_connection_limit() {
    let server = boot_server(ServerConfig::default().max_connections(1)).await;
    let (_first, _) = connect_client(&server.url).await;

    let second = timeout(TIMEOUT, connect_async(server.url.as_str())).await.unwrap();
    assert!(second.is_err());
    assert_eq!(server.hub.stats().active_clients, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_broadcast_fans_out() {
    let server = boot_server(ServerConfig::default()).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        let (mut ws, _) = connect_client(&server.url).await;
        send_json(&mut ws, json!({"type": "subscribe", "topic": "recordings"})).await;
        next_json(&mut ws).await;
        clients.push(ws);
    }
    let (mut bystander, _) = connect_client(&server.url).await;

    let event = Envelope::new("recording_added", "recordings", json!({"id": 7}));
    assert_eq!(server.hub.broadcast("recordings", &event), 3);

    for ws in &mut clients {
        assert_eq!(next_json(ws).await["payload"]["id"], 7);
    }

    // The bystander only sees the ack for its own subscription
    send_json(&mut bystander, json!({"type": "subscribe", "topic": "other"})).await;
    assert_eq!(next_json(&mut bystander).await["type"], "ack");

    server.stop().await;
}
