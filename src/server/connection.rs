//! Per-connection WebSocket handling
//!
//! Each accepted socket is upgraded to WebSocket and split. A writer task
//! drains the connection's outbound queue into the sink; the reader loop
//! feeds inbound frames to the hub until the peer goes away or the hub
//! releases the socket.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, Result};
use crate::hub::EventHub;
use crate::transport::{Connection, ConnectionId, WsConnection};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Run one connection to completion
pub(crate) async fn serve_connection(
    id: ConnectionId,
    socket: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<EventHub>,
    handshake_timeout: Duration,
) -> Result<()> {
    let ws = match tokio::time::timeout(handshake_timeout, tokio_tungstenite::accept_async(socket)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(HubError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "WebSocket handshake timed out",
            )))
        }
    };

    tracing::debug!(connection_id = %id, peer = %peer_addr, "WebSocket handshake complete");

    let (sink, mut stream) = ws.split();
    let (conn, rx) = WsConnection::new(id, peer_addr);
    let cancel = conn.cancelled_token();
    let conn: Arc<dyn Connection> = Arc::new(conn);

    let writer = tokio::spawn(write_loop(id, sink, rx, cancel.clone()));

    let result = match hub.handle_open(Arc::clone(&conn)) {
        Ok(_) => {
            let result = read_loop(id, &mut stream, &hub, &cancel).await;
            hub.handle_close(id);
            result
        }
        Err(e) => {
            tracing::warn!(connection_id = %id, peer = %peer_addr, error = %e, "Connection not registered, closing");
            let _ = conn.send_close();
            Ok(())
        }
    };

    cancel.cancel();
    if let Err(e) = writer.await {
        tracing::debug!(connection_id = %id, error = %e, "Writer task ended abnormally");
    }

    result
}

async fn read_loop(
    id: ConnectionId,
    stream: &mut WsStream,
    hub: &EventHub,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(connection_id = %id, "Socket released by hub");
                return Ok(());
            }
            msg = stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => dispatch(hub, id, text.as_bytes()),
            Some(Ok(Message::Binary(data))) => dispatch(hub, id, &data),
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(connection_id = %id, frame = ?frame, "Peer closed connection");
                return Ok(());
            }
            // Ping/pong replies are handled by tungstenite
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}

fn dispatch(hub: &EventHub, id: ConnectionId, data: &[u8]) {
    if let Err(e) = hub.handle_message(id, data) {
        tracing::debug!(connection_id = %id, error = %e, "Message not dispatched");
    }
}

async fn write_loop(
    id: ConnectionId,
    mut sink: WsSink,
    mut rx: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    tracing::debug!(connection_id = %id, error = %e, "Write failed");
                    break;
                }
                if is_close {
                    break;
                }
            }
            _ = cancel.cancelled() => {
                // Flush frames queued before the release, such as a close frame
                while let Ok(msg) = rx.try_recv() {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }

    let _ = sink.close().await;
}
