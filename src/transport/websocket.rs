//! Channel-backed WebSocket connection
//!
//! Outbound frames are pushed onto an unbounded channel that the
//! connection's writer task drains into the socket, so `send` never waits
//! on the network. Releasing the socket cancels the connection's token; the
//! reader and writer tasks observe it and drop their halves.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::{Connection, ConnectionId, FrameKind};

/// Hub-facing handle for one WebSocket connection
#[derive(Debug)]
pub struct WsConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    tx: mpsc::UnboundedSender<Message>,
    closing: AtomicBool,
    cancel: CancellationToken,
}

impl WsConnection {
    /// Create a connection handle and the receiving end of its outbound queue
    pub fn new(id: ConnectionId, peer_addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            id,
            peer_addr,
            tx,
            closing: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        };
        (conn, rx)
    }

    /// Remote peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Token cancelled when the socket is released
    pub fn cancelled_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn enqueue(&self, message: Message) -> io::Result<()> {
        self.tx
            .send(message)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer task has exited"))
    }
}

impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, data: Bytes, kind: FrameKind) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket released"));
        }

        let len = data.len();
        let message = match kind {
            FrameKind::Text => {
                let text = String::from_utf8(data.to_vec())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Message::Text(text)
            }
            FrameKind::Binary => Message::Binary(data.to_vec()),
        };

        self.enqueue(message)?;
        Ok(len)
    }

    fn send_close(&self) -> io::Result<()> {
        self.enqueue(Message::Close(None))
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn close_socket(&self) {
        tracing::debug!(connection_id = %self.id, peer = %self.peer_addr, "Releasing socket");
        self.cancel.cancel();
    }
}
