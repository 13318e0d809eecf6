//! Transport seam
//!
//! The hub never touches sockets directly. A transport accepts connections,
//! frames messages, and reports open/message/close events to the hub; the
//! hub in turn drives outbound traffic through the [`Connection`] trait.
//!
//! [`WsConnection`] is the channel-backed implementation used by the bundled
//! WebSocket server.

pub mod websocket;

use std::io;

use bytes::Bytes;

pub use websocket::WsConnection;

/// Transport-assigned identity of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload kind of an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// A live transport connection as seen by the hub
///
/// Implementations must be cheap to call from any thread. None of these
/// methods may block on network I/O for longer than the transport's own
/// socket timeouts.
pub trait Connection: Send + Sync {
    /// Stable identity, unique among open connections
    fn id(&self) -> ConnectionId;

    /// Send one frame, returning the number of bytes accepted
    ///
    /// `Ok(0)` and `Err(_)` are both delivery failures.
    fn send(&self, data: Bytes, kind: FrameKind) -> io::Result<usize>;

    /// Send a protocol-level close frame
    fn send_close(&self) -> io::Result<()>;

    /// Whether the connection is already being torn down
    fn is_closing(&self) -> bool;

    /// Flag the connection for teardown
    fn mark_closing(&self);

    /// Whether the underlying socket is still held
    fn is_open(&self) -> bool;

    /// Release the underlying socket without waiting for the peer
    fn close_socket(&self);
}

/// Whether a send result counts as a delivery
pub(crate) fn delivered(result: &io::Result<usize>) -> bool {
    matches!(result, Ok(n) if *n > 0)
}
