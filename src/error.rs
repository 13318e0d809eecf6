//! Error types
//!
//! Every failure in the hub is reported to the caller as a value; nothing
//! here terminates the process.

use tokio_tungstenite::tungstenite;

use crate::hub::ClientId;
use crate::protocol::EnvelopeError;
use crate::transport::ConnectionId;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, HubError>;

/// Error type for hub and server operations
#[derive(Debug)]
pub enum HubError {
    /// The hub is shutting down and refuses new work
    NotInitialized,
    /// Every client slot is in use
    ClientCapacity,
    /// Every handler slot is in use
    HandlerCapacity,
    /// The client already holds the maximum number of subscriptions
    TopicLimit { client: ClientId, limit: usize },
    /// No active client owns this connection
    ConnectionNotFound(ConnectionId),
    /// No active client has this id
    ClientNotFound(ClientId),
    /// No handler is registered for the topic
    NoHandler(String),
    /// Inbound message could not be decoded
    InvalidMessage(EnvelopeError),
    /// I/O failure in the bundled server
    Io(std::io::Error),
    /// WebSocket handshake or framing failure in the bundled server
    WebSocket(tungstenite::Error),
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubError::NotInitialized => write!(f, "Event hub is not initialized"),
            HubError::ClientCapacity => write!(f, "No free client slots"),
            HubError::HandlerCapacity => write!(f, "No free handler slots"),
            HubError::TopicLimit { client, limit } => {
                write!(f, "Client {} already has {} subscriptions", client, limit)
            }
            HubError::ConnectionNotFound(id) => write!(f, "No client for connection {}", id),
            HubError::ClientNotFound(id) => write!(f, "Client not found: {}", id),
            HubError::NoHandler(topic) => write!(f, "No handler registered for topic {}", topic),
            HubError::InvalidMessage(e) => write!(f, "Invalid message: {}", e),
            HubError::Io(e) => write!(f, "I/O error: {}", e),
            HubError::WebSocket(e) => write!(f, "WebSocket error: {}", e),
        }
    }
}

impl std::error::Error for HubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HubError::InvalidMessage(e) => Some(e),
            HubError::Io(e) => Some(e),
            HubError::WebSocket(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EnvelopeError> for HubError {
    fn from(e: EnvelopeError) -> Self {
        HubError::InvalidMessage(e)
    }
}

impl From<std::io::Error> for HubError {
    fn from(e: std::io::Error) -> Self {
        HubError::Io(e)
    }
}

impl From<tungstenite::Error> for HubError {
    fn from(e: tungstenite::Error) -> Self {
        HubError::WebSocket(e)
    }
}
