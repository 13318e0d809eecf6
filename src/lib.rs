//! Real-time publish/subscribe event hub for a network video recorder
//!
//! Browser clients connect over WebSocket, receive a `welcome` frame with
//! their client id and subscribe to topics such as `stream_status` or
//! `recordings`. Backend subsystems publish to topics through
//! [`EventHub::broadcast`] and register handlers for the messages clients
//! send back.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nvr_events::{Envelope, EventHub, HubServer, ServerConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> nvr_events::Result<()> {
//!     let hub = Arc::new(EventHub::new());
//!     hub.register_handler("discovery", |client_id, payload| {
//!         println!("{client_id} asked for discovery: {payload}");
//!     })?;
//!
//!     let publisher = Arc::clone(&hub);
//!     tokio::spawn(async move {
//!         let event = Envelope::new("update", "stream_status", json!({"name": "cam1"}));
//!         publisher.broadcast("stream_status", &event);
//!     });
//!
//!     let server = HubServer::new(ServerConfig::default(), hub);
//!     server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! }
//! ```

pub mod error;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod stats;
pub mod transport;

pub use error::{HubError, Result};
pub use hub::{ClientId, Dispatch, EventHub, HandlerRegistrar, HubConfig, TopicHandler};
pub use protocol::{Envelope, EnvelopeError, MessageType};
pub use server::{HubServer, ServerConfig};
pub use stats::HubStats;
pub use transport::{Connection, ConnectionId, FrameKind, WsConnection};
