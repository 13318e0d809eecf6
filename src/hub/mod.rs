//! Publish/subscribe event hub
//!
//! The hub sits between browser clients connected over WebSocket and the
//! backend subsystems (stream manager, recordings, discovery). Clients
//! subscribe to named topics; backends publish to a topic without knowing
//! who is listening, and register handlers for the messages clients send.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<EventHub>
//!                ┌──────────────────────────────┐
//!                │ lifecycle: Mutex<Lifecycle>  │
//!                │ pools: Arc<Mutex<Pools {     │
//!                │   clients:  [ClientSlot; N], │
//!                │   handlers: [HandlerSlot; M],│
//!                │ }>>                          │
//!                └──────┬────────────────┬──────┘
//!                       │                │
//!        handle_open/message/close   broadcast / send_to_client
//!                       │                │
//!                 [transport]       [backends]
//!                       │                │
//!                       └──► Connection::send ──► socket
//! ```
//!
//! # Locking
//!
//! One lock guards both pools. Sends and handler callbacks run only after
//! it is released: broadcast copies the target connections out first, and
//! a failed send re-locates its client by id to flag the connection as
//! closing. Flagged and idle clients are reclaimed by a sweep at the start
//! of `handle_open`, `broadcast` and `list_subscribers`.

pub mod client;
pub mod config;
pub mod handler;
pub mod lifecycle;
pub(crate) mod pools;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use client::ClientId;
pub use config::HubConfig;
pub use handler::{HandlerRegistrar, TopicHandler};
pub use store::{Dispatch, EventHub};
