//! Bundled WebSocket server
//!
//! A reference transport for the hub: accepts TCP connections, upgrades
//! them to WebSocket and reports open, message and close events.

pub mod config;
pub(crate) mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::HubServer;
