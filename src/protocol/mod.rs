//! Wire protocol between browser clients and the event hub
//!
//! This module provides:
//! - The `{type, topic, payload}` envelope codec
//! - Reserved message types, system topic and ack texts

pub mod constants;
pub mod envelope;

pub use envelope::{fallback_welcome, Envelope, EnvelopeError, MessageType};
