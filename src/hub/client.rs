//! Client slot and identity types
//!
//! One slot per open connection. Slots are reused once released.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::transport::{Connection, ConnectionId};

/// Opaque client identity handed to browsers in the `welcome` frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ClientId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ClientId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Result of adding a topic to a client's subscription set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscribeOutcome {
    Added,
    AlreadySubscribed,
    LimitReached,
}

/// One entry of the client pool
pub(crate) struct ClientSlot {
    pub id: ClientId,
    /// Non-owning from the hub's point of view: the transport decides when
    /// the connection actually goes away.
    pub connection: Option<Arc<dyn Connection>>,
    /// Insertion-ordered, no duplicates
    pub topics: Vec<String>,
    pub active: bool,
    pub last_activity: Instant,
}

impl ClientSlot {
    pub fn vacant() -> Self {
        Self {
            id: ClientId(String::new()),
            connection: None,
            topics: Vec::new(),
            active: false,
            last_activity: Instant::now(),
        }
    }

    /// Take the slot for a newly opened connection
    pub fn occupy(&mut self, connection: Arc<dyn Connection>, now: Instant) -> ClientId {
        self.id = ClientId::generate();
        self.connection = Some(connection);
        self.topics.clear();
        self.active = true;
        self.last_activity = now;
        self.id.clone()
    }

    /// Free the slot, dropping the connection reference
    pub fn release(&mut self) {
        self.active = false;
        self.connection = None;
        self.topics.clear();
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id())
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    /// Add a topic; the limit is checked before the duplicate test
    pub fn subscribe(&mut self, topic: &str, limit: usize) -> SubscribeOutcome {
        if self.topics.len() >= limit {
            return SubscribeOutcome::LimitReached;
        }
        if self.is_subscribed(topic) {
            return SubscribeOutcome::AlreadySubscribed;
        }
        self.topics.push(topic.to_owned());
        SubscribeOutcome::Added
    }

    /// Remove a topic, keeping the remaining topics in order
    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        match self.topics.iter().position(|t| t == topic) {
            Some(index) => {
                self.topics.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }
}
