//! Event hub implementation
//!
//! The central registry of connected clients and backend handlers. Entry
//! points may be called concurrently from any number of connection tasks
//! and backend threads.
//!
//! No lock is ever held across a network send or a handler callback: data
//! needed for I/O is copied out under the lock, the lock is released, and
//! any follow-up mutation re-locates the client by its stable id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::client::{ClientId, SubscribeOutcome};
use super::config::HubConfig;
use super::handler::{HandlerRegistrar, TopicHandler};
use super::lifecycle::Lifecycle;
use super::pools::Pools;
use crate::error::{HubError, Result};
use crate::protocol::constants::{ACK_SUBSCRIBED, ACK_UNSUBSCRIBED};
use crate::protocol::{fallback_welcome, Envelope, MessageType};
use crate::stats::{HubCounters, HubStats};
use crate::transport::{delivered, Connection, ConnectionId, FrameKind};

/// Shared pool state; the outer `Arc` lets shutdown swap in a fresh lock
pub(crate) type SharedPools = Arc<Mutex<Pools>>;

/// What happened to an inbound client message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Topic added and acknowledged
    Subscribed,
    /// Topic was already present; nothing sent
    AlreadySubscribed,
    /// Topic removed and acknowledged
    Unsubscribed,
    /// Topic was not present; nothing sent
    NotSubscribed,
    /// Delivered to the topic's backend handler
    Handled,
}

/// Publish/subscribe hub between browser clients and backend subsystems
pub struct EventHub {
    pub(crate) config: HubConfig,

    /// Initialization state; held only for short transitions
    pub(crate) lifecycle: Mutex<Lifecycle>,

    /// Client and handler pools behind the per-operation lock
    pub(crate) pools: RwLock<SharedPools>,

    /// Every registered connection, reachable even while the pool lock is
    /// stuck; always locked after the pool lock, never before
    pub(crate) live: Mutex<HashMap<ConnectionId, Arc<dyn Connection>>>,

    /// Lazily installs backend handlers
    registrar: RwLock<Option<Arc<dyn HandlerRegistrar>>>,

    pub(crate) counters: HubCounters,
}

impl EventHub {
    /// Create an uninitialized hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create an uninitialized hub with custom configuration
    ///
    /// The pools are allocated by [`EventHub::initialize`], which every
    /// entry point runs on demand.
    pub fn with_config(config: HubConfig) -> Self {
        let pools = Arc::new(Mutex::new(Pools::new(&config)));
        Self {
            config,
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            pools: RwLock::new(pools),
            live: Mutex::new(HashMap::new()),
            registrar: RwLock::new(None),
            counters: HubCounters::default(),
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Install the hook used to (re-)register backend handlers
    pub fn set_registrar<R>(&self, registrar: R)
    where
        R: HandlerRegistrar + 'static,
    {
        *self.registrar.write() = Some(Arc::new(registrar));
    }

    /// Current pool cell
    pub(crate) fn shared(&self) -> SharedPools {
        self.pools.read().clone()
    }

    fn sweep_locked(&self, pools: &mut Pools) {
        let swept = pools.sweep(Instant::now(), self.config.inactivity_timeout);
        if !swept.connections.is_empty() {
            let mut live = self.live.lock();
            for id in &swept.connections {
                live.remove(id);
            }
        }
        self.counters.record_swept(swept.count);
    }

    fn run_registrar(&self) {
        let registrar = self.registrar.read().clone();
        if let Some(registrar) = registrar {
            registrar.register_handlers(self);
        }
    }

    fn lookup_handler(&self, topic: &str) -> Option<TopicHandler> {
        self.shared().lock().handler_for(topic)
    }

    /// Flag a client's connection for reclamation after a failed send
    fn mark_failed(&self, client_id: &str) {
        let shared = self.shared();
        let pools = shared.lock();
        if let Some(i) = pools.find_client_by_id(client_id) {
            if let Some(conn) = pools.clients[i].connection.as_ref() {
                conn.mark_closing();
            }
        }
        self.counters.record_failure();
    }

    /// Register a newly opened connection
    ///
    /// Allocates a client slot, assigns a fresh id and sends the `welcome`
    /// frame. Fails when the hub is shutting down or every slot is taken;
    /// the connection is then left without an identity. Opening a connection
    /// that is already registered returns its existing id.
    pub fn handle_open(&self, conn: Arc<dyn Connection>) -> Result<ClientId> {
        if !self.ensure_initialized("connection open") {
            return Err(HubError::NotInitialized);
        }

        let connection_id = conn.id();
        let client_id = {
            let shared = self.shared();
            let mut pools = shared.lock();

            self.sweep_locked(&mut pools);

            if let Some(i) = pools.find_client_by_connection(connection_id) {
                let existing = pools.clients[i].id.clone();
                tracing::warn!(client_id = %existing, connection_id = %connection_id, "Connection already registered");
                return Ok(existing);
            }

            let Some(slot) = pools.find_free_client_slot() else {
                tracing::error!(connection_id = %connection_id, "No free client slots");
                return Err(HubError::ClientCapacity);
            };

            let client_id = pools.clients[slot].occupy(Arc::clone(&conn), Instant::now());
            self.live.lock().insert(connection_id, Arc::clone(&conn));
            client_id
        };

        tracing::info!(client_id = %client_id, connection_id = %connection_id, "WebSocket client connected");

        self.send_welcome(conn.as_ref(), &client_id);
        Ok(client_id)
    }

    /// Send the `welcome` frame, retrying once with a hand-built frame
    fn send_welcome(&self, conn: &dyn Connection, client_id: &ClientId) {
        let primary = conn.send(
            Envelope::welcome(client_id.as_str()).encode_bytes(),
            FrameKind::Text,
        );
        if delivered(&primary) {
            tracing::debug!(client_id = %client_id, "Welcome message sent");
            return;
        }

        tracing::warn!(
            client_id = %client_id,
            result = ?primary,
            "Failed to send welcome message, trying simplified format"
        );

        let fallback = conn.send(
            Bytes::from(fallback_welcome(client_id.as_str())),
            FrameKind::Text,
        );
        if delivered(&fallback) {
            tracing::debug!(client_id = %client_id, "Simplified welcome message sent");
        } else {
            tracing::error!(
                client_id = %client_id,
                result = ?fallback,
                "Failed to send simplified welcome message"
            );
        }
    }

    /// Forget the client owning a closed connection
    ///
    /// Returns `false` when no client matched, which happens for duplicate
    /// close events and for closes arriving after shutdown.
    pub fn handle_close(&self, conn: ConnectionId) -> bool {
        if !self.is_initialized() {
            tracing::debug!(connection_id = %conn, "Connection closed while hub is not initialized");
            return false;
        }

        let shared = self.shared();
        let mut pools = shared.lock();
        self.live.lock().remove(&conn);

        match pools.find_client_by_connection(conn) {
            Some(i) => {
                tracing::info!(client_id = %pools.clients[i].id, connection_id = %conn, "Removing WebSocket client");
                pools.clients[i].release();
                true
            }
            None => {
                tracing::warn!(connection_id = %conn, "Client not found for connection during close");
                false
            }
        }
    }

    /// Decode and dispatch one inbound frame
    ///
    /// Errors are reported to the caller for observability only; the sender
    /// is never told about them and the connection stays open.
    pub fn handle_message(&self, conn: ConnectionId, data: &[u8]) -> Result<Dispatch> {
        if !self.ensure_initialized("message") {
            return Err(HubError::NotInitialized);
        }

        let envelope = Envelope::decode(data).map_err(|e| {
            tracing::warn!(connection_id = %conn, error = %e, "Dropping malformed message");
            HubError::InvalidMessage(e)
        })?;

        tracing::trace!(
            connection_id = %conn,
            kind = %envelope.kind,
            topic = %envelope.topic,
            "Received message"
        );

        let client_id = {
            let shared = self.shared();
            let mut pools = shared.lock();

            let Some(i) = pools.find_client_by_connection(conn) else {
                tracing::error!(connection_id = %conn, "Client not found for connection");
                return Err(HubError::ConnectionNotFound(conn));
            };

            pools.clients[i].touch(Instant::now());
            pools.clients[i].id.clone()
        };

        match envelope.message_type() {
            MessageType::Subscribe => self.subscribe(&client_id, &envelope),
            MessageType::Unsubscribe => self.unsubscribe(&client_id, &envelope.topic),
            _ => self.dispatch_to_handler(&client_id, &envelope),
        }
    }

    fn subscribe(&self, client_id: &ClientId, envelope: &Envelope) -> Result<Dispatch> {
        let topic = envelope.topic.as_str();
        let limit = self.config.max_topics_per_client;

        let outcome = {
            let shared = self.shared();
            let mut pools = shared.lock();

            let Some(i) = pools.find_client_by_id(client_id.as_str()) else {
                tracing::error!(client_id = %client_id, "Client not found");
                return Err(HubError::ClientNotFound(client_id.clone()));
            };

            pools.clients[i].subscribe(topic, limit)
        };

        match outcome {
            SubscribeOutcome::LimitReached => {
                tracing::error!(client_id = %client_id, topic, limit, "Client has too many subscriptions");
                Err(HubError::TopicLimit {
                    client: client_id.clone(),
                    limit,
                })
            }
            SubscribeOutcome::AlreadySubscribed => {
                tracing::debug!(client_id = %client_id, topic, "Client already subscribed");
                Ok(Dispatch::AlreadySubscribed)
            }
            SubscribeOutcome::Added => {
                tracing::info!(client_id = %client_id, topic, "Client subscribed");
                if let Some(claimed) = envelope.payload_client_id() {
                    tracing::info!(client_id = %client_id, claimed = %claimed, "Subscription payload carries client_id");
                }

                self.send_to_client(client_id.as_str(), &Envelope::ack(ACK_SUBSCRIBED));

                // A client just showed interest; backends may need lazy setup
                self.run_registrar();
                Ok(Dispatch::Subscribed)
            }
        }
    }

    fn unsubscribe(&self, client_id: &ClientId, topic: &str) -> Result<Dispatch> {
        let removed = {
            let shared = self.shared();
            let mut pools = shared.lock();

            let Some(i) = pools.find_client_by_id(client_id.as_str()) else {
                tracing::error!(client_id = %client_id, "Client not found");
                return Err(HubError::ClientNotFound(client_id.clone()));
            };

            pools.clients[i].unsubscribe(topic)
        };

        if !removed {
            return Ok(Dispatch::NotSubscribed);
        }

        tracing::info!(client_id = %client_id, topic, "Client unsubscribed");
        self.send_to_client(client_id.as_str(), &Envelope::ack(ACK_UNSUBSCRIBED));
        Ok(Dispatch::Unsubscribed)
    }

    fn dispatch_to_handler(&self, client_id: &ClientId, envelope: &Envelope) -> Result<Dispatch> {
        let topic = envelope.topic.as_str();

        let handler = match self.lookup_handler(topic) {
            Some(handler) => handler,
            None => {
                tracing::warn!(topic, "No handler registered for topic, attempting to register handlers");
                self.run_registrar();

                match self.lookup_handler(topic) {
                    Some(handler) => handler,
                    None => {
                        tracing::error!(topic, "Still no handler registered after registration attempt");
                        return Err(HubError::NoHandler(topic.to_owned()));
                    }
                }
            }
        };

        tracing::debug!(client_id = %client_id, topic, kind = %envelope.kind, "Calling topic handler");
        handler(client_id.as_str(), &envelope.payload_json());
        Ok(Dispatch::Handled)
    }

    /// Register (or replace) the backend handler for a topic
    pub fn register_handler<F>(&self, topic: &str, handler: F) -> Result<()>
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        if !self.ensure_initialized("handler registration") {
            return Err(HubError::NotInitialized);
        }

        let callback: TopicHandler = Arc::new(handler);
        let shared = self.shared();
        let mut pools = shared.lock();

        if let Some(i) = pools.find_handler(topic) {
            pools.handlers[i].callback = Some(callback);
            tracing::debug!(topic, "Replaced WebSocket handler");
            return Ok(());
        }

        let Some(slot) = pools.find_free_handler_slot() else {
            tracing::error!(topic, "No free handler slots");
            return Err(HubError::HandlerCapacity);
        };

        pools.handlers[slot].occupy(topic, callback);
        tracing::info!(topic, "Registered WebSocket handler");
        Ok(())
    }

    /// Deliver a message to every client subscribed to `topic`
    ///
    /// Best effort, at most once. Returns the number of successful sends.
    pub fn broadcast(&self, topic: &str, message: &Envelope) -> usize {
        if !self.ensure_initialized("broadcast") {
            return 0;
        }

        let frame = message.encode_bytes();

        let targets: Vec<(ClientId, Arc<dyn Connection>)> = {
            let shared = self.shared();
            let mut pools = shared.lock();

            self.sweep_locked(&mut pools);

            let now = Instant::now();
            pools
                .clients
                .iter_mut()
                .filter(|c| c.active && c.is_subscribed(topic))
                .filter_map(|c| {
                    let conn = c.connection.clone()?;
                    c.touch(now);
                    Some((c.id.clone(), conn))
                })
                .collect()
        };

        let mut sent = 0;
        for (client_id, conn) in &targets {
            if conn.is_closing() {
                continue;
            }

            let result = conn.send(frame.clone(), FrameKind::Text);
            if delivered(&result) {
                sent += 1;
                tracing::trace!(client_id = %client_id, topic, "Broadcast message sent");
            } else {
                tracing::error!(client_id = %client_id, topic, result = ?result, "Failed to send broadcast message");
                self.mark_failed(client_id.as_str());
            }
        }

        self.counters.record_broadcast(sent);
        tracing::debug!(topic, recipients = targets.len(), delivered = sent, "Broadcast complete");

        sent
    }

    /// Send a message to one client
    ///
    /// Returns `false` if the client is unknown, has no live connection, or
    /// the send fails.
    pub fn send_to_client(&self, client_id: &str, message: &Envelope) -> bool {
        if !self.ensure_initialized("send to client") {
            return false;
        }

        let conn = {
            let shared = self.shared();
            let mut pools = shared.lock();

            let Some(i) = pools.find_client_by_id(client_id) else {
                tracing::error!(client_id, "Client not found");
                return false;
            };

            let slot = &mut pools.clients[i];
            let Some(conn) = slot.connection.clone() else {
                tracing::error!(client_id, "Client has no connection");
                return false;
            };

            slot.touch(Instant::now());
            conn
        };

        if conn.is_closing() {
            tracing::warn!(client_id, "Client connection is closing");
            return false;
        }

        tracing::debug!(client_id, kind = %message.kind, topic = %message.topic, "Sending message to client");

        let result = conn.send(message.encode_bytes(), FrameKind::Text);
        if delivered(&result) {
            true
        } else {
            tracing::error!(client_id, result = ?result, "Failed to send message to client");
            self.mark_failed(client_id);
            false
        }
    }

    /// Whether an active client is subscribed to `topic`
    pub fn is_subscribed(&self, client_id: &str, topic: &str) -> bool {
        if !self.ensure_initialized("subscription check") {
            return false;
        }

        let shared = self.shared();
        let pools = shared.lock();

        match pools.find_client_by_id(client_id) {
            Some(i) => pools.clients[i].is_subscribed(topic),
            None => {
                tracing::debug!(client_id, "Client not found");
                false
            }
        }
    }

    /// Ids of all active clients subscribed to `topic`
    pub fn list_subscribers(&self, topic: &str) -> Vec<ClientId> {
        if !self.ensure_initialized("subscriber listing") {
            return Vec::new();
        }

        let shared = self.shared();
        let mut pools = shared.lock();

        self.sweep_locked(&mut pools);

        pools
            .clients
            .iter()
            .filter(|c| c.active && c.is_subscribed(topic))
            .map(|c| c.id.clone())
            .collect()
    }

    /// Snapshot of pool occupancy and cumulative counters
    pub fn stats(&self) -> HubStats {
        let initialized = self.is_initialized();
        let shared = self.shared();
        let pools = shared.lock();

        HubStats {
            initialized,
            active_clients: pools.active_clients(),
            registered_handlers: pools.active_handlers(),
            subscriptions: pools.subscription_count(),
            broadcasts: self.counters.broadcasts(),
            deliveries: self.counters.deliveries(),
            send_failures: self.counters.send_failures(),
            swept_clients: self.counters.swept_clients(),
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
