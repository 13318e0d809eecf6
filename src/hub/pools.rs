//! Fixed-capacity client and handler pools
//!
//! Both pools are plain vectors of slots scanned linearly; the first free
//! slot wins. Everything here assumes the caller holds the hub's shared
//! lock.

use std::time::{Duration, Instant};

use super::client::ClientSlot;
use super::config::HubConfig;
use super::handler::{HandlerSlot, TopicHandler};
use crate::transport::ConnectionId;

/// Slots released by one sweep
#[derive(Debug, Default)]
pub(crate) struct Swept {
    pub count: usize,
    /// Connections whose slot was released
    pub connections: Vec<ConnectionId>,
}

pub(crate) struct Pools {
    pub clients: Vec<ClientSlot>,
    pub handlers: Vec<HandlerSlot>,
}

impl Pools {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            clients: (0..config.max_clients).map(|_| ClientSlot::vacant()).collect(),
            handlers: (0..config.max_handlers).map(|_| HandlerSlot::vacant()).collect(),
        }
    }

    pub fn find_client_by_id(&self, id: &str) -> Option<usize> {
        self.clients.iter().position(|c| c.active && c.id == id)
    }

    pub fn find_client_by_connection(&self, conn: ConnectionId) -> Option<usize> {
        self.clients
            .iter()
            .position(|c| c.active && c.connection_id() == Some(conn))
    }

    pub fn find_free_client_slot(&self) -> Option<usize> {
        self.clients.iter().position(|c| !c.active)
    }

    pub fn find_handler(&self, topic: &str) -> Option<usize> {
        self.handlers
            .iter()
            .position(|h| h.active && h.topic == topic)
    }

    pub fn find_free_handler_slot(&self) -> Option<usize> {
        self.handlers.iter().position(|h| !h.active)
    }

    /// Callback registered for a topic, if any
    pub fn handler_for(&self, topic: &str) -> Option<TopicHandler> {
        self.find_handler(topic)
            .and_then(|i| self.handlers[i].callback.clone())
    }

    pub fn active_clients(&self) -> usize {
        self.clients.iter().filter(|c| c.active).count()
    }

    pub fn active_handlers(&self) -> usize {
        self.handlers.iter().filter(|h| h.active).count()
    }

    pub fn subscription_count(&self) -> usize {
        self.clients
            .iter()
            .filter(|c| c.active)
            .map(|c| c.topics.len())
            .sum()
    }

    /// Reclaim slots whose connection is gone or closing, or that have been
    /// idle longer than `timeout`
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Swept {
        let mut swept = Swept::default();

        for slot in self.clients.iter_mut().filter(|c| c.active) {
            let conn = match slot.connection.clone() {
                Some(conn) if !conn.is_closing() => conn,
                stale => {
                    tracing::info!(client_id = %slot.id, "Cleaning up client with invalid connection");
                    if let Some(conn) = stale {
                        swept.connections.push(conn.id());
                    }
                    slot.release();
                    swept.count += 1;
                    continue;
                }
            };

            let idle = now.saturating_duration_since(slot.last_activity);
            if idle > timeout {
                tracing::info!(
                    client_id = %slot.id,
                    idle_secs = idle.as_secs(),
                    "Cleaning up inactive client"
                );

                if conn.is_open() {
                    if let Err(e) = conn.send_close() {
                        tracing::debug!(client_id = %slot.id, error = %e, "Close frame not sent");
                    }
                    conn.mark_closing();
                }

                swept.connections.push(conn.id());
                slot.release();
                swept.count += 1;
            }
        }

        if swept.count > 0 {
            tracing::info!(count = swept.count, "Cleaned up inactive clients");
        }

        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::MockConnection;
    use crate::transport::Connection;

    fn small_config() -> HubConfig {
        HubConfig::default().max_clients(3).max_handlers(2)
    }

    #[test]
    fn test_lowest_free_slot_wins() {
        let mut pools = Pools::new(&small_config());
        let now = Instant::now();

        pools.clients[0].occupy(MockConnection::new(1), now);
        pools.clients[1].occupy(MockConnection::new(2), now);
        assert_eq!(pools.find_free_client_slot(), Some(2));

        pools.clients[0].release();
        assert_eq!(pools.find_free_client_slot(), Some(0));
    }

    #[test]
    fn test_lookups_ignore_inactive_slots() {
        let mut pools = Pools::new(&small_config());
        let id = pools.clients[0].occupy(MockConnection::new(5), Instant::now());

        assert_eq!(pools.find_client_by_id(id.as_str()), Some(0));
        assert_eq!(pools.find_client_by_connection(ConnectionId(5)), Some(0));

        pools.clients[0].release();
        assert_eq!(pools.find_client_by_id(id.as_str()), None);
        assert_eq!(pools.find_client_by_connection(ConnectionId(5)), None);
    }

    #[test]
    fn test_sweep_reclaims_closing_connections() {
        let mut pools = Pools::new(&small_config());
        let now = Instant::now();
        let closing = MockConnection::new(1);
        let healthy = MockConnection::new(2);

        pools.clients[0].occupy(closing.clone(), now);
        pools.clients[1].occupy(healthy.clone(), now);
        closing.mark_closing();

        let swept = pools.sweep(now, Duration::from_secs(3600));
        assert_eq!(swept.count, 1);
        assert_eq!(swept.connections, vec![ConnectionId(1)]);
        assert!(!pools.clients[0].active);
        assert!(pools.clients[1].active);
        assert_eq!(closing.close_frames(), 0);
    }

    #[test]
    fn test_sweep_closes_idle_clients() {
        let mut pools = Pools::new(&small_config());
        let start = Instant::now();
        let idle = MockConnection::new(1);

        pools.clients[0].occupy(idle.clone(), start);

        // Not yet past the timeout
        let early = pools.sweep(start + Duration::from_secs(10), Duration::from_secs(60));
        assert_eq!(early.count, 0);

        let swept = pools.sweep(start + Duration::from_secs(61), Duration::from_secs(60));
        assert_eq!(swept.count, 1);
        assert_eq!(swept.connections, vec![ConnectionId(1)]);
        assert!(!pools.clients[0].active);
        assert_eq!(idle.close_frames(), 1);
        assert!(idle.is_closing());
    }

    #[test]
    fn test_subscription_count() {
        let mut pools = Pools::new(&small_config());
        let now = Instant::now();
        pools.clients[0].occupy(MockConnection::new(1), now);
        pools.clients[1].occupy(MockConnection::new(2), now);
        pools.clients[0].subscribe("a", 20);
        pools.clients[0].subscribe("b", 20);
        pools.clients[1].subscribe("a", 20);

        assert_eq!(pools.active_clients(), 2);
        assert_eq!(pools.subscription_count(), 3);
    }
}
