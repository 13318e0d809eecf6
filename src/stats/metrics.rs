//! Statistics and metrics for the event hub

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the hub
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Whether the hub is running
    pub initialized: bool,
    /// Occupied client slots
    pub active_clients: usize,
    /// Occupied handler slots
    pub registered_handlers: usize,
    /// Topic subscriptions summed over all active clients
    pub subscriptions: usize,
    /// Broadcast calls that reached the fan-out stage
    pub broadcasts: u64,
    /// Frames successfully handed to a connection by broadcasts
    pub deliveries: u64,
    /// Sends (broadcast or direct) that failed
    pub send_failures: u64,
    /// Client slots reclaimed by the sweep
    pub swept_clients: u64,
}

impl HubStats {
    /// Average number of topics per active client
    pub fn subscriptions_per_client(&self) -> f64 {
        if self.active_clients > 0 {
            self.subscriptions as f64 / self.active_clients as f64
        } else {
            0.0
        }
    }

    /// Fraction of attempted sends that failed
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.deliveries + self.send_failures;
        if attempts > 0 {
            self.send_failures as f64 / attempts as f64
        } else {
            0.0
        }
    }
}

/// Cumulative counters, updated without taking the pool lock
#[derive(Debug, Default)]
pub(crate) struct HubCounters {
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    send_failures: AtomicU64,
    swept_clients: AtomicU64,
}

impl HubCounters {
    pub fn record_broadcast(&self, delivered: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, count: usize) {
        if count > 0 {
            self.swept_clients.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    pub fn swept_clients(&self) -> u64 {
        self.swept_clients.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_stats_default() {
        let stats = HubStats::default();
        assert!(!stats.initialized);
        assert_eq!(stats.active_clients, 0);
        assert_eq!(stats.registered_handlers, 0);
        assert_eq!(stats.subscriptions, 0);
        assert_eq!(stats.deliveries, 0);
    }

    #[test]
    fn test_subscriptions_per_client() {
        let stats = HubStats {
            active_clients: 4,
            subscriptions: 10,
            ..Default::default()
        };
        assert_eq!(stats.subscriptions_per_client(), 2.5);

        // No clients, no division by zero
        assert_eq!(HubStats::default().subscriptions_per_client(), 0.0);
    }

    #[test]
    fn test_failure_rate() {
        let stats = HubStats {
            deliveries: 3,
            send_failures: 1,
            ..Default::default()
        };
        assert_eq!(stats.failure_rate(), 0.25);
        assert_eq!(HubStats::default().failure_rate(), 0.0);
    }

    #[test]
    fn test_counters_accumulate() {
        let counters = HubCounters::default();

        counters.record_broadcast(3);
        counters.record_broadcast(0);
        counters.record_failure();
        counters.record_swept(0);
        counters.record_swept(2);

        assert_eq!(counters.broadcasts(), 2);
        assert_eq!(counters.deliveries(), 3);
        assert_eq!(counters.send_failures(), 1);
        assert_eq!(counters.swept_clients(), 2);
    }
}
