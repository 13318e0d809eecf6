//! Hub configuration

use std::time::Duration;

/// Default number of client slots
pub const DEFAULT_MAX_CLIENTS: usize = 100;
/// Default number of handler slots
pub const DEFAULT_MAX_HANDLERS: usize = 20;
/// Default subscriptions per client
pub const DEFAULT_MAX_TOPICS: usize = 20;

/// Event hub configuration options
///
/// The capacities are policy limits, not structural ones.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum concurrently registered clients
    pub max_clients: usize,

    /// Maximum registered topic handlers
    pub max_handlers: usize,

    /// Maximum subscriptions held by one client
    pub max_topics_per_client: usize,

    /// Clients idle longer than this are reclaimed by the sweep
    pub inactivity_timeout: Duration,

    /// How long shutdown waits for the shared lock before rebuilding it
    pub shutdown_lock_timeout: Duration,

    /// Pause between sending close frames and dropping connection handles
    pub close_grace_period: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            max_handlers: DEFAULT_MAX_HANDLERS,
            max_topics_per_client: DEFAULT_MAX_TOPICS,
            inactivity_timeout: Duration::from_secs(3600),
            shutdown_lock_timeout: Duration::from_secs(5),
            close_grace_period: Duration::from_millis(500),
        }
    }
}

impl HubConfig {
    /// Set the client capacity
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Set the handler capacity
    pub fn max_handlers(mut self, max: usize) -> Self {
        self.max_handlers = max;
        self
    }

    /// Set the per-client subscription limit
    pub fn max_topics_per_client(mut self, max: usize) -> Self {
        self.max_topics_per_client = max;
        self
    }

    /// Set the inactivity timeout
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Set the shutdown lock acquisition timeout
    pub fn shutdown_lock_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_lock_timeout = timeout;
        self
    }

    /// Set the close-frame grace period
    pub fn close_grace_period(mut self, period: Duration) -> Self {
        self.close_grace_period = period;
        self
    }
}
