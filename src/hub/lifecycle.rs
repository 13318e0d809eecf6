//! Hub initialization and shutdown
//!
//! The hub moves `Uninitialized -> Running -> ShuttingDown -> Uninitialized`.
//! Every public entry point initializes on demand, so a hub that has been
//! shut down comes back up the next time a connection or backend touches it.
//!
//! Shutdown must terminate even when a thread is stuck holding the pool
//! lock. It waits a bounded time for the lock and otherwise abandons the
//! stuck cell for a fresh one; the holder drops the old cell when it
//! eventually returns. Connections are closed through the hub's connection
//! directory as well, so none are left open behind an abandoned cell.

use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, MutexGuard};

use super::pools::Pools;
use super::store::{EventHub, SharedPools};
use crate::error::{HubError, Result};
use crate::transport::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Uninitialized,
    Running,
    ShuttingDown,
}

impl EventHub {
    /// Allocate empty pools and mark the hub running
    ///
    /// Idempotent. Fails only while a shutdown is in progress.
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.lifecycle.lock();

        match *state {
            Lifecycle::Running => {
                tracing::debug!("Event hub already initialized");
                Ok(())
            }
            Lifecycle::ShuttingDown => {
                tracing::warn!("Cannot initialize event hub while shutting down");
                Err(HubError::NotInitialized)
            }
            Lifecycle::Uninitialized => {
                self.install_pools();
                *state = Lifecycle::Running;
                tracing::info!(
                    max_clients = self.config.max_clients,
                    max_handlers = self.config.max_handlers,
                    "Event hub initialized"
                );
                Ok(())
            }
        }
    }

    /// Whether the hub is running
    pub fn is_initialized(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }

    /// Initialize on demand; `false` means the operation must degrade
    pub(crate) fn ensure_initialized(&self, operation: &str) -> bool {
        let mut state = self.lifecycle.lock();

        match *state {
            Lifecycle::Running => true,
            Lifecycle::ShuttingDown => {
                tracing::debug!(operation, "Event hub shutting down, skipping operation");
                false
            }
            Lifecycle::Uninitialized => {
                tracing::warn!(operation, "Event hub not initialized, initializing now");
                self.install_pools();
                *state = Lifecycle::Running;
                true
            }
        }
    }

    /// Replace the pool cell with a fresh, empty one
    fn install_pools(&self) -> SharedPools {
        let fresh = Arc::new(Mutex::new(Pools::new(&self.config)));
        *self.pools.write() = Arc::clone(&fresh);
        fresh
    }

    /// Close every client connection and drop all handlers
    ///
    /// Blocks for up to `shutdown_lock_timeout` waiting on the pool lock and
    /// then for `close_grace_period` while close frames flush. Async callers
    /// should run it on a blocking thread. A second call while one is in
    /// progress returns immediately.
    pub fn shutdown(&self) {
        {
            let mut state = self.lifecycle.lock();
            match *state {
                Lifecycle::Running => *state = Lifecycle::ShuttingDown,
                Lifecycle::ShuttingDown => {
                    tracing::warn!("Event hub shutdown already in progress");
                    return;
                }
                Lifecycle::Uninitialized => {
                    tracing::debug!("Event hub not initialized, nothing to shut down");
                    return;
                }
            }
        }

        tracing::info!("Shutting down event hub");

        let timeout = self.config.shutdown_lock_timeout;
        let shared = self.shared();
        let mut closed = match shared.try_lock_for(timeout) {
            Some(pools) => self.close_all(pools),
            None => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Could not acquire event hub lock, continuing with degraded shutdown"
                );
                self.install_pools();
                tracing::info!("Replaced event hub lock");
                0
            }
        };

        // Anything the pool pass could not reach
        let live: Vec<Arc<dyn Connection>> = self.live.lock().values().cloned().collect();
        for conn in &live {
            if close_connection(conn.as_ref()) {
                tracing::debug!(connection_id = %conn.id(), "Closed connection outside the client pool");
                closed += 1;
            }
        }

        // Let close frames reach the wire before dropping connection references
        thread::sleep(self.config.close_grace_period);

        let shared = self.shared();
        match shared.try_lock_for(timeout) {
            Some(mut pools) => {
                for slot in pools.clients.iter_mut() {
                    slot.connection = None;
                }
            }
            None => {
                tracing::warn!("Could not acquire event hub lock to clear connection references");
            }
        }
        self.live.lock().clear();

        self.install_pools();
        *self.lifecycle.lock() = Lifecycle::Uninitialized;

        tracing::info!(closed_clients = closed, "Event hub shutdown complete");
    }

    /// Send close frames, close sockets and deactivate every slot
    fn close_all(&self, mut pools: MutexGuard<'_, Pools>) -> usize {
        let mut closed = 0;

        for slot in pools.clients.iter_mut().filter(|c| c.active) {
            if let Some(conn) = slot.connection.as_ref() {
                tracing::debug!(client_id = %slot.id, "Closing client connection");
                close_connection(conn.as_ref());
            }

            // Connection reference stays until the grace period has elapsed
            slot.active = false;
            slot.topics.clear();
            closed += 1;
        }

        for handler in pools.handlers.iter_mut().filter(|h| h.active) {
            handler.release();
        }

        tracing::info!(count = closed, "Sent close frames to clients");
        closed
    }
}

/// Send a close frame unless already closing, then release the socket
///
/// Returns `false` if the connection was already fully closed.
fn close_connection(conn: &dyn Connection) -> bool {
    let mut acted = false;

    if !conn.is_closing() {
        if let Err(e) = conn.send_close() {
            tracing::debug!(connection_id = %conn.id(), error = %e, "Close frame not sent");
        }
        conn.mark_closing();
        acted = true;
    }

    if conn.is_open() {
        conn.close_socket();
        acted = true;
    }

    acted
}
