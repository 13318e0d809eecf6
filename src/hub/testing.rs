//! Recording connection used by the hub's unit tests

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::transport::{Connection, ConnectionId, FrameKind};

/// How the mock answers `send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehavior {
    Accept,
    /// Report zero bytes written
    Zero,
    /// Fail every send after the first `n` succeed
    FailAfter(usize),
}

/// Callback run at the start of every `send`
pub type SendHook = Arc<dyn Fn() + Send + Sync>;

pub struct MockConnection {
    id: ConnectionId,
    behavior: SendBehavior,
    on_send: Mutex<Option<SendHook>>,
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    close_frames: AtomicUsize,
    closing: AtomicBool,
    socket_closed: AtomicBool,
}

impl MockConnection {
    pub fn new(id: u64) -> Arc<Self> {
        Self::with_behavior(id, SendBehavior::Accept)
    }

    pub fn with_behavior(id: u64, behavior: SendBehavior) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId(id),
            behavior,
            on_send: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            close_frames: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
            socket_closed: AtomicBool::new(false),
        })
    }

    /// Run `hook` inside every subsequent `send`
    pub fn set_on_send<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_send.lock() = Some(Arc::new(hook));
    }

    /// Frames accepted so far, as text
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Accepted frames decoded as JSON
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn close_frames(&self) -> usize {
        self.close_frames.load(Ordering::SeqCst)
    }

    pub fn socket_closed(&self) -> bool {
        self.socket_closed.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, data: Bytes, _kind: FrameKind) -> io::Result<usize> {
        let hook = self.on_send.lock().clone();
        if let Some(hook) = hook {
            hook();
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            SendBehavior::Zero => return Ok(0),
            SendBehavior::FailAfter(n) if attempt >= n => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock failure"))
            }
            _ => {}
        }
        self.sent
            .lock()
            .push(String::from_utf8_lossy(&data).into_owned());
        Ok(data.len())
    }

    fn send_close(&self) -> io::Result<()> {
        self.close_frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn mark_closing(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        !self.socket_closed.load(Ordering::SeqCst)
    }

    fn close_socket(&self) {
        self.socket_closed.store(true, Ordering::SeqCst);
    }
}
