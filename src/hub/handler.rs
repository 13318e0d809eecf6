//! Backend topic handlers
//!
//! A handler consumes application messages (anything that is not a
//! protocol message) sent by browsers on one topic. At most one handler is
//! active per topic; registering again replaces the callback in place.

use std::sync::Arc;

use super::store::EventHub;

/// Callback invoked with `(client_id, payload_json)`
pub type TopicHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Hook that (re-)registers backend handlers on demand
///
/// Components that start after the hub install their handlers lazily: the
/// hub runs this hook whenever a client subscribes and once more before
/// giving up on a message whose topic has no handler. Implementations must
/// tolerate being called repeatedly.
pub trait HandlerRegistrar: Send + Sync {
    fn register_handlers(&self, hub: &EventHub);
}

impl<F> HandlerRegistrar for F
where
    F: Fn(&EventHub) + Send + Sync,
{
    fn register_handlers(&self, hub: &EventHub) {
        self(hub)
    }
}

/// One entry of the handler pool
pub(crate) struct HandlerSlot {
    pub topic: String,
    pub callback: Option<TopicHandler>,
    pub active: bool,
}

impl HandlerSlot {
    pub fn vacant() -> Self {
        Self {
            topic: String::new(),
            callback: None,
            active: false,
        }
    }

    pub fn occupy(&mut self, topic: &str, callback: TopicHandler) {
        self.topic = topic.to_owned();
        self.callback = Some(callback);
        self.active = true;
    }

    pub fn release(&mut self) {
        self.topic.clear();
        self.callback = None;
        self.active = false;
    }
}
