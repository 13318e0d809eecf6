//! Wire-level constants for the event envelope

/// Server to client, carries the assigned client id
pub const TYPE_WELCOME: &str = "welcome";
/// Client to server, adds the envelope topic to the client's subscriptions
pub const TYPE_SUBSCRIBE: &str = "subscribe";
/// Client to server, removes the envelope topic from the client's subscriptions
pub const TYPE_UNSUBSCRIBE: &str = "unsubscribe";
/// Server to client, confirms a subscription change
pub const TYPE_ACK: &str = "ack";

/// Application types whose unparseable payloads are forwarded as plain strings
pub const TYPE_PROGRESS: &str = "progress";
pub const TYPE_RESULT: &str = "result";

/// Topic used for protocol traffic (welcome, acks)
pub const TOPIC_SYSTEM: &str = "system";

/// Payload key carrying a client id
pub const KEY_CLIENT_ID: &str = "client_id";
/// Payload key carrying a human-readable ack text
pub const KEY_MESSAGE: &str = "message";

pub const ACK_SUBSCRIBED: &str = "Subscribed";
pub const ACK_UNSUBSCRIBED: &str = "Unsubscribed";

/// Error text used when a raw payload is not valid JSON
pub const PAYLOAD_PARSE_ERROR: &str = "Failed to parse payload";
