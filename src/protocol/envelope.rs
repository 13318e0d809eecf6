//! Message envelope codec
//!
//! Every frame exchanged with a browser client is a JSON object of the form
//! `{"type": string, "topic": string, "payload": object}`. Decoding is strict
//! about `type` and `topic`, lenient about a missing `payload` (an empty
//! object is substituted), and rejects a payload that is not an object.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use super::constants::*;

/// Reserved protocol message types
///
/// Anything outside the reserved set is routed to a backend handler keyed
/// by the envelope topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType<'a> {
    Welcome,
    Subscribe,
    Unsubscribe,
    Ack,
    /// Application-defined type
    Application(&'a str),
}

impl<'a> MessageType<'a> {
    /// Classify a raw `type` string
    pub fn parse(kind: &'a str) -> Self {
        match kind {
            TYPE_WELCOME => MessageType::Welcome,
            TYPE_SUBSCRIBE => MessageType::Subscribe,
            TYPE_UNSUBSCRIBE => MessageType::Unsubscribe,
            TYPE_ACK => MessageType::Ack,
            other => MessageType::Application(other),
        }
    }

    pub fn as_str(&self) -> &'a str {
        match self {
            MessageType::Welcome => TYPE_WELCOME,
            MessageType::Subscribe => TYPE_SUBSCRIBE,
            MessageType::Unsubscribe => TYPE_UNSUBSCRIBE,
            MessageType::Ack => TYPE_ACK,
            MessageType::Application(kind) => kind,
        }
    }
}

/// Reasons an inbound frame is not a valid envelope
#[derive(Debug)]
pub enum EnvelopeError {
    /// Not JSON at all
    Json(serde_json::Error),
    /// Valid JSON, but not an object
    NotAnObject,
    /// `type` missing or not a string
    InvalidType,
    /// `topic` missing or not a string
    InvalidTopic,
    /// `payload` present but not an object
    PayloadNotObject,
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvelopeError::Json(e) => write!(f, "malformed JSON: {}", e),
            EnvelopeError::NotAnObject => write!(f, "message is not a JSON object"),
            EnvelopeError::InvalidType => write!(f, "missing or non-string type"),
            EnvelopeError::InvalidTopic => write!(f, "missing or non-string topic"),
            EnvelopeError::PayloadNotObject => write!(f, "payload is not an object"),
        }
    }
}

impl std::error::Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvelopeError::Json(e) => Some(e),
            _ => None,
        }
    }
}

/// A decoded or to-be-encoded message
///
/// Field order matches the wire format; `serde_json` preserves it on encode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: String,
    pub payload: Value,
}

impl Envelope {
    /// Create an envelope from already-structured parts
    pub fn new(kind: impl Into<String>, topic: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            topic: topic.into(),
            payload,
        }
    }

    /// Create an envelope from a pre-serialized payload string
    ///
    /// Valid JSON is embedded as-is. Otherwise `progress` and `result`
    /// messages carry the raw text as a JSON string, and every other type
    /// carries an error object holding the raw text.
    pub fn from_raw_payload(kind: &str, topic: &str, raw: &str) -> Self {
        let payload = match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(e) => {
                if kind == TYPE_PROGRESS || kind == TYPE_RESULT {
                    tracing::debug!(kind, topic, "Forwarding unparseable payload as string");
                    Value::String(raw.to_owned())
                } else {
                    tracing::error!(kind, topic, error = %e, "Failed to parse payload as JSON");
                    let mut obj = Map::new();
                    obj.insert("error".into(), Value::from(PAYLOAD_PARSE_ERROR));
                    obj.insert("raw_payload".into(), Value::from(raw));
                    Value::Object(obj)
                }
            }
        };

        Self::new(kind, topic, payload)
    }

    /// `welcome` envelope announcing the assigned client id
    pub fn welcome(client_id: &str) -> Self {
        let mut payload = Map::new();
        payload.insert(KEY_CLIENT_ID.into(), Value::from(client_id));
        Self::new(TYPE_WELCOME, TOPIC_SYSTEM, Value::Object(payload))
    }

    /// `ack` envelope on the system topic
    pub fn ack(message: &str) -> Self {
        let mut payload = Map::new();
        payload.insert(KEY_MESSAGE.into(), Value::from(message));
        Self::new(TYPE_ACK, TOPIC_SYSTEM, Value::Object(payload))
    }

    /// Classified message type
    pub fn message_type(&self) -> MessageType<'_> {
        MessageType::parse(&self.kind)
    }

    /// Optional `client_id` carried in the payload
    pub fn payload_client_id(&self) -> Option<&str> {
        self.payload.get(KEY_CLIENT_ID).and_then(Value::as_str)
    }

    /// Decode an inbound frame
    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(data).map_err(EnvelopeError::Json)?;

        let Value::Object(mut obj) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        let kind = match obj.remove("type") {
            Some(Value::String(s)) => s,
            _ => return Err(EnvelopeError::InvalidType),
        };
        let topic = match obj.remove("topic") {
            Some(Value::String(s)) => s,
            _ => return Err(EnvelopeError::InvalidTopic),
        };
        let payload = match obj.remove("payload") {
            None => {
                tracing::debug!(kind = %kind, topic = %topic, "Message has no payload, using empty object");
                Value::Object(Map::new())
            }
            Some(p @ Value::Object(_)) => p,
            Some(_) => return Err(EnvelopeError::PayloadNotObject),
        };

        Ok(Self {
            kind,
            topic,
            payload,
        })
    }

    /// Encode to the compact JSON wire form
    pub fn encode(&self) -> String {
        // A `Value` tree with string keys always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Encode into a shareable buffer for fan-out
    pub fn encode_bytes(&self) -> Bytes {
        Bytes::from(self.encode())
    }

    /// Compact JSON of the payload alone, as handed to backend handlers
    pub fn payload_json(&self) -> String {
        self.payload.to_string()
    }
}

/// Minimal hand-built welcome frame
///
/// Used as a fallback when a transport rejects the serializer's output for
/// the first frame of a connection.
pub fn fallback_welcome(client_id: &str) -> String {
    format!(
        "{{\"type\":\"{}\",\"topic\":\"{}\",\"payload\":{{\"{}\":\"{}\"}}}}",
        TYPE_WELCOME, TOPIC_SYSTEM, KEY_CLIENT_ID, client_id
    )
}
