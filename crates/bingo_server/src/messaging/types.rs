//! Message type definitions for client-server communication.
//!
//! Every frame is a flat JSON object. Inbound frames name their operation in
//! an `op` field, which is stripped before the rest of the object reaches the
//! handler:
//!
//! ```json
//! { "op": "updateCardState", "col": 0, "row": 2, "isChecked": true }
//! ```
//!
//! Outbound frames carry the event name in an `event` field next to the
//! payload fields:
//!
//! ```json
//! { "event": "cardStateUpdate", "user": "alice", "bingoCard": [[...]] }
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

/// Literal keep-alive token; bypasses frame parsing entirely.
pub const KEEP_ALIVE: &str = "ping";

/// Reply to [`KEEP_ALIVE`].
pub const KEEP_ALIVE_ACK: &str = "pong";

/// Operation payload: the inbound object minus its operation field.
pub type Payload = Map<String, Value>;

const OPERATION_FIELD: &str = "op";
const OPERATION_FIELD_ALIAS: &str = "operation";
const EVENT_FIELD: &str = "event";

/// Reasons an inbound frame could not be turned into an operation call.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Frame has no operation")]
    MissingOperation,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub operation: String,
    pub payload: Payload,
}

impl InboundFrame {
    /// Parses a text frame, extracting and removing the operation field.
    ///
    /// An empty or non-string operation counts as missing.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let Value::Object(mut payload) = serde_json::from_str::<Value>(text)? else {
            return Err(FrameError::NotAnObject);
        };

        let operation = payload
            .remove(OPERATION_FIELD)
            .or_else(|| payload.remove(OPERATION_FIELD_ALIAS));

        match operation {
            Some(Value::String(operation)) if !operation.is_empty() => {
                Ok(Self { operation, payload })
            }
            _ => Err(FrameError::MissingOperation),
        }
    }
}

/// Serializes an outbound frame: `{ "event": <event>, ...payload }`.
///
/// Payloads that do not serialize to an object contribute no fields.
pub fn encode_frame<P: Serialize + ?Sized>(event: &str, payload: &P) -> Result<String, serde_json::Error> {
    let mut frame = Map::new();
    frame.insert(EVENT_FIELD.to_string(), Value::String(event.to_string()));
    if let Value::Object(fields) = serde_json::to_value(payload)? {
        frame.extend(fields);
    }
    serde_json::to_string(&Value::Object(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_strips_operation() {
        let frame = InboundFrame::parse(r#"{"op":"fakeAuth","name":"alice"}"#).unwrap();
        assert_eq!(frame.operation, "fakeAuth");
        assert_eq!(Value::Object(frame.payload), json!({ "name": "alice" }));
    }

    #[test]
    fn test_parse_accepts_operation_alias() {
        let frame = InboundFrame::parse(r#"{"operation":"getUsers"}"#).unwrap();
        assert_eq!(frame.operation, "getUsers");
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(matches!(InboundFrame::parse("{not json"), Err(FrameError::InvalidJson(_))));
        assert!(matches!(InboundFrame::parse("[1,2]"), Err(FrameError::NotAnObject)));
        assert!(matches!(InboundFrame::parse(r#"{"name":"x"}"#), Err(FrameError::MissingOperation)));
        assert!(matches!(InboundFrame::parse(r#"{"op":""}"#), Err(FrameError::MissingOperation)));
        assert!(matches!(InboundFrame::parse(r#"{"op":7}"#), Err(FrameError::MissingOperation)));
    }

    #[test]
    fn test_encode_frame_flattens_payload() {
        let text = encode_frame("loggedIn", &json!({ "user": "alice" })).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "event": "loggedIn", "user": "alice" }));
    }
}
