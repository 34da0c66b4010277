use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json_schema::JsonSchema;

/// A named event embedded in a structured reply.
///
/// Signals drive side effects outside the dialogue, such as progress tracking.  The payload is
/// opaque here; each handler interprets its own shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    /// Lower-case, underscore-separated signal name, e.g. `topic_completed`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Free-form explanation from the model.
    #[serde(default)]
    pub reason: String,

    /// Opaque payload passed through to the handler untouched.
    #[serde(default)]
    pub data: Value,
}

impl Signal {
    /// Create a new signal.
    pub fn new(kind: impl Into<String>, reason: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            reason: reason.into(),
            data,
        }
    }
}

impl JsonSchema for Signal {
    fn json_schema() -> Value {
        serde_json::json! {{
            "type": "object",
            "properties": {
                "type": <String as JsonSchema>::json_schema(),
                "reason": <String as JsonSchema>::json_schema(),
                "data": <Value as JsonSchema>::json_schema(),
            },
            "required": ["type", "reason", "data"]
        }}
    }
}

/// The schema-constrained reply the model is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredReply {
    /// Text to show the player.
    pub message: String,

    /// Optional out-of-band event.
    #[serde(default)]
    pub signal: Option<Signal>,
}

impl StructuredReply {
    /// Create a reply without a signal.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            signal: None,
        }
    }

    /// Attach a signal.
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }
}

impl JsonSchema for StructuredReply {
    fn json_schema() -> Value {
        serde_json::json! {{
            "type": "object",
            "properties": {
                "message": <String as JsonSchema>::json_schema(),
                "signal": <Option<Signal> as JsonSchema>::json_schema(),
            },
            "required": ["message", "signal"]
        }}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signal_uses_type_on_the_wire() {
        let signal = Signal::new("topic_completed", "explained gravity", json!({"topic": 3}));
        assert_eq!(
            serde_json::to_value(&signal).unwrap(),
            json!({"type": "topic_completed", "reason": "explained gravity", "data": {"topic": 3}})
        );
    }

    #[test]
    fn signal_defaults_reason_and_data() {
        let signal: Signal = serde_json::from_str(r#"{"type":"checkpoint_reached"}"#).unwrap();
        assert_eq!(signal.kind, "checkpoint_reached");
        assert!(signal.reason.is_empty());
        assert!(signal.data.is_null());
    }

    #[test]
    fn reply_with_null_signal() {
        let reply: StructuredReply =
            serde_json::from_str(r#"{"message":"Ahoy","signal":null}"#).unwrap();
        assert_eq!(reply, StructuredReply::new("Ahoy"));
    }

    #[test]
    fn reply_schema_requires_message() {
        let schema = StructuredReply::json_schema();
        assert_eq!(schema["required"], json!(["message", "signal"]));
        assert_eq!(schema["properties"]["message"], json!({"type": "string"}));
        assert_eq!(
            schema["properties"]["signal"]["anyOf"][1],
            json!({"type": "null"})
        );
    }
}
