use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ChatMessage;

/// How long the server keeps the model loaded after a request, unless overridden.
pub const DEFAULT_KEEP_ALIVE: &str = "60m";

/// Body of a `POST /api/chat` request.
///
/// Built fresh for every turn and never modified once sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// Model identifier, e.g. `llama3.2`.
    pub model: String,

    /// The prompt, oldest message first.
    pub messages: Vec<ChatMessage>,

    /// JSON schema constraining the reply.  Serialized as `null` when absent.
    #[serde(default)]
    pub format: Option<Value>,

    /// Always true; the crate only speaks the streaming protocol.
    pub stream: bool,

    /// Keep-alive hint for the server, e.g. `60m`.
    pub keep_alive: String,
}

impl ChatRequest {
    /// Create a streaming request for `model` over `messages`.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            format: None,
            stream: true,
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
        }
    }

    /// Set the response-format schema.
    pub fn with_format(mut self, format: Option<Value>) -> Self {
        self.format = format;
        self
    }

    /// Set the keep-alive duration.
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn request_wire_shape() {
        let request = ChatRequest::new("llama3.2", vec![ChatMessage::user("hi")]);
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "model": "llama3.2",
                "messages": [{"role": "user", "content": "hi"}],
                "format": null,
                "stream": true,
                "keep_alive": "60m"
            })
        );
    }

    #[test]
    fn request_round_trip_with_schema() {
        let schema = json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        });
        let history = vec![
            ChatMessage::system("You are the lighthouse keeper."),
            ChatMessage::user("What is refraction?"),
            ChatMessage::assistant("{\"message\":\"Light bends.\",\"signal\":null}"),
        ];
        let request = ChatRequest::new("llama3.2", history.clone())
            .with_format(Some(schema.clone()))
            .with_keep_alive("5m");

        let text = serde_json::to_string(&request).unwrap();
        let decoded: ChatRequest = serde_json::from_str(&text).unwrap();

        assert_eq!(decoded.messages, history);
        assert_eq!(decoded.format, Some(schema));
        assert_eq!(decoded.keep_alive, "5m");
        assert!(decoded.stream);
        assert_eq!(decoded, request);
    }
}
