use serde::{Deserialize, Serialize};

use crate::types::ChatRole;

/// The message fragment carried by one frame.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameMessage {
    /// Role of the speaker; always assistant in practice.
    #[serde(default)]
    pub role: ChatRole,

    /// Incremental content to append to the reply.
    #[serde(default)]
    pub content: String,
}

/// One decoded line of a streaming `/api/chat` response.
///
/// The server also sends timing and token counts; those fields are ignored.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamFrame {
    /// The message fragment.
    #[serde(default)]
    pub message: FrameMessage,

    /// True on the last frame of the reply.
    #[serde(default)]
    pub done: bool,

    /// Set when the server reports a failure after the headers were sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamFrame {
    /// A frame carrying `content` with the given completion flag.
    pub fn new(content: impl Into<String>, done: bool) -> Self {
        Self {
            message: FrameMessage {
                role: ChatRole::Assistant,
                content: content.into(),
            },
            done,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_server_frame() {
        let line = r#"{"model":"llama3.2","created_at":"2024-09-01T10:00:00Z","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let frame: StreamFrame = serde_json::from_str(line).unwrap();
        assert_eq!(frame, StreamFrame::new("Hel", false));
    }

    #[test]
    fn decode_final_frame_with_stats() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","eval_count":42}"#;
        let frame: StreamFrame = serde_json::from_str(line).unwrap();
        assert!(frame.done);
        assert!(frame.message.content.is_empty());
    }

    #[test]
    fn decode_final_frame_without_message() {
        let frame: StreamFrame = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(frame.done);
        assert_eq!(frame.message.role, ChatRole::Assistant);
    }

    #[test]
    fn decode_error_frame() {
        let frame: StreamFrame = serde_json::from_str(r#"{"error":"model runner crashed"}"#).unwrap();
        assert_eq!(frame.error.as_deref(), Some("model runner crashed"));
        assert!(!frame.done);
    }
}
