//! Interpreting the assistant's reply text.
//!
//! The model is asked for a [`StructuredReply`] but is not guaranteed to produce one, and while a
//! reply is streaming the text is an incomplete JSON document.  [`parse_structured`] handles the
//! finished reply; [`extract_display_text`] produces something readable at any point in between.

use serde_json::Value;

use crate::StructuredReply;
use crate::observability::STRUCTURED_PARSE_FAILURES;

const MESSAGE_KEY: &str = "\"message\"";

/// Parse a finished reply as a [`StructuredReply`].
///
/// Returns `None` when the text is not the expected shape.  That is not an error: the caller
/// shows the text as plain prose and the turn completes normally.
pub fn parse_structured(buffer: &str) -> Option<StructuredReply> {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<StructuredReply>(trimmed) {
        Ok(reply) => Some(reply),
        Err(err) => {
            STRUCTURED_PARSE_FAILURES.click();
            tracing::debug!(error = %err, "reply is not structured; showing it as plain text");
            None
        }
    }
}

/// Best-effort human-readable text for a possibly incomplete reply.
///
/// - A complete object is parsed and its `message` returned.
/// - Otherwise the `"message"` key is located and its string value decoded up to the next
///   unescaped quote, or up to the end of the buffer while it is still streaming.
/// - An object that has not reached its `message` yet shows nothing.
/// - Anything else is plain text and is returned verbatim.
pub fn extract_display_text(buffer: &str) -> String {
    let trimmed = buffer.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if let Some(message) = value.get("message").and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    if let Some(pos) = buffer.find(MESSAGE_KEY) {
        return message_value(&buffer[pos + MESSAGE_KEY.len()..]);
    }
    if trimmed.starts_with('{') {
        return String::new();
    }
    buffer.to_string()
}

/// Decode the string value following a `"message"` key.
fn message_value(after_key: &str) -> String {
    let rest = after_key.trim_start();
    let Some(rest) = rest.strip_prefix(':') else {
        return String::new();
    };
    let Some(rest) = rest.trim_start().strip_prefix('"') else {
        return String::new();
    };
    decode_partial_string(rest)
}

/// Decode JSON string escapes until the closing quote or the end of input.
///
/// An escape sequence cut off by the end of the buffer is dropped rather than shown half-done.
fn decode_partial_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('"') => out.push('"'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('/') => out.push('/'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    if hex.len() < 4 {
                        break;
                    }
                    if let Some(decoded) = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                    {
                        out.push(decoded);
                    }
                }
                Some(other) => out.push(other),
                None => break,
            },
            _ => out.push(c),
        }
    }
    out
}
