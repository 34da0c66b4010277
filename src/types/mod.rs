// Public modules
pub mod chat_message;
pub mod chat_request;
pub mod fetch_result;
pub mod stream_frame;
pub mod structured_reply;

// Re-exports
pub use chat_message::{ChatMessage, ChatRole};
pub use chat_request::{ChatRequest, DEFAULT_KEEP_ALIVE};
pub use fetch_result::FetchResult;
pub use stream_frame::{FrameMessage, StreamFrame};
pub use structured_reply::{Signal, StructuredReply};
