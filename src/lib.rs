// Public modules
pub mod client;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod fetch;
pub mod json_schema;
pub mod ndjson;
pub mod prompt;
pub mod render;
pub mod reply;
pub mod settings;
pub mod signal;
pub mod types;

mod observability;

// Re-exports
pub use client::{ChatClient, ClientOptions, Transport};
pub use conversation::{Conversation, TurnEvent, TurnOutcome, TurnState};
pub use error::{Error, Result};
pub use fetch::FetchStream;
pub use json_schema::JsonSchema;
pub use observability::register_biometrics;
pub use render::{ConversationView, PlainTextRenderer};
pub use signal::{Dispatch, ProgressTracker, SignalDispatcher, SignalKind};
pub use types::*;
