//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde_json::Value;

use crate::client::{ClientOptions, DEFAULT_TIMEOUT};
use crate::json_schema::JsonSchema;
use crate::types::{DEFAULT_KEEP_ALIVE, StructuredReply};

/// Default fast model.
pub const DEFAULT_SMALL_MODEL: &str = "llama3.2";

/// Default capable model.
pub const DEFAULT_LARGE_MODEL: &str = "llama3.1:8b";

/// Default location of the settings file.
pub const DEFAULT_SETTINGS_PATH: &str = "settings.json";

/// Command-line arguments for the npc-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model server to talk to, overriding the settings file.
    #[arrrg(optional, "Model server URL (default: from settings)", "URL")]
    pub host: Option<String>,

    /// Fast model.
    #[arrrg(optional, "Small model (default: llama3.2)", "MODEL")]
    pub model: Option<String>,

    /// Capable model.
    #[arrrg(optional, "Large model (default: llama3.1:8b)", "MODEL")]
    pub large_model: Option<String>,

    /// Settings file.
    #[arrrg(optional, "Settings file (default: settings.json)", "PATH")]
    pub settings: Option<String>,

    /// File holding the NPC's backstory.
    #[arrrg(optional, "Backstory file used as the system message", "PATH")]
    pub backstory: Option<String>,

    /// File holding the reply schema.
    #[arrrg(optional, "JSON schema file for replies (default: built in)", "PATH")]
    pub schema: Option<String>,

    /// Do not constrain replies with a schema.
    #[arrrg(flag, "Send no reply schema")]
    pub no_schema: bool,

    /// Request timeout.
    #[arrrg(optional, "Request timeout in seconds (default: 600)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Model server URL; `None` defers to the settings file.
    pub host: Option<String>,

    /// Model used on the small tier.
    pub small_model: String,

    /// Model used on the large tier.
    pub large_model: String,

    /// Where settings are persisted.
    pub settings_path: PathBuf,

    /// Backstory file, if any.
    pub backstory_path: Option<PathBuf>,

    /// Schema file overriding the built-in reply schema.
    pub schema_path: Option<PathBuf>,

    /// Whether replies are constrained by a schema at all.
    pub use_schema: bool,

    /// Upper bound on a whole request.
    pub timeout: Duration,

    /// Keep-alive hint sent with every request.
    pub keep_alive: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Models: llama3.2 (small), llama3.1:8b (large)
    /// - Settings: settings.json
    /// - Schema: built in
    /// - Timeout: 600 seconds
    /// - Keep-alive: 60m
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            host: None,
            small_model: DEFAULT_SMALL_MODEL.to_string(),
            large_model: DEFAULT_LARGE_MODEL.to_string(),
            settings_path: PathBuf::from(DEFAULT_SETTINGS_PATH),
            backstory_path: None,
            schema_path: None,
            use_schema: true,
            timeout: DEFAULT_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
            use_color: true,
        }
    }

    /// Sets the model server URL.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the small and large models.
    pub fn with_models(mut self, small: impl Into<String>, large: impl Into<String>) -> Self {
        self.small_model = small.into();
        self.large_model = large.into();
        self
    }

    /// Sets the settings path.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = path.into();
        self
    }

    /// Sets the backstory path.
    pub fn with_backstory_path(mut self, path: Option<PathBuf>) -> Self {
        self.backstory_path = path;
        self
    }

    /// Sets the schema path.
    pub fn with_schema_path(mut self, path: Option<PathBuf>) -> Self {
        self.schema_path = path;
        self
    }

    /// Sends no schema.
    pub fn without_schema(mut self) -> Self {
        self.use_schema = false;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Options for a client talking to `host`.
    pub fn client_options(&self, host: impl Into<String>) -> ClientOptions {
        ClientOptions {
            host: host.into(),
            timeout: self.timeout,
            keep_alive: self.keep_alive.clone(),
        }
    }

    /// The reply schema to send, if any.
    ///
    /// A schema file that cannot be used is reported and replies go unconstrained.
    pub fn format(&self) -> Option<Value> {
        if !self.use_schema {
            return None;
        }
        match &self.schema_path {
            Some(path) => load_schema(path),
            None => Some(StructuredReply::json_schema()),
        }
    }

    /// The backstory, if one is configured and readable.
    pub fn backstory(&self) -> Option<String> {
        self.backstory_path.as_deref().and_then(load_backstory)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            host: args.host,
            small_model: args.model.unwrap_or(defaults.small_model),
            large_model: args.large_model.unwrap_or(defaults.large_model),
            settings_path: args
                .settings
                .map(PathBuf::from)
                .unwrap_or(defaults.settings_path),
            backstory_path: args.backstory.map(PathBuf::from),
            schema_path: args.schema.map(PathBuf::from),
            use_schema: !args.no_schema,
            timeout: args
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            use_color: !args.no_color,
            ..defaults
        }
    }
}

/// Read the NPC's backstory.  Missing or empty files are reported and yield `None`.
pub fn load_backstory(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => {
            tracing::warn!(
                path = %path.display(),
                "backstory file is empty; continuing without one"
            );
            None
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "cannot read backstory; continuing without one"
            );
            None
        }
    }
}

/// Read a reply schema.  Unreadable or malformed files are reported and yield `None`.
pub fn load_schema(path: &Path) -> Option<Value> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "cannot read schema; replies are unconstrained"
            );
            return None;
        }
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(schema @ Value::Object(_)) => Some(schema),
        Ok(_) => {
            tracing::warn!(
                path = %path.display(),
                "schema is not a JSON object; replies are unconstrained"
            );
            None
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "malformed schema; replies are unconstrained"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert!(config.host.is_none());
        assert_eq!(config.small_model, "llama3.2");
        assert_eq!(config.large_model, "llama3.1:8b");
        assert_eq!(config.settings_path, PathBuf::from("settings.json"));
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.keep_alive, "60m");
        assert!(config.use_schema);
        assert!(config.use_color);
        assert_eq!(config.format(), Some(StructuredReply::json_schema()));
        assert!(config.backstory().is_none());
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::from(ChatArgs::default());
        assert_eq!(config, ChatConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            host: Some("http://gpu-box:11434".to_string()),
            model: Some("phi3".to_string()),
            large_model: Some("mixtral".to_string()),
            settings: Some("/tmp/npc.json".to_string()),
            backstory: Some("mira.txt".to_string()),
            schema: None,
            no_schema: true,
            timeout_secs: Some(30),
            no_color: true,
        };
        let config = ChatConfig::from(args);
        assert_eq!(config.host.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(config.small_model, "phi3");
        assert_eq!(config.large_model, "mixtral");
        assert_eq!(config.settings_path, PathBuf::from("/tmp/npc.json"));
        assert_eq!(config.backstory_path, Some(PathBuf::from("mira.txt")));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.format().is_none());
        assert!(!config.use_color);
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_host("http://localhost:8080")
            .with_models("a", "b")
            .with_settings_path("s.json")
            .with_timeout(Duration::from_secs(5))
            .without_schema()
            .without_color();
        assert_eq!(config.host.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.small_model, "a");
        assert_eq!(config.large_model, "b");
        assert_eq!(config.settings_path, PathBuf::from("s.json"));
        assert!(!config.use_schema);
        assert!(!config.use_color);

        let options = config.client_options("http://localhost:8080");
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.keep_alive, "60m");
    }

    #[test]
    fn resources_degrade_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_backstory(&dir.path().join("absent.txt")).is_none());
        assert!(load_schema(&dir.path().join("absent.json")).is_none());

        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "  \n").unwrap();
        assert!(load_backstory(&empty).is_none());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ nope").unwrap();
        assert!(load_schema(&bad).is_none());
    }

    #[test]
    fn resources_load_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let backstory = dir.path().join("mira.txt");
        std::fs::write(&backstory, "You are Mira, keeper of the lighthouse.\n").unwrap();
        assert_eq!(
            load_backstory(&backstory).as_deref(),
            Some("You are Mira, keeper of the lighthouse.")
        );

        let schema = dir.path().join("schema.json");
        std::fs::write(&schema, r#"{"type":"object"}"#).unwrap();
        let config = ChatConfig::new().with_schema_path(Some(schema));
        assert_eq!(config.format(), Some(serde_json::json!({"type": "object"})));
    }
}
