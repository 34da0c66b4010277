//! Player settings persisted between runs.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};

use crate::client::DEFAULT_HOST;
use crate::error::{Error, Result};

/// Which of the two configured models answers.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ModelTier {
    /// The fast model.
    #[default]
    Small,
    /// The slower, more capable model.
    Large,
}

impl ModelTier {
    /// Pick the model identifier for this tier.
    pub fn select<'a>(self, small: &'a str, large: &'a str) -> &'a str {
        match self {
            ModelTier::Small => small,
            ModelTier::Large => large,
        }
    }
}

impl std::str::FromStr for ModelTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(ModelTier::Small),
            "large" => Ok(ModelTier::Large),
            other => Err(Error::validation(
                format!("unknown model tier {other:?}; expected small or large"),
                Some("tier".to_string()),
            )),
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Small => write!(f, "small"),
            ModelTier::Large => write!(f, "large"),
        }
    }
}

/// The settings file.  Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    host: String,
    subject_index: usize,
    use_large_model: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            subject_index: 0,
            use_large_model: false,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or the defaults when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file; using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(Error::io("failed to open settings file", err)),
        };
        from_reader(BufReader::new(file)).map_err(|err| {
            Error::serialization("failed to parse settings file", Some(Box::new(err)))
        })
    }

    /// Write the settings to `path` as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create settings file", err))?;
        let mut writer = BufWriter::new(file);
        to_writer_pretty(&mut writer, self).map_err(|err| {
            Error::serialization("failed to serialize settings", Some(Box::new(err)))
        })?;
        writer
            .flush()
            .map_err(|err| Error::io("failed to write settings file", err))
    }

    /// Base URL of the model server.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Set the base URL of the model server.
    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    /// Which subject the player picked.
    pub fn subject_index(&self) -> usize {
        self.subject_index
    }

    /// Set which subject the player picked.
    pub fn set_subject_index(&mut self, index: usize) {
        self.subject_index = index;
    }

    /// True when the large model answers.
    pub fn use_large_model(&self) -> bool {
        self.use_large_model
    }

    /// Choose the large or small model.
    pub fn set_use_large_model(&mut self, large: bool) {
        self.use_large_model = large;
    }

    /// The selected model tier.
    pub fn tier(&self) -> ModelTier {
        if self.use_large_model {
            ModelTier::Large
        } else {
            ModelTier::Small
        }
    }

    /// Select a model tier.
    pub fn set_tier(&mut self, tier: ModelTier) {
        self.use_large_model = tier == ModelTier::Large;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.host(), DEFAULT_HOST);
        assert_eq!(settings.tier(), ModelTier::Small);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn save_reports_a_failed_write() {
        // Every write to /dev/full fails with ENOSPC once the buffer is flushed.
        let err = Settings::default().save("/dev/full").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("failed to write settings file"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.set_host("http://gpu-box:11434");
        settings.set_subject_index(2);
        settings.set_tier(ModelTier::Large);
        settings.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"host\": \"http://gpu-box:11434\""));

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert!(loaded.use_large_model());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"subject_index": 4}"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.subject_index(), 4);
        assert_eq!(settings.host(), DEFAULT_HOST);
        assert!(!settings.use_large_model());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn tiers() {
        assert_eq!(ModelTier::Large.select("llama3.2", "llama3.1:8b"), "llama3.1:8b");
        assert_eq!("Large".parse::<ModelTier>().unwrap(), ModelTier::Large);
        assert!("medium".parse::<ModelTier>().unwrap_err().is_validation());
        assert_eq!(ModelTier::Small.to_string(), "small");
    }
}
