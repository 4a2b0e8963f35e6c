//! Study settings, loadable from TOML.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Consecutive wrong moves before the expected moves are shown.
    pub error_threshold: u32,
    /// Pause before the computer answers.
    pub reply_delay_ms: u64,
    /// Pause after a completed line before the board resets.
    pub next_line_delay_ms: u64,
}

impl Default for StudyConfig {
    fn default() -> Self {
        StudyConfig {
            error_threshold: 5,
            reply_delay_ms: 500,
            next_line_delay_ms: 2000,
        }
    }
}

impl StudyConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: StudyConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.error_threshold == 0 {
            return Err(ConfigError::Invalid("error_threshold must be at least 1".to_owned()));
        }
        Ok(())
    }

    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    pub fn next_line_delay(&self) -> Duration {
        Duration::from_millis(self.next_line_delay_ms)
    }
}
