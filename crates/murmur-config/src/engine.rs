//! Engine configuration file format.

use std::path::Path;

use murmur_core::AudioSettings;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Engine settings read from TOML.
///
/// # TOML Format
///
/// ```toml
/// [audio]
/// sample_rate = 48000
/// block_size = 64
/// input_channels = 2
/// output_channels = 2
///
/// [logging]
/// filter = "info,murmur=debug"
/// ```
///
/// Every key is optional; missing keys take the defaults shown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Audio settings.
    pub audio: AudioConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// The `[audio]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per second.
    pub sample_rate: u32,
    /// Samples per block.
    pub block_size: usize,
    /// Host input channels.
    pub input_channels: usize,
    /// Host output channels.
    pub output_channels: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let settings = AudioSettings::default();
        Self {
            sample_rate: settings.sample_rate as u32,
            block_size: settings.block_size,
            input_channels: settings.input_channels,
            output_channels: settings.output_channels,
        }
    }
}

impl AudioConfig {
    /// Engine settings described by this table.
    pub fn settings(&self) -> AudioSettings {
        AudioSettings::new(
            self.sample_rate as f32,
            self.block_size,
            self.input_channels,
            self.output_channels,
        )
    }
}

/// The `[logging]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every setting can drive an engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "audio.sample_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.audio.block_size == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "audio.block_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Engine settings from the `[audio]` table.
    pub fn settings(&self) -> AudioSettings {
        self.audio.settings()
    }
}
