//! Error types for configuration operations.

use std::path::PathBuf;

use murmur_core::GraphError;
use thiserror::Error;

/// Errors that can occur while loading, saving, or building configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A setting is out of range
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting {
        /// Dotted name of the setting, e.g. `audio.block_size`.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Two units share a name
    #[error("duplicate unit name: {0}")]
    DuplicateUnit(String),

    /// A connection names a unit the patch does not declare
    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    /// No unit is registered under the label
    #[error("unknown label '{label}' for unit '{unit}'")]
    UnknownLabel {
        /// Name of the unit in the patch.
        unit: String,
        /// Label that failed to resolve.
        label: String,
    },

    /// The engine refused to place a unit inside its parent
    #[error("cannot place '{unit}' in '{parent}': {source}")]
    Placement {
        /// Name of the unit in the patch.
        unit: String,
        /// Name of the parent it was meant for.
        parent: String,
        /// Engine error.
        #[source]
        source: GraphError,
    },

    /// The engine rejected a connection
    #[error("cannot connect {from}:{outlet} -> {to}:{inlet}: {source}")]
    Connection {
        /// Source unit name.
        from: String,
        /// Source outlet.
        outlet: usize,
        /// Destination unit name.
        to: String,
        /// Destination inlet.
        inlet: usize,
        /// Engine error.
        #[source]
        source: GraphError,
    },

    /// An event targets a name no unit receives
    #[error("no receiver named '{0}'")]
    UnknownReceiver(String),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }
}
