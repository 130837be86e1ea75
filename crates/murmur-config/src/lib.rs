//! Configuration and patch files for the murmur dataflow engine.
//!
//! # Features
//!
//! - **Engine configuration**: sample rate, block size, channel counts, and
//!   the default log filter, from a TOML file
//! - **Patches**: named units, connections, and timed messages in TOML,
//!   built into a running [`murmur_core::Context`] through the unit registry
//!
//! # Example
//!
//! ```rust
//! use murmur_config::{ConnectionConfig, EngineConfig, PatchConfig, UnitConfig};
//!
//! let config = EngineConfig::from_toml("[audio]\nblock_size = 32\n").unwrap();
//!
//! let patch = PatchConfig::new()
//!     .with_unit(UnitConfig::new("tone", "osc~").with_args("440"))
//!     .with_unit(UnitConfig::new("out", "dac~"))
//!     .with_connection(ConnectionConfig::new("tone", 0, "out", 0));
//!
//! let built = patch.build_default(config.settings()).unwrap();
//! let mut output = vec![0.0; config.settings().output_len()];
//! built.context().process(&[], &mut output);
//! ```

mod engine;
mod error;
mod patch;

pub use engine::{AudioConfig, EngineConfig, LoggingConfig};
pub use error::ConfigError;
pub use patch::{ConnectionConfig, EventConfig, Patch, PatchConfig, UnitConfig};
