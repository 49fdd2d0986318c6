//! Configuration Module
//!
//! Connection settings come from the environment; per-instance settings come
//! from the YAML instance file.

mod instances;
mod settings;

use thiserror::Error;

pub use instances::{
    DEFAULT_FEED_URL, DataloaderConfig, InstanceFile, ProducerConfig, SUPPORTED_DEPTHS,
    load_instances, load_instances_from_string,
};
pub use settings::{DEFAULT_CONFIG_PATH, PostgresSettings, RedisSettings, RuntimeSettings};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the instance file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// A value is out of range or malformed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// No instance with the requested name.
    #[error("No {kind} instance named '{name}'")]
    UnknownInstance {
        /// `producer` or `dataloader`.
        kind: &'static str,
        /// Requested instance name.
        name: String,
    },
}
