//! Layered settings loading for the voice gateway.
//!
//! Supports loading configuration from:
//! - `config/default.yaml` (optional)
//! - `config/{env}.yaml` (optional, selected by `VOICE_ENV`)
//! - environment variables prefixed `VOICE_`
//!
//! Precedence, highest to lowest: environment variables, environment-specific
//! file, default file, struct defaults.

pub mod settings;

pub use settings::{
    load_settings, CaptureConfig, ChunkModeDefault, MemoryConfig, RateLimitConfig, ServerConfig,
    Settings, UpstreamConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
