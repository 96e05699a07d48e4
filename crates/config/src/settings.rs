//! The `Settings` struct and its loader.

use crate::ConfigError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_chunk_mode")]
    pub chunk_mode_default: ChunkModeDefault,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            memory: MemoryConfig::default(),
            capture: CaptureConfig::default(),
            rate_limit: RateLimitConfig::default(),
            chunk_mode_default: default_chunk_mode(),
            log_filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_ws_addr")]
    pub ws_addr: String,
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: default_ws_addr(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

fn default_ws_addr() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_outbound_queue_capacity() -> usize {
    64
}

/// Upstream adapter endpoints. These are plain URLs: the concrete HTTP
/// clients live in the `pipeline` and `llm` crates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_stt_endpoint")]
    pub stt_endpoint: String,
    #[serde(default = "default_tts_endpoint")]
    pub tts_endpoint: String,
    #[serde(default = "default_llm_main_endpoint")]
    pub llm_main_endpoint: String,
    #[serde(default = "default_llm_fast_endpoint")]
    pub llm_fast_endpoint: String,
    #[serde(default = "default_fast_layer_timeout_ms")]
    pub fast_layer_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            stt_endpoint: default_stt_endpoint(),
            tts_endpoint: default_tts_endpoint(),
            llm_main_endpoint: default_llm_main_endpoint(),
            llm_fast_endpoint: default_llm_fast_endpoint(),
            fast_layer_timeout_ms: default_fast_layer_timeout_ms(),
        }
    }
}

fn default_stt_endpoint() -> String {
    "http://127.0.0.1:9001".to_string()
}
fn default_tts_endpoint() -> String {
    "http://127.0.0.1:9002".to_string()
}
fn default_llm_main_endpoint() -> String {
    "http://127.0.0.1:9003".to_string()
}
fn default_llm_fast_endpoint() -> String {
    "http://127.0.0.1:9004".to_string()
}
fn default_fast_layer_timeout_ms() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_db_path")]
    pub db_path: String,
    #[serde(default = "default_conversation_ttl_hours")]
    pub conversation_ttl_hours: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_memory_db_path(),
            conversation_ttl_hours: default_conversation_ttl_hours(),
        }
    }
}

fn default_memory_db_path() -> String {
    "data/memory.sled".to_string()
}
fn default_conversation_ttl_hours() -> u64 {
    48 // §3, §6: CONVERSATION_TTL_HOURS default
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_max_seconds")]
    pub max_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_seconds: default_capture_max_seconds(),
        }
    }
}

fn default_capture_max_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_msgs_per_sec")]
    pub msgs_per_sec: u32,
    #[serde(default = "default_rate_limit_bytes_per_sec")]
    pub bytes_per_sec: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            msgs_per_sec: default_rate_limit_msgs_per_sec(),
            bytes_per_sec: default_rate_limit_bytes_per_sec(),
        }
    }
}

fn default_rate_limit_msgs_per_sec() -> u32 {
    50
}
fn default_rate_limit_bytes_per_sec() -> u32 {
    1_000_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkModeDefault {
    #[default]
    Sentence,
    Paragraph,
}

fn default_chunk_mode() -> ChunkModeDefault {
    ChunkModeDefault::Sentence
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.outbound_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.outbound_queue_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.capture.max_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.max_seconds".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.rate_limit.msgs_per_sec == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.msgs_per_sec".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads settings from `config/default.{yaml,toml}`, an optional
/// `config/{VOICE_ENV}.{yaml,toml}` overlay, then `VOICE_`-prefixed
/// environment variables, in increasing order of precedence.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Ok(env_name) = std::env::var("VOICE_ENV") {
        builder = builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE")
            .separator("__")
            .try_parsing(true),
    );

    let raw = builder.build()?;
    let settings: Settings = raw.try_deserialize()?;
    settings.validate()?;
    tracing::debug!(?settings, "settings loaded");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_outbound_queue_capacity_is_rejected() {
        let mut settings = Settings::default();
        settings.server.outbound_queue_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let mut settings = Settings::default();
        settings.rate_limit.msgs_per_sec = 0;
        assert!(settings.validate().is_err());
    }
}
