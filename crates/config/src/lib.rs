//! Configuration management for the policy voice pipeline
//!
//! Supports loading configuration from:
//! - TOML files (`config/default.toml`, then `config/{env}.toml`)
//! - Environment variables (`POLICY_VOICE_` prefix, `__` separator)
//!
//! Settings are validated at load time; a missing catalog file or an
//! out-of-range tunable is a startup failure, never a per-request one.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AsrConfig, AudioConfig, RetrievalConfig, ServerConfig, Settings, TtsConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl From<ConfigError> for policy_voice_core::Error {
    fn from(err: ConfigError) -> Self {
        policy_voice_core::Error::Config(err.to_string())
    }
}
