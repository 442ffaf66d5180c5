//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{audio, endpoints, retrieval, tts};
use crate::ConfigError;
use policy_voice_core::{AsrEngine, TtsEngine};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Audio decode and input limits
    #[serde(default)]
    pub audio: AudioConfig,

    /// Transcription engines
    #[serde(default)]
    pub asr: AsrConfig,

    /// Catalog, index, and reranking
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Synthesis engines
    #[serde(default)]
    pub tts: TtsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whole-request deadline in milliseconds; 0 disables the deadline
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Audio decode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// ffmpeg binary used by the decode boundary
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
    /// Input duration ceiling in seconds
    #[serde(default = "default_max_audio_seconds")]
    pub max_audio_seconds: u64,
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

fn default_max_audio_seconds() -> u64 {
    audio::MAX_AUDIO_SECONDS
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg_bin(),
            max_audio_seconds: default_max_audio_seconds(),
        }
    }
}

/// Transcription engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    /// Engine used when the caller does not pick one
    #[serde(default)]
    pub default_engine: AsrEngine,
    /// Language passed to the engines when the caller does not override it
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Primary engine sidecar endpoint
    #[serde(default = "default_asr_primary_url")]
    pub primary_url: String,
    /// Fallback engine sidecar endpoint
    #[serde(default = "default_asr_fallback_url")]
    pub fallback_url: String,
    /// Sidecar request timeout in milliseconds
    #[serde(default = "default_engine_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_language() -> String {
    "ko".to_string()
}

fn default_asr_primary_url() -> String {
    endpoints::ASR_PRIMARY_DEFAULT.to_string()
}

fn default_asr_fallback_url() -> String {
    endpoints::ASR_FALLBACK_DEFAULT.to_string()
}

fn default_engine_timeout_ms() -> u64 {
    30_000
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            default_engine: AsrEngine::default(),
            default_language: default_language(),
            primary_url: default_asr_primary_url(),
            fallback_url: default_asr_fallback_url(),
            timeout_ms: default_engine_timeout_ms(),
        }
    }
}

/// Catalog and retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Path to the delimited catalog file
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    /// Qdrant endpoint
    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,
    /// Qdrant API key (optional)
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    /// Base collection name; dimension and catalog fingerprint are appended
    #[serde(default = "default_collection_base")]
    pub collection_base: String,
    /// Records embedded and upserted per batch during builds
    #[serde(default = "default_index_batch_size")]
    pub index_batch_size: usize,
    /// Results returned when the caller does not pick a k
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,
    /// Rerank bonus per query token matching the tag field
    #[serde(default = "default_tag_bonus")]
    pub tag_bonus: f32,
    /// Rerank bonus per query token matching the support field
    #[serde(default = "default_support_bonus")]
    pub support_bonus: f32,
    /// Embedding model file (used by the `onnx` feature)
    #[serde(default = "default_embed_model_path")]
    pub embed_model_path: String,
    /// Tokenizer file for the embedding model
    #[serde(default = "default_embed_tokenizer_path")]
    pub embed_tokenizer_path: String,
    /// Embedding output dimension
    #[serde(default = "default_embed_dim")]
    pub embed_dim: usize,
}

fn default_catalog_path() -> String {
    "data/catalog/services.csv".to_string()
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}

fn default_collection_base() -> String {
    retrieval::COLLECTION_BASE.to_string()
}

fn default_index_batch_size() -> usize {
    retrieval::INDEX_BATCH_SIZE
}

fn default_top_k() -> usize {
    retrieval::DEFAULT_TOP_K
}

fn default_tag_bonus() -> f32 {
    retrieval::TAG_BONUS
}

fn default_support_bonus() -> f32 {
    retrieval::SUPPORT_BONUS
}

fn default_embed_model_path() -> String {
    "models/embedding/model.onnx".to_string()
}

fn default_embed_tokenizer_path() -> String {
    "models/embedding/tokenizer.json".to_string()
}

fn default_embed_dim() -> usize {
    384
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_api_key: None,
            collection_base: default_collection_base(),
            index_batch_size: default_index_batch_size(),
            top_k_default: default_top_k(),
            tag_bonus: default_tag_bonus(),
            support_bonus: default_support_bonus(),
            embed_model_path: default_embed_model_path(),
            embed_tokenizer_path: default_embed_tokenizer_path(),
            embed_dim: default_embed_dim(),
        }
    }
}

/// Synthesis engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Engine used when the caller does not pick one
    #[serde(default)]
    pub default_engine: TtsEngine,
    /// Voice used when the caller does not pick one
    #[serde(default = "default_voice")]
    pub default_voice: String,
    /// Largest chunk sent to a backend in one synthesis call
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// Standard engine endpoint
    #[serde(default = "default_tts_standard_url")]
    pub standard_url: String,
    /// Neural engine endpoint
    #[serde(default = "default_tts_neural_url")]
    pub neural_url: String,
    /// Backend request timeout in milliseconds
    #[serde(default = "default_engine_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_voice() -> String {
    tts::DEFAULT_VOICE.to_string()
}

fn default_max_chunk_chars() -> usize {
    tts::MAX_CHUNK_CHARS
}

fn default_tts_standard_url() -> String {
    endpoints::TTS_STANDARD_DEFAULT.to_string()
}

fn default_tts_neural_url() -> String {
    endpoints::TTS_NEURAL_DEFAULT.to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            default_engine: TtsEngine::default(),
            default_voice: default_voice(),
            max_chunk_chars: default_max_chunk_chars(),
            standard_url: default_tts_standard_url(),
            neural_url: default_tts_neural_url(),
            timeout_ms: default_engine_timeout_ms(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    ///
    /// Called at startup; failures here must prevent the process from
    /// serving traffic rather than failing requests one at a time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !Path::new(&self.retrieval.catalog_path).exists() {
            return Err(ConfigError::FileNotFound(self.retrieval.catalog_path.clone()));
        }

        if self.audio.max_audio_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.max_audio_seconds".to_string(),
                message: "duration ceiling must be positive".to_string(),
            });
        }

        if self.retrieval.top_k_default == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.top_k_default".to_string(),
                message: "top_k must be at least 1".to_string(),
            });
        }

        if self.retrieval.index_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.index_batch_size".to_string(),
                message: "batch size must be at least 1".to_string(),
            });
        }

        if self.retrieval.tag_bonus < 0.0 || self.retrieval.support_bonus < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.tag_bonus".to_string(),
                message: "rerank bonuses must be non-negative".to_string(),
            });
        }

        if self.tts.max_chunk_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.max_chunk_chars".to_string(),
                message: "chunk limit must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from config files and environment variables
///
/// Priority: env vars > config/{env}.toml > config/default.toml > defaults.
/// Note: this does not run `validate()` so tools that only need partial
/// settings (e.g. an index rebuild against a custom path) can load them;
/// the server binary validates before serving.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("POLICY_VOICE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.audio.max_audio_seconds, 15);
        assert_eq!(settings.retrieval.top_k_default, 3);
        assert_eq!(settings.tts.max_chunk_chars, 4000);
    }

    #[test]
    fn test_validation_rejects_missing_catalog() {
        let mut settings = Settings::default();
        settings.retrieval.catalog_path = "/nonexistent/catalog.csv".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("services.csv");
        std::fs::write(&catalog, "service_name,tags,support,requirement,url\n").unwrap();

        let mut settings = Settings::default();
        settings.retrieval.catalog_path = catalog.to_string_lossy().into_owned();
        settings.audio.max_audio_seconds = 0;

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validation_accepts_defaults_with_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("services.csv");
        std::fs::write(&catalog, "service_name,tags,support,requirement,url\n").unwrap();

        let mut settings = Settings::default();
        settings.retrieval.catalog_path = catalog.to_string_lossy().into_owned();
        assert!(settings.validate().is_ok());
    }
}
