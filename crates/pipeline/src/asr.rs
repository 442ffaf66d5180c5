//! Transcription engine clients
//!
//! Both ASR backends run as model sidecar services; this client posts raw
//! PCM and reads back a JSON transcript. The primary engine accepts a
//! per-call beam width; the fallback engine has no such tunable and the
//! override is ignored with a debug log rather than an error.

use async_trait::async_trait;
use serde::Deserialize;

use policy_voice_core::{AsrEngine, Error, Result, TranscribeOptions, Transcriber, Transcription};

/// Sidecar client configuration
#[derive(Debug, Clone)]
pub struct HttpAsrConfig {
    /// Base URL of the sidecar service
    pub url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpAsrConfig {
    fn default() -> Self {
        Self {
            url: policy_voice_config::constants::endpoints::ASR_PRIMARY_DEFAULT.to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Response from a transcription sidecar
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration_seconds: Option<f64>,
}

/// HTTP transcription client
pub struct HttpTranscriber {
    engine: AsrEngine,
    config: HttpAsrConfig,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(engine: AsrEngine, config: HttpAsrConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Transcription(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            engine = engine.as_str(),
            url = %config.url,
            "Configured transcription sidecar"
        );

        Ok(Self {
            engine,
            config,
            client,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, pcm: &[f32], options: &TranscribeOptions) -> Result<Transcription> {
        let body: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(language) = &options.language {
            query.push(("language", language.clone()));
        }
        match self.engine {
            AsrEngine::Primary => {
                if let Some(beam) = options.beam_size {
                    query.push(("beam_size", beam.to_string()));
                }
            }
            AsrEngine::Fallback => {
                if options.beam_size.is_some() {
                    tracing::debug!("fallback engine has no beam-width tunable; ignoring override");
                }
            }
        }

        let response = self
            .client
            .post(format!("{}/transcribe", self.config.url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .query(&query)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("{} sidecar: {e}", self.engine.as_str())))?;

        if !response.status().is_success() {
            return Err(Error::Transcription(format!(
                "{} sidecar returned status {}",
                self.engine.as_str(),
                response.status()
            )));
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("invalid sidecar response: {e}")))?;

        Ok(Transcription {
            text: parsed.text.trim().to_string(),
            language: parsed.language.or_else(|| options.language.clone()),
            audio_seconds: parsed.duration_seconds,
        })
    }

    fn engine_name(&self) -> &str {
        self.engine.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_name_follows_kind() {
        let primary =
            HttpTranscriber::new(AsrEngine::Primary, HttpAsrConfig::default()).unwrap();
        assert_eq!(primary.engine_name(), "primary");

        let fallback =
            HttpTranscriber::new(AsrEngine::Fallback, HttpAsrConfig::default()).unwrap();
        assert_eq!(fallback.engine_name(), "fallback");
    }

    #[test]
    fn test_response_parsing_defaults() {
        let parsed: TranscribeResponse =
            serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(parsed.text, "hello");
        assert!(parsed.language.is_none());
        assert!(parsed.duration_seconds.is_none());
    }
}
