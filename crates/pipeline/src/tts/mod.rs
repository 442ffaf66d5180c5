//! Synthesis engine clients and chunked synthesis

pub mod segment;
pub mod synthesizer;

pub use segment::{normalize_whitespace, PunctuationSegmenter, SentenceSegmenter};
pub use synthesizer::{SpeechSynthesizer, SynthesizerConfig};

use async_trait::async_trait;
use serde::Serialize;

use policy_voice_core::{AudioFormat, Error, Result, SpeechBackend, TtsEngine};

/// Synthesis service client configuration
#[derive(Debug, Clone)]
pub struct HttpTtsConfig {
    /// Base URL of the synthesis service
    pub url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpTtsConfig {
    fn default() -> Self {
        Self {
            url: policy_voice_config::constants::endpoints::TTS_STANDARD_DEFAULT.to_string(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

/// HTTP synthesis client
///
/// The standard engine is a streaming cloud voice gateway that returns
/// MP3; the neural engine is a local vocoder sidecar that returns WAV.
/// Same wire shape either way: JSON in, audio bytes out.
pub struct HttpSpeechClient {
    engine: TtsEngine,
    config: HttpTtsConfig,
    client: reqwest::Client,
}

impl HttpSpeechClient {
    pub fn new(engine: TtsEngine, config: HttpTtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Synthesis(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            engine = engine.as_str(),
            url = %config.url,
            "Configured synthesis backend"
        );

        Ok(Self {
            engine,
            config,
            client,
        })
    }
}

#[async_trait]
impl SpeechBackend for HttpSpeechClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(format!("{}/synthesize", self.config.url))
            .json(&SynthesizeRequest { text, voice })
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("{} backend: {e}", self.engine.as_str())))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "{} backend returned status {}",
                self.engine.as_str(),
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("failed to read audio body: {e}")))?;

        Ok(bytes.to_vec())
    }

    fn engine_name(&self) -> &str {
        self.engine.as_str()
    }

    fn audio_format(&self) -> AudioFormat {
        match self.engine {
            TtsEngine::Standard => AudioFormat::Mp3,
            TtsEngine::Neural => AudioFormat::Wav,
        }
    }
}
