//! Speech processing traits
//!
//! The decode, transcribe, and synthesize boundaries are all external
//! collaborators (ffmpeg, model sidecars, a cloud voice gateway). Each is a
//! trait so the orchestrator can be exercised with fakes in tests.

use crate::audio::{AudioFormat, DecodedAudio};
use crate::transcript::Transcription;
use crate::Result;
use async_trait::async_trait;

/// Audio decode boundary
///
/// Takes arbitrary container/codec bytes and produces mono f32 PCM at
/// [`crate::TARGET_SAMPLE_RATE`]. Implementations report undecodable input
/// as an error with a short diagnostic hint.
#[async_trait]
pub trait AudioDecoder: Send + Sync + 'static {
    async fn decode(&self, raw: &[u8]) -> Result<DecodedAudio>;

    /// Decoder name for logging
    fn name(&self) -> &str;
}

/// Per-call transcription tunables
///
/// Threaded through every `transcribe` call rather than written onto a
/// shared engine instance, so concurrent requests with different settings
/// stay well-defined.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    /// Target language code (e.g. "ko"); engine default when absent
    pub language: Option<String>,
    /// Decode beam width; only the primary engine honors this
    pub beam_size: Option<u32>,
}

impl TranscribeOptions {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_beam_size(mut self, beam_size: u32) -> Self {
        self.beam_size = Some(beam_size);
        self
    }
}

/// Speech-to-text interface
///
/// Implementations:
/// - `HttpTranscriber` - posts PCM to a model sidecar service
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    /// Transcribe a complete utterance of mono 16 kHz PCM
    async fn transcribe(&self, pcm: &[f32], options: &TranscribeOptions) -> Result<Transcription>;

    /// Engine name for logging and response metadata
    fn engine_name(&self) -> &str;
}

/// Text-to-speech interface
///
/// `synthesize` takes one bounded chunk of text; callers that need to speak
/// long text go through the chunking synthesizer, which splits and calls
/// this per chunk. An empty result for non-empty text is a degraded
/// outcome the caller must surface, not silently drop.
#[async_trait]
pub trait SpeechBackend: Send + Sync + 'static {
    /// Synthesize one chunk of text into audio bytes
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;

    /// Engine name for logging
    fn engine_name(&self) -> &str;

    /// Container format of the bytes this backend emits
    fn audio_format(&self) -> AudioFormat;
}
