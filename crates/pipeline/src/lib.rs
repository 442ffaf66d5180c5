//! Request pipeline: decode → transcribe → retrieve → compose → synthesize
//!
//! The orchestrator runs each request through a strictly sequential chain
//! of engine calls. Every failure carries the stage it happened in and a
//! stable caller-visible code, so the transport layer never has to guess
//! which step broke.

pub mod asr;
pub mod compose;
pub mod decode;
pub mod orchestrator;
pub mod tts;

pub use asr::{HttpAsrConfig, HttpTranscriber};
pub use compose::{ComposerConfig, UtteranceComposer, NOT_FOUND_UTTERANCE};
pub use decode::FfmpegDecoder;
pub use orchestrator::{
    EngineRegistry, OrchestratorConfig, PipelineOrchestrator, PipelineRequest, PipelineResponse,
    SearchBlock, SynthesisBlock, TranscriptionBlock,
};
pub use tts::{
    HttpSpeechClient, HttpTtsConfig, PunctuationSegmenter, SentenceSegmenter, SpeechSynthesizer,
    SynthesizerConfig,
};

use std::time::Duration;

use policy_voice_retrieval::RetrievalError;
use thiserror::Error;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Received,
    Decoded,
    Transcribed,
    Retrieved,
    Composed,
    Synthesized,
    Completed,
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Audio decode failed: {0}")]
    AudioDecode(String),

    #[error("Audio too long: {actual_seconds:.1}s exceeds the {limit_seconds}s limit")]
    AudioTooLong {
        limit_seconds: u64,
        actual_seconds: f64,
    },

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Synthesis produced no audio")]
    SynthesisEmpty,

    #[error("Request timed out after {after:?}")]
    Timeout { after: Duration },
}

impl PipelineError {
    /// Stage the failure is attributed to
    pub fn stage(&self) -> PipelineStage {
        match self {
            // The duration ceiling is checked on decoded audio, before
            // transcription starts, so it belongs to the decode stage.
            PipelineError::AudioDecode(_) | PipelineError::AudioTooLong { .. } => {
                PipelineStage::Decoded
            }
            PipelineError::Transcription(_) => PipelineStage::Transcribed,
            PipelineError::Retrieval(_) => PipelineStage::Retrieved,
            PipelineError::Synthesis(_) | PipelineError::SynthesisEmpty => {
                PipelineStage::Synthesized
            }
            PipelineError::Timeout { .. } => PipelineStage::Received,
        }
    }

    /// Stable caller-visible code; each failure kind maps to its own
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::AudioDecode(_) => "audio_decode_error",
            PipelineError::AudioTooLong { .. } => "audio_too_long",
            PipelineError::Transcription(_) => "transcription_error",
            PipelineError::Retrieval(RetrievalError::IndexUnavailable) => "index_unavailable",
            PipelineError::Retrieval(RetrievalError::Configuration(_)) => "config_error",
            PipelineError::Retrieval(RetrievalError::Schema(_)) => "schema_error",
            PipelineError::Retrieval(_) => "retrieval_error",
            PipelineError::Synthesis(_) => "synthesis_error",
            PipelineError::SynthesisEmpty => "synthesis_empty",
            PipelineError::Timeout { .. } => "timeout",
        }
    }

    /// Bad input rather than a backend fault; not worth retrying
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::AudioDecode(_) | PipelineError::AudioTooLong { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_attribution() {
        let too_long = PipelineError::AudioTooLong {
            limit_seconds: 15,
            actual_seconds: 20.0,
        };
        assert_eq!(too_long.stage(), PipelineStage::Decoded);
        assert_eq!(too_long.code(), "audio_too_long");
        assert!(too_long.is_client_error());

        let empty = PipelineError::SynthesisEmpty;
        assert_eq!(empty.stage(), PipelineStage::Synthesized);
        assert!(!empty.is_client_error());
    }

    #[test]
    fn test_retrieval_codes_distinct() {
        let unavailable = PipelineError::Retrieval(RetrievalError::IndexUnavailable);
        assert_eq!(unavailable.code(), "index_unavailable");

        let schema = PipelineError::Retrieval(RetrievalError::Schema("x".into()));
        assert_eq!(schema.code(), "schema_error");
    }
}
