//! Core traits and types for the policy voice pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - Engine capability traits (audio decode, transcription, synthesis)
//! - Decoded audio and transcript types
//! - Closed engine selectors for the two ASR and two TTS backends
//! - Error types

pub mod audio;
pub mod engine;
pub mod error;
pub mod traits;
pub mod transcript;

pub use audio::{AudioFormat, DecodedAudio, TARGET_SAMPLE_RATE};
pub use engine::{AsrEngine, TtsEngine};
pub use error::{Error, Result};
pub use traits::{AudioDecoder, SpeechBackend, TranscribeOptions, Transcriber};
pub use transcript::Transcription;
