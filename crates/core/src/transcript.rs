//! Transcription result types

use serde::{Deserialize, Serialize};

/// Output of one transcription call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    /// Transcribed text, trimmed
    pub text: String,
    /// Language the engine detected or was told to use
    pub language: Option<String>,
    /// Audio duration as reported by the engine, if it reports one
    pub audio_seconds: Option<f64>,
}

impl Transcription {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
