//! Engine selectors
//!
//! The two ASR backends and two TTS backends are closed sets. Callers pick
//! one by variant, never by free-form string, so an unknown engine is a
//! deserialization error at the transport edge instead of a runtime branch.

use serde::{Deserialize, Serialize};

/// Which transcription backend handles a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AsrEngine {
    /// Default engine: fast batched decoder, honors per-call beam width
    #[default]
    Primary,
    /// Second engine kept for quality comparison; no beam-width tunable
    Fallback,
}

impl AsrEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsrEngine::Primary => "primary",
            AsrEngine::Fallback => "fallback",
        }
    }
}

/// Which synthesis backend produces the spoken response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    /// Default engine: streaming cloud voice gateway, returns MP3
    #[default]
    Standard,
    /// Local neural vocoder sidecar, returns WAV
    Neural,
}

impl TtsEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsEngine::Standard => "standard",
            TtsEngine::Neural => "neural",
        }
    }
}

impl std::str::FromStr for AsrEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(AsrEngine::Primary),
            "fallback" => Ok(AsrEngine::Fallback),
            other => Err(format!("unknown ASR engine: {other}")),
        }
    }
}

impl std::str::FromStr for TtsEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(TtsEngine::Standard),
            "neural" => Ok(TtsEngine::Neural),
            other => Err(format!("unknown TTS engine: {other}")),
        }
    }
}
