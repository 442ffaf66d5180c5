//! Decoded audio types
//!
//! Everything past the decode boundary works on mono f32 PCM at a fixed
//! sample rate. Decoders are responsible for resampling and downmixing.

use serde::{Deserialize, Serialize};

/// Sample rate all decoders must emit
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Mono f32 PCM, normalized to [-1.0, 1.0]
#[derive(Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds, rounded to millisecond precision
    pub fn seconds(&self) -> f64 {
        let raw = self.samples.len() as f64 / self.sample_rate as f64;
        (raw * 1000.0).round() / 1000.0
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Little-endian f32 byte view, the wire format for engine sidecars
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

impl std::fmt::Debug for DecodedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedAudio")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("seconds", &self.seconds())
            .finish()
    }
}

/// Container format of synthesized audio bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds() {
        let audio = DecodedAudio::new(vec![0.0; 16_000], TARGET_SAMPLE_RATE);
        assert_eq!(audio.seconds(), 1.0);

        let audio = DecodedAudio::new(vec![0.0; 24_000], TARGET_SAMPLE_RATE);
        assert_eq!(audio.seconds(), 1.5);
    }

    #[test]
    fn test_seconds_rounds_to_millis() {
        // 16 001 samples at 16 kHz is 1.0000625 s
        let audio = DecodedAudio::new(vec![0.0; 16_001], TARGET_SAMPLE_RATE);
        assert_eq!(audio.seconds(), 1.0);
    }

    #[test]
    fn test_le_bytes_round_trip() {
        let audio = DecodedAudio::new(vec![0.5, -0.25], TARGET_SAMPLE_RATE);
        let bytes = audio.to_le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 0.5);
    }
}
