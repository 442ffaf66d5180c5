//! Chunked synthesis
//!
//! Synthesis backends accept bounded input length. Long text is split
//! into sentence-like units, the units are greedily packed into chunks
//! under the limit, and each chunk is synthesized **in order**; the raw
//! audio streams are concatenated byte-for-byte in chunk order. Chunks
//! are never synthesized concurrently because concatenation is
//! order-sensitive.

use std::sync::Arc;

use policy_voice_core::{AudioFormat, Result, SpeechBackend};

use super::segment::{normalize_whitespace, PunctuationSegmenter, SentenceSegmenter};

/// Chunking configuration
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Largest chunk (in chars) sent to the backend in one call
    pub max_chunk_chars: usize,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: policy_voice_config::constants::tts::MAX_CHUNK_CHARS,
        }
    }
}

/// Backend wrapper that enforces the chunking contract
pub struct SpeechSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    segmenter: Arc<dyn SentenceSegmenter>,
    config: SynthesizerConfig,
}

impl SpeechSynthesizer {
    pub fn new(backend: Arc<dyn SpeechBackend>, config: SynthesizerConfig) -> Self {
        Self {
            backend,
            segmenter: Arc::new(PunctuationSegmenter),
            config,
        }
    }

    /// Swap in a different segmentation strategy (e.g. another locale)
    pub fn with_segmenter(mut self, segmenter: Arc<dyn SentenceSegmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn engine_name(&self) -> &str {
        self.backend.engine_name()
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.backend.audio_format()
    }

    /// Synthesize text of any length
    ///
    /// Empty input (after normalization) returns empty bytes. A failed
    /// chunk fails the whole call; partial audio is never returned as if
    /// it were complete.
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let chunks = self.chunk_text(text);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let bytes = self.backend.synthesize(chunk, voice).await?;
            tracing::debug!(
                chunk = index,
                chunks = chunks.len(),
                chars = chunk.chars().count(),
                bytes = bytes.len(),
                "Synthesized chunk"
            );
            audio.extend_from_slice(&bytes);
        }

        Ok(audio)
    }

    /// Split normalized text into chunks of at most `max_chunk_chars`
    ///
    /// Prefers sentence boundaries; a single unit that is itself over the
    /// limit gets hard-sliced at the char limit as a last resort (a
    /// mid-word cut beats failing the request).
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let max_chars = self.config.max_chunk_chars;
        let text = normalize_whitespace(text);
        if text.is_empty() {
            return Vec::new();
        }
        if text.chars().count() <= max_chars {
            return vec![text];
        }

        let units = self.segmenter.segment(&text);

        // Greedy packing: units joined by one space, never over the limit
        let mut packed: Vec<String> = Vec::new();
        let mut buffer = String::new();
        let mut buffer_chars = 0usize;
        for unit in units {
            let unit_chars = unit.chars().count();
            let needed = unit_chars + if buffer.is_empty() { 0 } else { 1 };
            if buffer_chars + needed <= max_chars {
                if !buffer.is_empty() {
                    buffer.push(' ');
                }
                buffer.push_str(&unit);
                buffer_chars += needed;
            } else {
                if !buffer.is_empty() {
                    packed.push(std::mem::take(&mut buffer));
                }
                buffer_chars = unit_chars;
                buffer = unit;
            }
        }
        if !buffer.is_empty() {
            packed.push(buffer);
        }

        // Hard-slice anything still over the limit
        let mut chunks = Vec::new();
        for chunk in packed {
            if chunk.chars().count() <= max_chars {
                chunks.push(chunk);
            } else {
                let chars: Vec<char> = chunk.chars().collect();
                for slice in chars.chunks(max_chars) {
                    chunks.push(slice.iter().collect());
                }
            }
        }

        chunks.retain(|c| !c.is_empty());
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use policy_voice_core::Error;

    /// Backend that records every chunk and returns one marker byte per call
    struct RecordingBackend {
        chunks: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                chunks: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SpeechBackend for RecordingBackend {
        async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>> {
            let mut chunks = self.chunks.lock();
            let index = chunks.len() as u8;
            chunks.push(text.to_string());
            Ok(vec![index])
        }

        fn engine_name(&self) -> &str {
            "recording"
        }

        fn audio_format(&self) -> AudioFormat {
            AudioFormat::Wav
        }
    }

    fn synthesizer(max_chunk_chars: usize) -> (SpeechSynthesizer, Arc<RecordingBackend>) {
        let backend = RecordingBackend::new();
        (
            SpeechSynthesizer::new(backend.clone(), SynthesizerConfig { max_chunk_chars }),
            backend,
        )
    }

    #[tokio::test]
    async fn test_short_text_single_call() {
        let (synth, backend) = synthesizer(4000);
        let audio = synth.synthesize("Short sentence.", "voice-a").await.unwrap();
        assert_eq!(audio, vec![0]);
        assert_eq!(backend.chunks.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_empty_output() {
        let (synth, backend) = synthesizer(4000);
        let audio = synth.synthesize("   \n\t ", "voice-a").await.unwrap();
        assert!(audio.is_empty());
        assert!(backend.chunks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_concatenation_order() {
        let (synth, _) = synthesizer(40);
        // Each sentence is 30 chars with the terminal period, so each
        // chunk holds exactly one and order is observable in the bytes.
        let text = "Aaaaaaaaaaaaaaaaaaaaaaaaaaaaa. Bbbbbbbbbbbbbbbbbbbbbbbbbbbbb. Ccccccccccccccccccccccccccccc.";
        let audio = synth.synthesize(text, "voice-a").await.unwrap();
        assert_eq!(audio, vec![0, 1, 2]);
    }

    #[test]
    fn test_nine_thousand_chars_three_chunks() {
        let (synth, _) = synthesizer(4000);
        // 100 sentences of 90 chars each (89 + terminal period), joined by
        // single spaces after normalization: 9099 chars total.
        let sentence = format!("{}.", "x".repeat(89));
        let text = vec![sentence; 100].join(" ");

        let chunks = synth.chunk_text(&text);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4000);
        }
    }

    #[test]
    fn test_chunking_preserves_content_length() {
        let (synth, _) = synthesizer(100);
        let sentence = format!("{}.", "y".repeat(30));
        let text = vec![sentence; 20].join(" ");
        let normalized_len = normalize_whitespace(&text).chars().count();

        let chunks = synth.chunk_text(&text);
        // One joining space is dropped per chunk boundary
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert_eq!(total + (chunks.len() - 1), normalized_len);
    }

    #[test]
    fn test_oversized_unit_hard_sliced() {
        let (synth, _) = synthesizer(50);
        // One unbroken 120-char "sentence" with no boundaries at all
        let text = "z".repeat(120);
        let chunks = synth.chunk_text(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 50);
        assert_eq!(chunks[1].chars().count(), 50);
        assert_eq!(chunks[2].chars().count(), 20);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_packs_multiple_units_per_chunk() {
        let (synth, _) = synthesizer(25);
        let chunks = synth.chunk_text("One two. Three four. Five six. Seven eight.");
        // "One two. Three four." is 20 chars and fits; adding "Five six."
        // would need 30, so it starts the next chunk.
        assert_eq!(chunks[0], "One two. Three four.");
        assert_eq!(chunks[1], "Five six. Seven eight.");
    }

    /// Backend that fails on the second chunk
    struct FailingBackend {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl SpeechBackend for FailingBackend {
        async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Vec<u8>> {
            let mut calls = self.calls.lock();
            *calls += 1;
            if *calls >= 2 {
                Err(Error::Synthesis("backend fell over".to_string()))
            } else {
                Ok(vec![1, 2, 3])
            }
        }

        fn engine_name(&self) -> &str {
            "failing"
        }

        fn audio_format(&self) -> AudioFormat {
            AudioFormat::Mp3
        }
    }

    #[tokio::test]
    async fn test_chunk_failure_returns_no_partial_audio() {
        let synth = SpeechSynthesizer::new(
            Arc::new(FailingBackend {
                calls: Mutex::new(0),
            }),
            SynthesizerConfig { max_chunk_chars: 20 },
        );
        let text = "First short one. Second short one. Third short one.";
        let result = synth.synthesize(text, "voice-a").await;
        assert!(result.is_err());
    }
}
