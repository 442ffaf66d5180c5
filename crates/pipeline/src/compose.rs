//! Spoken utterance composition
//!
//! Turns the top retrieval result into a short spoken sentence, or a
//! fixed "not found" utterance when the search came back empty. This
//! step has no failure mode.

use std::sync::Arc;

use policy_voice_retrieval::SearchResult;

use crate::tts::segment::{normalize_whitespace, PunctuationSegmenter, SentenceSegmenter};

/// Utterance spoken when retrieval finds nothing
pub const NOT_FOUND_UTTERANCE: &str =
    "I could not find a matching service. Could you describe what you need in a little more detail?";

const NO_SUMMARY: &str = "No summary is available for this service.";

/// Composer configuration
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// Character budget for the support-text summary
    pub max_summary_chars: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_summary_chars: policy_voice_config::constants::tts::MAX_SUMMARY_CHARS,
        }
    }
}

/// Template-based utterance composer
pub struct UtteranceComposer {
    segmenter: Arc<dyn SentenceSegmenter>,
    config: ComposerConfig,
}

impl UtteranceComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self {
            segmenter: Arc::new(PunctuationSegmenter),
            config,
        }
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn SentenceSegmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Compose the spoken response from ranked results
    pub fn compose(&self, results: &[SearchResult]) -> String {
        match results.first() {
            Some(top) => format!(
                "The closest matching service is {}. {}",
                top.service_name,
                self.summarize(&top.support)
            ),
            None => NOT_FOUND_UTTERANCE.to_string(),
        }
    }

    /// First two sentence-like units of the support text, ellipsized to
    /// the configured budget
    fn summarize(&self, support: &str) -> String {
        let text = normalize_whitespace(support);
        if text.is_empty() {
            return NO_SUMMARY.to_string();
        }

        let units = self.segmenter.segment(&text);
        let mut summary = units
            .iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        if !summary.ends_with(['.', '!', '?']) {
            summary.push('.');
        }

        if summary.chars().count() > self.config.max_summary_chars {
            summary = summary
                .chars()
                .take(self.config.max_summary_chars.saturating_sub(1))
                .collect();
            summary.push('…');
        }

        summary
    }
}

impl Default for UtteranceComposer {
    fn default() -> Self {
        Self::new(ComposerConfig::default())
    }
}
