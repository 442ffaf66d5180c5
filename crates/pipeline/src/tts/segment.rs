//! Sentence segmentation
//!
//! Chunking and summarization both need "sentence-like units". The
//! boundary rules are language-specific, so they sit behind a trait;
//! packing and concatenation logic never needs to know about them.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Collapse whitespace runs into single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Splits text into sentence-like units
pub trait SentenceSegmenter: Send + Sync + 'static {
    /// Units in order; concatenation order must match the input
    fn segment(&self, text: &str) -> Vec<String>;
}

/// Default segmenter for Korean and Latin-script text
///
/// A unit ends after sentence-final punctuation, or after the politeness
/// markers 다/요 when followed by whitespace, since Korean sentences often
/// end on those without terminal punctuation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PunctuationSegmenter;

impl SentenceSegmenter for PunctuationSegmenter {
    fn segment(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut units = Vec::new();
        let mut current = String::new();

        for (i, &c) in chars.iter().enumerate() {
            current.push(c);

            let terminal = matches!(c, '.' | '!' | '?' | '。');
            let politeness = matches!(c, '다' | '요')
                && chars.get(i + 1).is_some_and(|next| next.is_whitespace());

            if terminal || politeness {
                let unit = current.trim();
                if !unit.is_empty() {
                    units.push(unit.to_string());
                }
                current.clear();
            }
        }

        let tail = current.trim();
        if !tail.is_empty() {
            units.push(tail.to_string());
        }

        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a\tb\n\nc  "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_terminal_punctuation() {
        let units = PunctuationSegmenter.segment("First one. Second one! Third?");
        assert_eq!(units, vec!["First one.", "Second one!", "Third?"]);
    }

    #[test]
    fn test_politeness_markers() {
        let units = PunctuationSegmenter.segment("신청할 수 있습니다 자세한 내용은 홈페이지를 참고하세요 감사합니다");
        assert_eq!(units.len(), 3);
        assert!(units[0].ends_with("있습니다"));
        assert!(units[1].ends_with("참고하세요"));
    }

    #[test]
    fn test_marker_without_following_space_not_boundary() {
        // 다 mid-word must not split
        let units = PunctuationSegmenter.segment("다양한 지원");
        assert_eq!(units, vec!["다양한 지원"]);
    }

    #[test]
    fn test_unterminated_tail_kept() {
        let units = PunctuationSegmenter.segment("Complete sentence. trailing fragment");
        assert_eq!(units, vec!["Complete sentence.", "trailing fragment"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(PunctuationSegmenter.segment("").is_empty());
        assert!(PunctuationSegmenter.segment("   ").is_empty());
    }
}
