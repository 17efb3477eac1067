//! Sentence stream construction.
//!
//! Turns raw text blocks into the flat, ordered `Sentence` stream the aligner
//! consumes: punctuation sanitization, paragraph/terminal-punctuation
//! splitting with bracketed-tag masking, weak-opener merging, short-fragment
//! coalescing, and consecutive-duplicate removal.

mod sanitize;
mod split;

pub use sanitize::sanitize_text;
pub use split::{split_paragraphs, split_sentences};

use deunicode::deunicode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Optional metadata attached to a sentence by structured (manga) mode and
/// by the text-parts merge manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SentenceMeta {
    /// Index of the chunk (one per audio file in default mode) this sentence belongs to.
    pub chunk: Option<usize>,
    /// Structured-mode display order, assigned by majority vote over the matched span.
    pub order: Option<i64>,
    /// Disambiguator within an `order`, incrementing per occurrence.
    pub suborder: Option<usize>,
    /// True for a zero-width sentence produced by the text-parts merge manager.
    pub placeholder: bool,
    /// Index of the sentence this placeholder was merged into, if any.
    pub merged_into: Option<usize>,
    /// Original, pre-merge text of a sentence that absorbed a suffix attachment.
    pub pre_merged_text: Option<String>,
    /// Index into the pre-segmented parts list this sentence was built from.
    pub text_part_index: Option<usize>,
}

/// A single unit of the script, ready for alignment against ASR words.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sentence {
    /// Sanitized, human-readable text.
    pub text_visible: String,
    /// Lowercased, ASCII-folded, whitespace-collapsed form of `text_visible`.
    pub text_normalized: String,
    /// Word-unit tokens extracted from `text_normalized`.
    pub tokens: Vec<String>,
    /// Structured/merge metadata.
    pub meta: SentenceMeta,
}

impl Sentence {
    /// Build a sentence from already-sanitized visible text. Bracketed
    /// `[tag]` regions (stage directions, SFX cues) are stripped from the
    /// visible text before it is stored, per §3's `text_visible` contract.
    pub fn from_visible(text_visible: String) -> Self {
        let text_visible = strip_bracketed_tags(&text_visible);
        let text_normalized = normalize(&text_visible);
        let tokens = tokenize(&text_normalized);
        Self {
            text_visible,
            text_normalized,
            tokens,
            meta: SentenceMeta::default(),
        }
    }

    /// Character length of the visible text.
    pub fn char_len(&self) -> usize {
        self.text_visible.chars().count()
    }
}

/// Sentence Builder configuration.
#[derive(Debug, Clone)]
pub struct SentenceBuilderConfig {
    /// Minimum character count before a fragment is coalesced (Latin scripts).
    pub min_chars: usize,
    /// Reduced minimum character count for Arabic-script text.
    pub min_chars_arabic: usize,
    /// Minimum token count before a fragment is coalesced.
    pub min_tokens: usize,
}

impl From<&crate::config::SentenceConfig> for SentenceBuilderConfig {
    fn from(c: &crate::config::SentenceConfig) -> Self {
        Self {
            min_chars: c.min_chars,
            min_chars_arabic: c.min_chars_arabic,
            min_tokens: c.min_tokens,
        }
    }
}

/// Lowercase + ASCII-fold + whitespace-collapse a sanitized string.
pub fn normalize(visible: &str) -> String {
    static WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
    let folded = deunicode(&visible.to_lowercase());
    WS.replace_all(folded.trim(), " ").to_string()
}

/// Extract word-unit tokens from a normalized string: runs of word
/// characters, hyphens, and apostrophes, the same unit the fuzzy matcher
/// scores against (mirrors a `[\w\-']+` word-boundary regex rather than
/// plain whitespace splitting, so trailing/attached punctuation never
/// becomes part of a token).
pub fn tokenize(normalized: &str) -> Vec<String> {
    static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w\-']+").unwrap());
    WORD_RE
        .find_iter(normalized)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Strip bracketed `[tag]` regions and collapse the whitespace left behind.
fn strip_bracketed_tags(text: &str) -> String {
    static BRACKET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\[\]]*\]").unwrap());
    static WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
    let stripped = BRACKET_TAG.replace_all(text, "");
    WS.replace_all(stripped.trim(), " ").to_string()
}

/// Turn a sequence of raw text blocks into the flat ordered sentence stream.
///
/// Each block is sanitized, paragraph-split, sentence-split (with bracketed
/// tags masked), then weak-opener-merged, short-coalesced, and deduplicated.
pub fn build_sentences(blocks: &[String], config: &SentenceBuilderConfig) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    for block in blocks {
        let sanitized = sanitize_text(block);
        for paragraph in split::split_paragraphs(&sanitized) {
            let fragments = split::split_sentences(&paragraph);
            for fragment in fragments {
                if fragment.trim().is_empty() {
                    continue;
                }
                sentences.push(Sentence::from_visible(fragment));
            }
        }
    }
    split::weak_opener_merge(&mut sentences);
    split::short_coalesce(&mut sentences, config);
    split::dedup_consecutive(&mut sentences);
    split::hard_split_safety(sentences)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SentenceBuilderConfig {
        SentenceBuilderConfig {
            min_chars: 10,
            min_chars_arabic: 5,
            min_tokens: 2,
        }
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        let blocks = vec!["Hello world. Goodbye now.".to_string()];
        let sentences = build_sentences(&blocks, &cfg());
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].text_visible, "Hello world.");
        assert_eq!(sentences[1].text_visible, "Goodbye now.");
    }

    #[test]
    fn normalizes_smart_quotes_and_ellipsis() {
        let blocks = vec!["“Wait…” she said softly.".to_string()];
        let sentences = build_sentences(&blocks, &cfg());
        assert!(sentences.iter().any(|s| s.text_visible.contains("\"Wait...\"")));
    }

    #[test]
    fn bracketed_tag_does_not_force_a_split_but_is_stripped_from_output() {
        let blocks = vec!["This has [a.tag] inside it and it keeps going.".to_string()];
        let sentences = build_sentences(&blocks, &cfg());
        assert_eq!(sentences.len(), 1);
        assert!(!sentences[0].text_visible.contains('['));
        assert_eq!(
            sentences[0].text_visible,
            "This has inside it and it keeps going."
        );
    }

    #[test]
    fn normalize_ascii_folds_accented_characters() {
        assert_eq!(normalize("Café"), "cafe");
    }

    #[test]
    fn tokenize_drops_attached_punctuation() {
        assert_eq!(tokenize("hello, world!"), vec!["hello", "world"]);
        assert_eq!(tokenize("don't stop"), vec!["don't", "stop"]);
    }

    #[test]
    fn coalesces_short_fragments_into_previous() {
        let blocks = vec!["This is a long enough lead sentence. Ok.".to_string()];
        let sentences = build_sentences(&blocks, &cfg());
        assert_eq!(sentences.len(), 1);
        assert!(sentences[0].text_visible.ends_with("Ok."));
    }

    #[test]
    fn deduplicates_consecutive_identical_fragments() {
        let blocks = vec!["Repeat this sentence text. Repeat this sentence text.".to_string()];
        let sentences = build_sentences(&blocks, &cfg());
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn tokenize_splits_on_whitespace() {
        assert_eq!(tokenize("hello world"), vec!["hello", "world"]);
    }
}
