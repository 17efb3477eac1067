//! Paragraph and sentence splitting, bracketed-tag masking, and the
//! weak-opener/short-coalesce/dedup fragment-merging passes.

use super::{Sentence, SentenceBuilderConfig};
use regex::Regex;
use std::sync::LazyLock;

const TAG_OPEN: char = '\u{E000}';
const TAG_CLOSE: char = '\u{E001}';

static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());
static BRACKET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\[\]]*\]").unwrap());
static TAG_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("{TAG_OPEN}(\\d+){TAG_CLOSE}")).unwrap());

/// Split sanitized text into paragraphs on blank lines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    BLANK_LINE
        .split(text)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Mask `[tag]` regions, split on terminal punctuation, restore tags.
pub fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let masked = BRACKET_TAG.replace_all(paragraph, |caps: &regex::Captures| {
        let idx = tags.len();
        tags.push(caps[0].to_string());
        format!("{TAG_OPEN}{idx}{TAG_CLOSE}")
    });

    let fragments = split_on_terminal_punctuation(&masked);

    fragments
        .into_iter()
        .map(|frag| {
            TAG_PLACEHOLDER
                .replace_all(&frag, |caps: &regex::Captures| {
                    let idx: usize = caps[1].parse().unwrap();
                    tags[idx].clone()
                })
                .trim()
                .to_string()
        })
        .collect()
}

/// Split on `[.!?…؟]` runs followed by whitespace where the next non-space
/// character is a sentence starter (letter, digit, quote, paren, or masked
/// tag placeholder). No lookahead in the `regex` crate, so implemented as a
/// manual character scan.
fn split_on_terminal_punctuation(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut result = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < n {
        if matches!(chars[i], '.' | '!' | '?' | '؟') {
            let mut j = i + 1;
            while j < n && matches!(chars[j], '.' | '!' | '?' | '؟') {
                j += 1;
            }
            let mut k = j;
            let mut saw_ws = false;
            while k < n && chars[k].is_whitespace() {
                k += 1;
                saw_ws = true;
            }
            if saw_ws && k < n && is_sentence_starter(chars[k]) {
                let frag: String = chars[start..j].iter().collect();
                result.push(frag);
                start = k;
                i = k;
                continue;
            }
            i = j;
            continue;
        }
        i += 1;
    }
    if start < n {
        let frag: String = chars[start..].iter().collect();
        result.push(frag);
    }
    result
}

fn is_sentence_starter(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '"' | '\'' | '(' | TAG_OPEN)
}

/// Merge fragments that consist solely of a bare dash or ≤2 characters into
/// the following fragment.
pub fn weak_opener_merge(sentences: &mut Vec<Sentence>) {
    let mut i = 0;
    while i < sentences.len() {
        let is_weak = {
            let text = sentences[i].text_visible.trim();
            matches!(text, "-" | "—" | "–") || text.chars().count() <= 2
        };
        if is_weak && i + 1 < sentences.len() {
            let weak_text = sentences.remove(i).text_visible;
            let merged = format!("{} {}", weak_text, sentences[i].text_visible.trim_start());
            sentences[i] = Sentence::from_visible(merged);
        } else {
            i += 1;
        }
    }
}

fn is_arabic_script(text: &str) -> bool {
    text.chars()
        .any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

/// Merge fragments shorter than the configured character/token thresholds
/// into the previous fragment (or the next, if no previous exists). When
/// both neighbours carry `(chunk, order)` metadata, merging is restricted
/// to the same bucket.
pub fn short_coalesce(sentences: &mut Vec<Sentence>, config: &SentenceBuilderConfig) {
    let mut i = 0;
    while i < sentences.len() {
        let min_chars = if is_arabic_script(&sentences[i].text_visible) {
            config.min_chars_arabic
        } else {
            config.min_chars
        };
        let too_short =
            sentences[i].char_len() < min_chars || sentences[i].tokens.len() < config.min_tokens;
        if !too_short || sentences.len() == 1 {
            i += 1;
            continue;
        }

        let bucket = |s: &Sentence| (s.meta.chunk, s.meta.order);
        if i > 0 && bucket(&sentences[i - 1]) == bucket(&sentences[i]) {
            let cur = sentences.remove(i);
            let merged = format!(
                "{} {}",
                sentences[i - 1].text_visible,
                cur.text_visible.trim_start()
            );
            let meta = sentences[i - 1].meta.clone();
            sentences[i - 1] = Sentence::from_visible(merged);
            sentences[i - 1].meta = meta;
        } else if i + 1 < sentences.len() && bucket(&sentences[i + 1]) == bucket(&sentences[i]) {
            let cur = sentences.remove(i);
            let merged = format!(
                "{} {}",
                cur.text_visible,
                sentences[i].text_visible.trim_start()
            );
            let meta = sentences[i].meta.clone();
            sentences[i] = Sentence::from_visible(merged);
            sentences[i].meta = meta;
        } else {
            i += 1;
        }
    }
}

/// Remove consecutive fragments with identical visible text.
pub fn dedup_consecutive(sentences: &mut Vec<Sentence>) {
    sentences.dedup_by(|a, b| a.text_visible == b.text_visible);
}

/// Secondary pass: split any sentence that still contains an internal
/// `[.!?…] + whitespace + [A-Z/А-Я/digit/quote]` boundary after merging.
pub fn hard_split_safety(sentences: Vec<Sentence>) -> Vec<Sentence> {
    let mut out = Vec::with_capacity(sentences.len());
    for s in sentences {
        let parts = split_on_terminal_punctuation(&s.text_visible);
        if parts.len() <= 1 {
            out.push(s);
            continue;
        }
        for part in parts {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut new_sentence = Sentence::from_visible(trimmed.to_string());
            new_sentence.meta = s.meta.clone();
            out.push(new_sentence);
        }
    }
    out
}
