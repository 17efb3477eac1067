//! Text-parts merge manager: feeds pre-segmented parts directly into the
//! sentence stream, merging adjacent parts within the same chunk
//! ("suffix attachments") until the carrier reaches `min_chars`, with
//! support for dynamically shifting an attachment to the next carrier when
//! a match misfires.

use crate::core::sentence::{Sentence, SentenceMeta};
use regex::Regex;
use std::sync::LazyLock;

static BRACKET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\[\]]*\]").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip `[tag]` regions and collapse whitespace; used by both the
/// structured-mode cleaner and the text-parts carrier builder.
pub fn strip_bracketed_tags(text: &str) -> String {
    let stripped = BRACKET_TAG.replace_all(text, "");
    WHITESPACE_RUN.replace_all(stripped.trim(), " ").to_string()
}

/// One carrier sentence built from one or more pre-segmented parts. Parts
/// beyond the first are "suffix attachments"; the carrier keeps the index
/// of its first part for placeholder back-reference.
#[derive(Debug, Clone)]
pub(crate) struct Carrier {
    first_part_index: usize,
    attached_indices: Vec<usize>,
    text: String,
}

/// Build the carrier sequence from raw pre-segmented parts: adjacent parts
/// are merged as suffix attachments until the carrier reaches `min_chars`.
pub(crate) fn build_carriers(parts: &[String], min_chars: usize) -> Vec<Carrier> {
    let mut carriers = Vec::new();
    let mut current: Option<Carrier> = None;

    for (idx, raw) in parts.iter().enumerate() {
        let cleaned = strip_bracketed_tags(raw);
        if cleaned.is_empty() {
            continue;
        }
        match current.take() {
            None => {
                current = Some(Carrier {
                    first_part_index: idx,
                    attached_indices: Vec::new(),
                    text: cleaned,
                });
            }
            Some(mut carrier) => {
                if carrier.text.chars().count() < min_chars {
                    carrier.text = format!("{} {}", carrier.text, cleaned);
                    carrier.attached_indices.push(idx);
                    current = Some(carrier);
                } else {
                    carriers.push(carrier);
                    current = Some(Carrier {
                        first_part_index: idx,
                        attached_indices: Vec::new(),
                        text: cleaned,
                    });
                }
            }
        }
    }
    if let Some(carrier) = current {
        carriers.push(carrier);
    }
    carriers
}

/// Turn pre-segmented parts into a sentence stream with `text_part_index`
/// metadata recording the leading part each carrier absorbed. Every part
/// absorbed as a suffix attachment still gets its own zero-width
/// `placeholder` sentence right after its carrier, carrying `merged_into`
/// (the carrier's index in the returned stream) and `pre_merged_text` (the
/// attachment's own cleaned text before it was folded into the carrier), so
/// the carrier's `(chunk, order)` bucket and the merge are visible in the
/// output even though the placeholder consumes no audio.
pub fn build_sentences_from_parts(parts: &[String], min_chars: usize) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    for carrier in build_carriers(parts, min_chars) {
        let carrier_idx = sentences.len();
        let mut sentence = Sentence::from_visible(carrier.text);
        sentence.meta = SentenceMeta {
            text_part_index: Some(carrier.first_part_index),
            ..Default::default()
        };
        sentences.push(sentence);

        for part_idx in carrier.attached_indices {
            let pre_merged_text = strip_bracketed_tags(&parts[part_idx]);
            let mut placeholder = Sentence::from_visible(String::new());
            placeholder.meta = SentenceMeta {
                placeholder: true,
                merged_into: Some(carrier_idx),
                pre_merged_text: Some(pre_merged_text),
                text_part_index: Some(part_idx),
                ..Default::default()
            };
            sentences.push(placeholder);
        }
    }
    sentences
}

/// Shift the last attachment of the carrier at `carrier_idx` onto the
/// following carrier, then rebuild the sentence text. Used when a match
/// against a carrier fails and the merge manager wants to try pulling the
/// misaligned suffix onto the next carrier before giving up.
///
/// Returns `true` if a shift occurred (there was an attachment to move and
/// a following carrier to receive it).
pub(crate) fn shift_suffix_to_next(
    parts: &[String],
    carriers: &mut [Carrier],
    carrier_idx: usize,
) -> bool {
    if carrier_idx + 1 >= carriers.len() {
        return false;
    }
    let Some(moved_part_idx) = carriers[carrier_idx].attached_indices.pop() else {
        return false;
    };

    let rebuild = |indices: &[usize], first: usize| -> String {
        let mut text = strip_bracketed_tags(&parts[first]);
        for &i in indices {
            text = format!("{} {}", text, strip_bracketed_tags(&parts[i]));
        }
        text
    };
    carriers[carrier_idx].text = rebuild(
        &carriers[carrier_idx].attached_indices,
        carriers[carrier_idx].first_part_index,
    );

    let next = &mut carriers[carrier_idx + 1];
    let mut new_indices = vec![moved_part_idx];
    new_indices.extend(next.attached_indices.iter().copied());
    next.attached_indices = new_indices;
    next.text = rebuild(&next.attached_indices, next.first_part_index);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_short_parts_into_one_carrier_plus_placeholders() {
        let parts = vec!["Hi.".to_string(), "there.".to_string(), "friend.".to_string()];
        let sentences = build_sentences_from_parts(&parts, 15);
        // One real carrier plus one placeholder per absorbed attachment.
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[0].text_visible, "Hi. there. friend.");
        assert!(!sentences[0].meta.placeholder);

        assert!(sentences[1].meta.placeholder);
        assert_eq!(sentences[1].meta.merged_into, Some(0));
        assert_eq!(sentences[1].meta.pre_merged_text.as_deref(), Some("there."));
        assert_eq!(sentences[1].text_visible, "");

        assert!(sentences[2].meta.placeholder);
        assert_eq!(sentences[2].meta.merged_into, Some(0));
        assert_eq!(sentences[2].meta.pre_merged_text.as_deref(), Some("friend."));
    }

    #[test]
    fn strips_bracketed_tags_from_parts() {
        let parts = vec!["Hello [sfx] world, this line is long enough.".to_string()];
        let sentences = build_sentences_from_parts(&parts, 5);
        assert!(!sentences[0].text_visible.contains('['));
    }

    #[test]
    fn starts_new_carrier_once_min_chars_reached() {
        let parts = vec![
            "This sentence is already long enough on its own.".to_string(),
            "Second carrier starts fresh here too, plenty long.".to_string(),
        ];
        let sentences = build_sentences_from_parts(&parts, 10);
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn shift_suffix_moves_attachment_to_next_carrier() {
        let parts = vec!["Hi.".to_string(), "there.".to_string(), "Separate long carrier sentence.".to_string()];
        let mut carriers = build_carriers(&parts, 15);
        assert_eq!(carriers.len(), 2);
        let moved = shift_suffix_to_next(&parts, &mut carriers, 0);
        assert!(moved);
        assert!(carriers[1].text.starts_with("there."));
    }
}
