//! Structured (manga) mode: order/suborder assignment via subsequence token
//! matching against an externally supplied reading-order tree.
//!
//! The structured script is a JSON tree `{mangaTree: [{boxData: {order:
//! int[], textForVoiceover: string[]}}, ...]}`. Parallel arrays; mismatched
//! lengths produce a warning and proceed with the pairwise zip.

use crate::core::sentence::{normalize, sanitize_text, tokenize, Sentence};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct MangaTree {
    #[serde(rename = "mangaTree", default)]
    manga_tree: Vec<Panel>,
}

#[derive(Debug, Deserialize)]
struct Panel {
    #[serde(rename = "boxData")]
    box_data: BoxData,
}

#[derive(Debug, Deserialize)]
struct BoxData {
    #[serde(default)]
    order: Vec<i64>,
    #[serde(rename = "textForVoiceover", default)]
    text_for_voiceover: Vec<String>,
}

/// A single cleaned structured-script part, tagged with its display order
/// and the index it appeared at in the input (used as the tie-break when
/// sorting parts that share an `order`).
#[derive(Debug, Clone)]
pub struct StructuredPart {
    /// Display-order group this part belongs to.
    pub order: i64,
    /// Cleaned text (bracketed tags removed, whitespace collapsed).
    pub text: String,
}

/// Parse the structured script JSON and gather parts in ascending
/// `(order, input-sequence)`.
pub fn gather_structured_parts(json: &serde_json::Value) -> Vec<StructuredPart> {
    let tree: MangaTree = match serde_json::from_value(json.clone()) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("structured script did not match the expected shape: {}", e);
            return Vec::new();
        }
    };

    let mut parts = Vec::new();
    for panel in &tree.manga_tree {
        let BoxData {
            order,
            text_for_voiceover,
        } = &panel.box_data;
        if order.len() != text_for_voiceover.len() {
            log::warn!(
                "structured panel order[]/textForVoiceover[] length mismatch ({} vs {}); zipping pairwise",
                order.len(),
                text_for_voiceover.len()
            );
        }
        for (ord, text) in order.iter().zip(text_for_voiceover.iter()) {
            let cleaned = clean_structured_text(text);
            if !cleaned.is_empty() {
                parts.push(StructuredPart {
                    order: *ord,
                    text: cleaned,
                });
            }
        }
    }

    let mut indexed: Vec<(usize, StructuredPart)> = parts.into_iter().enumerate().collect();
    indexed.sort_by_key(|(idx, part)| (part.order, *idx));
    indexed.into_iter().map(|(_, part)| part).collect()
}

fn clean_structured_text(text: &str) -> String {
    let sanitized = sanitize_text(text);
    let without_tags = crate::core::chunker::text_parts::strip_bracketed_tags(&sanitized);
    normalize(&without_tags)
}

/// Assign `order`/`suborder` metadata to each sentence of a chunk by
/// matching its tokens as a subsequence against the concatenated token
/// stream of the structured parts (majority vote across the matched span).
pub fn assign_structured_order(sentences: &mut [Sentence], parts: &[StructuredPart]) {
    let mut stream: Vec<(String, i64)> = Vec::new();
    for part in parts {
        for tok in tokenize(&part.text) {
            stream.push((tok, part.order));
        }
    }
    if stream.is_empty() {
        return;
    }

    let mut cursor = 0usize;
    let mut per_order_counter: HashMap<i64, usize> = HashMap::new();

    for sentence in sentences.iter_mut() {
        let mut votes: HashMap<i64, usize> = HashMap::new();
        let mut probe = cursor;
        let mut matched_any = false;

        for token in &sentence.tokens {
            if let Some(found_at) = stream[probe..].iter().position(|(t, _)| t == token) {
                probe += found_at;
                *votes.entry(stream[probe].1).or_insert(0) += 1;
                probe += 1;
                matched_any = true;
            }
        }

        if matched_any {
            cursor = probe.saturating_sub(1).max(cursor);
            let winning_order = votes
                .into_iter()
                .max_by_key(|(_, count)| *count)
                .map(|(order, _)| order);
            sentence.meta.order = winning_order;
            if let Some(order) = winning_order {
                let counter = per_order_counter.entry(order).or_insert(0);
                sentence.meta.suborder = Some(*counter);
                *counter += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sentence::Sentence;
    use serde_json::json;

    #[test]
    fn gathers_parts_sorted_by_order_then_sequence() {
        let tree = json!({
            "mangaTree": [
                {"boxData": {"order": [3, 1], "textForVoiceover": ["third", "first"]}},
                {"boxData": {"order": [2], "textForVoiceover": ["second"]}},
            ]
        });
        let parts = gather_structured_parts(&tree);
        let texts: Vec<&str> = parts.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn assigns_order_by_majority_token_vote() {
        let parts = vec![
            StructuredPart {
                order: 1,
                text: "hello there friend".to_string(),
            },
            StructuredPart {
                order: 2,
                text: "goodbye now".to_string(),
            },
        ];
        let mut sentences = vec![
            Sentence::from_visible("Hello there friend.".to_string()),
            Sentence::from_visible("Goodbye now.".to_string()),
        ];
        assign_structured_order(&mut sentences, &parts);
        assert_eq!(sentences[0].meta.order, Some(1));
        assert_eq!(sentences[1].meta.order, Some(2));
        assert_eq!(sentences[0].meta.suborder, Some(0));
    }
}
