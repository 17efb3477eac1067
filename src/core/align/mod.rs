//! The Aligner: the central incremental-alignment state machine.
//!
//! Holds the full sentence stream, an append-only word stream (text plus
//! per-word source audio), a sentence cursor, a word cursor, and the last
//! committed `(start_ms, end_ms)`. `extend_words_and_align` greedily
//! matches as many next sentences as possible against the tail of the word
//! stream using the multi-scale fuzzy window search of the spec.

pub mod fuzzy;

use crate::config::AlignerConfig;
use crate::core::sentence::Sentence;
use fuzzy::compact_form;

/// A single ASR word in the global timeline.
#[derive(Debug, Clone)]
pub struct Word {
    /// Raw transcribed text.
    pub text: String,
    /// Start time in milliseconds, global timeline.
    pub start_ms: i64,
    /// End time in milliseconds, global timeline.
    pub end_ms: i64,
}

/// A committed (or not-yet-committed) alignment slot, one per sentence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedSlot {
    /// Committed start time in milliseconds, `None` if unaligned.
    pub start_ms: Option<i64>,
    /// Committed end time in milliseconds, `None` if unaligned.
    pub end_ms: Option<i64>,
    /// Audio file this sentence was attributed to, `None` if unaligned.
    pub audio_file: Option<String>,
}

/// A located (but not yet committed) match: the half-open word-index range
/// `[word_start, word_end)` that best matches a sentence.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Located {
    pub word_start: usize,
    pub word_end: usize,
}

/// The incremental alignment state machine.
pub struct Aligner {
    sentences: Vec<Sentence>,
    words: Vec<Word>,
    word_texts: Vec<String>,
    word_srcs: Vec<String>,
    results: Vec<AlignedSlot>,
    sent_idx: usize,
    cursor: usize,
    last_start_ms: i64,
    last_end_ms: i64,
    stop_idx: Option<usize>,
    forced_src: Option<String>,
    config: AlignerConfig,
}

impl Aligner {
    /// Build a fresh aligner over the given sentence stream.
    pub fn new(sentences: Vec<Sentence>, config: AlignerConfig) -> Self {
        let results = vec![AlignedSlot::default(); sentences.len()];
        Self {
            sentences,
            words: Vec::new(),
            word_texts: Vec::new(),
            word_srcs: Vec::new(),
            results,
            sent_idx: 0,
            cursor: 0,
            last_start_ms: -1,
            last_end_ms: -1,
            stop_idx: None,
            forced_src: None,
            config,
        }
    }

    /// Restore state from a resumed progress snapshot: pre-load already
    /// committed `(sentence, start_ms, end_ms, src)` tuples, set `sent_idx`
    /// to one past the last committed sentence, and re-derive `cursor`.
    pub fn restore(&mut self, results: Vec<AlignedSlot>, last_end_ms: i64) {
        self.sent_idx = results
            .iter()
            .position(|r| r.start_ms.is_none())
            .unwrap_or(results.len());
        self.results = results;
        self.last_end_ms = last_end_ms;
        self.last_start_ms = last_end_ms;
        self.cursor = self.rederive_cursor();
    }

    /// Index of the next unmatched sentence.
    pub fn sent_idx(&self) -> usize {
        self.sent_idx
    }

    /// Total number of sentences in the stream.
    pub fn len_sentences(&self) -> usize {
        self.sentences.len()
    }

    /// Last committed `end_ms`, or -1 if nothing has been committed yet.
    pub fn last_end_ms(&self) -> i64 {
        self.last_end_ms
    }

    /// Last committed `start_ms`, or -1 if nothing has been committed yet.
    pub fn last_start_ms(&self) -> i64 {
        self.last_start_ms
    }

    /// End time in milliseconds of the last appended word, or -1 if no
    /// words have been appended.
    pub fn last_word_end_ms(&self) -> i64 {
        self.words.last().map(|w| w.end_ms).unwrap_or(-1)
    }

    /// Read-only view of the committed alignment results, one per sentence.
    pub fn results(&self) -> &[AlignedSlot] {
        &self.results
    }

    /// Read-only view of the sentence stream.
    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Set the chunk upper bound: the aligner will not advance `sent_idx`
    /// past this index while it is set.
    pub fn set_stop_idx(&mut self, stop_idx: Option<usize>) {
        self.stop_idx = stop_idx;
    }

    /// Set the audio file name stamped on every subsequent match.
    pub fn set_forced_src(&mut self, src: Option<String>) {
        self.forced_src = src;
    }

    fn effective_stop(&self) -> usize {
        self.stop_idx.unwrap_or(self.sentences.len()).min(self.sentences.len())
    }

    /// Append a batch of words transcribed from `src`, replacing any
    /// previously appended words for the same source (reprocessing), then
    /// drive the matcher until it stalls, the stream is exhausted, or the
    /// chunk boundary is reached. Returns the number of sentences newly
    /// committed.
    pub fn extend_words_and_align(&mut self, new_words: Vec<Word>, src: &str) -> usize {
        if self.word_srcs.iter().any(|s| s == src) {
            self.replace_words_for_src(src);
        }
        for word in new_words {
            self.word_texts.push(normalize_word(&word.text));
            self.word_srcs.push(src.to_string());
            self.words.push(word);
        }

        let mut committed = 0;
        while self.try_match_sentence(false) {
            committed += 1;
        }
        committed
    }

    fn replace_words_for_src(&mut self, src: &str) {
        let mut words = Vec::new();
        let mut word_texts = Vec::new();
        let mut word_srcs = Vec::new();
        for ((word, text), s) in self
            .words
            .drain(..)
            .zip(self.word_texts.drain(..))
            .zip(self.word_srcs.drain(..))
        {
            if s != src {
                words.push(word);
                word_texts.push(text);
                word_srcs.push(s);
            }
        }
        self.words = words;
        self.word_texts = word_texts;
        self.word_srcs = word_srcs;
        self.cursor = self.rederive_cursor();
    }

    fn rederive_cursor(&self) -> usize {
        let floor = self.last_end_ms + 1;
        self.words
            .iter()
            .position(|w| w.start_ms >= floor)
            .unwrap_or(self.words.len())
    }

    /// Try to match and commit the sentence at `sent_idx`. Returns `true`
    /// if the stream advanced (either a real match or a placeholder
    /// commit).
    fn try_match_sentence(&mut self, aggressive: bool) -> bool {
        if self.sent_idx >= self.effective_stop() {
            return false;
        }
        if self.sentences[self.sent_idx].meta.placeholder {
            self.commit_placeholder();
            return true;
        }
        match self.locate_match(self.sent_idx, aggressive) {
            Some(located) => {
                self.commit_matched(self.sent_idx, located.word_start, located.word_end);
                self.cursor = located.word_end;
                self.sent_idx += 1;
                true
            }
            None => false,
        }
    }

    fn commit_placeholder(&mut self) {
        self.results[self.sent_idx] = AlignedSlot::default();
        self.sent_idx += 1;
    }

    /// Search (without mutating state) for the best-matching word window
    /// for `sentences[idx]`. `aggressive = true` widens expansions, lowers
    /// the threshold, and raises the search budget (used by recovery's
    /// anchor search).
    pub(crate) fn locate_match(&self, idx: usize, aggressive: bool) -> Option<Located> {
        let sentence = &self.sentences[idx];
        let l = sentence.tokens.len();
        if l == 0 || self.cursor >= self.words.len() {
            return None;
        }

        let threshold = if aggressive {
            self.config.aggressive_threshold
        } else {
            self.config.normal_threshold
        };
        let cap = if aggressive {
            l + (l * 6 / 10).max(6)
        } else {
            l + 6
        };

        let sizes = window_sizes(l, aggressive, cap);
        let budget_floor = if aggressive {
            self.config.max_checks_aggressive
        } else {
            self.config.max_checks
        };
        let budget = budget_floor.max(20 * self.words.len().saturating_sub(self.cursor));

        let tail_anchor = l >= 8
            && sentence
                .tokens
                .last()
                .map(|t| compact_form(t).chars().count() >= 3)
                .unwrap_or(false);
        let last_token_compact = sentence.tokens.last().map(|t| compact_form(t));

        let mut checks = 0usize;
        let mut best: Option<(f64, usize, usize)> = None;

        'sizes: for &k in &sizes {
            if k == 0 || self.cursor + k > self.words.len() {
                continue;
            }
            let step = if tail_anchor {
                1
            } else if aggressive {
                (k / 10).max(1)
            } else {
                (k / 6).max(1)
            };

            let mut i = self.cursor;
            while i + k <= self.words.len() {
                checks += 1;
                if checks > budget {
                    break 'sizes;
                }

                if tail_anchor {
                    let last_word_compact = compact_form(&self.word_texts[i + k - 1]);
                    if Some(&last_word_compact) != last_token_compact.as_ref() {
                        i += 1;
                        continue;
                    }
                }

                let window_text = self.word_texts[i..i + k].join(" ");
                let score = fuzzy::best_score(&sentence.text_normalized, &window_text, threshold);
                if best.map(|(b, _, _)| score > b).unwrap_or(true) {
                    best = Some((score, i, k));
                }
                if score >= 99.999 {
                    break 'sizes;
                }
                i += step;
            }
        }

        let (score, word_start, k) = best?;
        if score < threshold {
            return None;
        }
        let candidate_end = word_start + k;
        let word_end = self.refine_end(idx, word_start, candidate_end);
        Some(Located {
            word_start,
            word_end: word_end.max(word_start + 1),
        })
    }

    /// Walk both token sequences forward from `word_start`, allowing 2-3
    /// token merges in either direction and skipping unmatchable ASR
    /// tokens, to settle on the precise committed end index.
    fn refine_end(&self, sent_idx: usize, word_start: usize, candidate_end: usize) -> usize {
        let tokens = &self.sentences[sent_idx].tokens;
        let max_len = self.words.len();
        let search_ceiling = (candidate_end + tokens.len().max(4)).min(max_len);

        let mut wi = word_start;
        let mut ti = 0usize;
        let mut last_matched = word_start;
        let mut stagnant_steps = 0usize;

        while ti < tokens.len() && wi < search_ceiling {
            let tok_compact = compact_form(&tokens[ti]);
            if !tok_compact.is_empty() && compact_form(&self.word_texts[wi]) == tok_compact {
                last_matched = wi;
                wi += 1;
                ti += 1;
                stagnant_steps = 0;
                continue;
            }

            let mut matched = false;
            for merge_len in 2..=3usize {
                if wi + merge_len <= search_ceiling {
                    let merged: String = self.word_texts[wi..wi + merge_len]
                        .iter()
                        .map(|s| compact_form(s))
                        .collect();
                    if !merged.is_empty() && merged == tok_compact {
                        last_matched = wi + merge_len - 1;
                        wi += merge_len;
                        ti += 1;
                        matched = true;
                        break;
                    }
                }
            }
            if matched {
                stagnant_steps = 0;
                continue;
            }

            for merge_len in 2..=3usize {
                if ti + merge_len <= tokens.len() {
                    let merged_tok: String = tokens[ti..ti + merge_len]
                        .iter()
                        .map(|t| compact_form(t))
                        .collect();
                    if !merged_tok.is_empty() && merged_tok == compact_form(&self.word_texts[wi]) {
                        last_matched = wi;
                        wi += 1;
                        ti += merge_len;
                        matched = true;
                        break;
                    }
                }
            }
            if matched {
                stagnant_steps = 0;
                continue;
            }

            // Unmatchable ASR word: skip it and keep trying.
            wi += 1;
            stagnant_steps += 1;
            if stagnant_steps > 4 {
                break;
            }
        }

        (last_matched + 1).max(candidate_end.min(max_len))
    }

    fn compute_commit(&self, word_start: usize, word_end: usize) -> (i64, i64, String) {
        let raw_start = self.words[word_start].start_ms;
        let start_ms = raw_start.max(self.last_end_ms + 1);
        let raw_end = self.words[word_end - 1].end_ms;
        let mut end_ms = raw_end.max(start_ms);
        if end_ms - start_ms < self.config.min_match_ms {
            end_ms = start_ms + self.config.min_match_ms;
        }
        let audio_file = self.dominant_src(word_start, word_end, start_ms, end_ms);
        (start_ms, end_ms, audio_file)
    }

    /// Compute what `commit_matched` would produce for `located`, without
    /// mutating any state. Used by recovery to learn an anchor's start
    /// time before interpolating the gap that precedes it.
    pub(crate) fn peek_commit(&self, _idx: usize, located: Located) -> (i64, i64, String) {
        self.compute_commit(located.word_start, located.word_end)
    }

    /// Commit a located match: compute timing, attribute source, advance
    /// `last_start_ms`/`last_end_ms`, and record the result. Returns the
    /// committed `(start_ms, end_ms, audio_file)`.
    pub(crate) fn commit_matched(
        &mut self,
        idx: usize,
        word_start: usize,
        word_end: usize,
    ) -> (i64, i64, String) {
        let (start_ms, end_ms, audio_file) = self.compute_commit(word_start, word_end);
        self.results[idx] = AlignedSlot {
            start_ms: Some(start_ms),
            end_ms: Some(end_ms),
            audio_file: Some(audio_file.clone()),
        };
        self.last_start_ms = start_ms;
        self.last_end_ms = end_ms;
        (start_ms, end_ms, audio_file)
    }

    /// Force `sent_idx` forward to `idx` (used after a recovery pass
    /// commits a contiguous run of sentences via `commit_interpolated`).
    pub(crate) fn advance_sent_idx_to(&mut self, idx: usize) {
        if idx > self.sent_idx {
            self.sent_idx = idx;
        }
    }

    /// The configured minimum committed span length in milliseconds.
    pub(crate) fn min_match_ms(&self) -> i64 {
        self.config.min_match_ms
    }

    /// The currently forced source audio file name, if set.
    pub(crate) fn forced_src_hint(&self) -> Option<String> {
        self.forced_src.clone()
    }

    /// Commit interpolated (recovery-derived) timing for a sentence that
    /// was not matched directly against ASR output.
    pub(crate) fn commit_interpolated(
        &mut self,
        idx: usize,
        start_ms: i64,
        end_ms: i64,
        audio_file: String,
    ) {
        self.results[idx] = AlignedSlot {
            start_ms: Some(start_ms),
            end_ms: Some(end_ms),
            audio_file: Some(audio_file),
        };
        self.last_start_ms = start_ms;
        self.last_end_ms = end_ms;
        if idx == self.sent_idx {
            self.sent_idx += 1;
        }
    }

    /// Attribute the winning audio source for the committed interval
    /// `[start_ms, end_ms]`: maximize cumulative overlap duration across
    /// the matched word range; fall back to the word crossing `start_ms`,
    /// then to majority by word count. `forced_src`, if set, always wins.
    fn dominant_src(&self, word_start: usize, word_end: usize, start_ms: i64, end_ms: i64) -> String {
        if let Some(forced) = &self.forced_src {
            return forced.clone();
        }

        let mut overlap: std::collections::HashMap<&str, i64> = std::collections::HashMap::new();
        for w_idx in word_start..word_end.min(self.words.len()) {
            let w = &self.words[w_idx];
            let inter = (w.end_ms.min(end_ms) - w.start_ms.max(start_ms)).max(0);
            *overlap.entry(self.word_srcs[w_idx].as_str()).or_insert(0) += inter;
        }
        if let Some((src, _)) = overlap.iter().max_by_key(|(_, dur)| **dur) {
            return src.to_string();
        }

        for w_idx in word_start..word_end.min(self.words.len()) {
            let w = &self.words[w_idx];
            if w.start_ms <= start_ms && start_ms <= w.end_ms {
                return self.word_srcs[w_idx].clone();
            }
        }

        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for w_idx in word_start..word_end.min(self.words.len()) {
            *counts.entry(self.word_srcs[w_idx].as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .max_by_key(|(_, c)| *c)
            .map(|(s, _)| s.to_string())
            .unwrap_or_default()
    }
}

fn normalize_word(text: &str) -> String {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn window_sizes(l: usize, aggressive: bool, cap: usize) -> Vec<usize> {
    let base: Vec<usize> = vec![
        l,
        ((l as f64) * 0.8).ceil() as usize,
        ((l as f64) * 1.2).ceil() as usize,
    ];
    let expansions: &[f64] = if aggressive {
        &[0.6, 0.8, 1.0, 1.3, 1.6, 2.0, 2.5]
    } else {
        &[1.0, 1.3, 1.6, 2.0]
    };

    let mut sizes: Vec<usize> = Vec::new();
    for &b in &base {
        for &e in expansions {
            let size = ((b as f64) * e).round() as usize;
            let size = size.max(1).min(cap);
            if !sizes.contains(&size) {
                sizes.push(size);
            }
        }
    }
    sizes.sort_unstable();
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sentence::Sentence;

    fn word(text: &str, start_ms: i64, end_ms: i64) -> Word {
        Word {
            text: text.to_string(),
            start_ms,
            end_ms,
        }
    }

    fn sentences(texts: &[&str]) -> Vec<Sentence> {
        texts
            .iter()
            .map(|t| Sentence::from_visible(t.to_string()))
            .collect()
    }

    #[test]
    fn s1_exact_match_single_file() {
        let mut aligner = Aligner::new(
            sentences(&["Hello world.", "Goodbye now."]),
            AlignerConfig::default(),
        );
        aligner.set_forced_src(Some("a.wav".to_string()));
        let words = vec![
            word("hello", 0, 500),
            word("world", 500, 1000),
            word("goodbye", 1200, 1700),
            word("now", 1700, 2100),
        ];
        let committed = aligner.extend_words_and_align(words, "a.wav");
        assert_eq!(committed, 2);

        let results = aligner.results();
        assert_eq!(results[0].audio_file.as_deref(), Some("a.wav"));
        assert_eq!(results[0].start_ms, Some(0));
        assert_eq!(results[0].end_ms, Some(1000));
        assert_eq!(results[1].start_ms, Some(1200));
        assert_eq!(results[1].end_ms, Some(2100));
    }

    #[test]
    fn s5_monotonicity_under_overlap() {
        let mut aligner = Aligner::new(
            sentences(&["First sentence here.", "Second sentence follows."]),
            AlignerConfig::default(),
        );
        aligner.set_forced_src(Some("a.wav".to_string()));
        let words = vec![
            word("first", 0, 600),
            word("sentence", 400, 900),
            word("here", 800, 1100),
            word("second", 1050, 1500),
            word("sentence", 1400, 1900),
            word("follows", 1850, 2200),
        ];
        aligner.extend_words_and_align(words, "a.wav");
        let results = aligner.results();
        if let (Some(end0), Some(start1)) = (results[0].end_ms, results[1].start_ms) {
            assert!(start1 >= end0 + 1);
        }
    }

    #[test]
    fn window_sizes_are_capped() {
        let sizes = window_sizes(10, false, 16);
        assert!(sizes.iter().all(|&s| s <= 16));
    }

    #[test]
    fn no_match_below_cursor_returns_none_without_words() {
        let aligner = Aligner::new(sentences(&["Only sentence."]), AlignerConfig::default());
        assert!(aligner.locate_match(0, false).is_none());
    }
}
