//! Recovery: invoked by the Orchestrator when a file's chunk is expected to
//! produce more sentences but the Aligner stalled. Tries anchor recovery
//! first, then falls back to weighted approximation.

use crate::config::RecoveryConfig;
use crate::core::align::Aligner;
use log::warn;

/// Outcome of a recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Progress was made: at least one sentence was committed.
    Progressed,
    /// Recovery could not advance the aligner at all.
    Exhausted,
}

/// Try anchor recovery: search the aggressive matcher over the next
/// `anchor_search_span` sentences (bounded by the chunk's `stop_idx`); on
/// the first hit, interpolate the gap sentences by character weight and
/// commit the anchor using its ASR timing.
pub fn anchor_recovery(
    aligner: &mut Aligner,
    stop_idx: usize,
    file_end_ms: i64,
    config: &RecoveryConfig,
) -> RecoveryOutcome {
    let sent_idx = aligner.sent_idx();
    let search_end = stop_idx.min(sent_idx + config.anchor_search_span).min(aligner.len_sentences());
    if sent_idx + 1 >= search_end {
        return RecoveryOutcome::Exhausted;
    }

    for anchor_idx in (sent_idx + 1)..search_end {
        if let Some(located) = aligner.locate_match(anchor_idx, true) {
            let anchor_start_ms = {
                // Peek the anchor's start time without mutating state yet.
                let (start_ms, _, _) = aligner.peek_commit(anchor_idx, located);
                start_ms
            };

            interpolate_gap(aligner, sent_idx, anchor_idx, anchor_start_ms, file_end_ms);
            aligner.commit_matched(anchor_idx, located.word_start, located.word_end);
            aligner.advance_sent_idx_to(anchor_idx + 1);
            return RecoveryOutcome::Progressed;
        }
    }
    RecoveryOutcome::Exhausted
}

/// Distribute the remaining audio-file duration across the remaining
/// sentences of the chunk proportionally to character length, flooring
/// each span at `min_match_ms` and fixing rounding drift on the last
/// sentence so its `end_ms` equals exactly `file_end_ms`.
pub fn weighted_approximation(
    aligner: &mut Aligner,
    stop_idx: usize,
    file_end_ms: i64,
    audio_file: &str,
    min_match_ms: i64,
    recovery_config: &RecoveryConfig,
    historical_ms_per_char: Option<f64>,
) -> RecoveryOutcome {
    let sent_idx = aligner.sent_idx();
    let end = stop_idx.min(aligner.len_sentences());
    if sent_idx >= end {
        return RecoveryOutcome::Exhausted;
    }

    let lens: Vec<usize> = (sent_idx..end)
        .map(|i| aligner.sentences()[i].char_len().max(1))
        .collect();
    let total_chars: usize = lens.iter().sum();
    let available = (file_end_ms - (aligner.last_end_ms() + 1)).max(min_match_ms * lens.len() as i64);

    if let Some(avg) = historical_ms_per_char {
        let expected = avg * total_chars as f64;
        let actual = available as f64;
        if expected > 0.0 {
            let deviation = (actual - expected).abs() / expected;
            if deviation > recovery_config.duration_deviation_warn_pct {
                warn!(
                    "weighted approximation duration deviates {:.0}% from historical ms/char average",
                    deviation * 100.0
                );
            }
        }
    }

    let mut cursor_ms = aligner.last_end_ms() + 1;
    let n = lens.len();
    for (offset, &len) in lens.iter().enumerate() {
        let idx = sent_idx + offset;
        let is_last = offset + 1 == n;
        let span = if is_last {
            (file_end_ms - cursor_ms).max(min_match_ms)
        } else {
            ((available as f64) * (len as f64) / (total_chars as f64))
                .round()
                .max(min_match_ms as f64) as i64
        };
        let start_ms = cursor_ms;
        let end_ms = if is_last {
            file_end_ms.max(start_ms + min_match_ms)
        } else {
            start_ms + span
        };
        aligner.commit_interpolated(idx, start_ms, end_ms, audio_file.to_string());
        cursor_ms = end_ms + 1;
    }
    aligner.advance_sent_idx_to(end);
    RecoveryOutcome::Progressed
}

fn interpolate_gap(
    aligner: &mut Aligner,
    gap_start: usize,
    anchor_idx: usize,
    anchor_start_ms: i64,
    file_end_ms: i64,
) {
    if gap_start >= anchor_idx {
        return;
    }
    let lens: Vec<usize> = (gap_start..anchor_idx)
        .map(|i| aligner.sentences()[i].char_len().max(1))
        .collect();
    let total_chars: usize = lens.iter().sum();
    let gap_start_ms = aligner.last_end_ms() + 1;
    let available = (anchor_start_ms - gap_start_ms).max(0);
    let min_match_ms = aligner.min_match_ms();

    let mut cursor_ms = gap_start_ms;
    let n = lens.len();
    for (offset, &len) in lens.iter().enumerate() {
        let idx = gap_start + offset;
        let is_last = offset + 1 == n;
        let span = if total_chars == 0 {
            min_match_ms
        } else {
            ((available as f64) * (len as f64) / (total_chars as f64))
                .round()
                .max(min_match_ms as f64) as i64
        };
        let start_ms = cursor_ms;
        let end_ms = if is_last {
            anchor_start_ms.max(start_ms + min_match_ms).min(file_end_ms.max(start_ms + min_match_ms))
        } else {
            start_ms + span
        };
        aligner.commit_interpolated(idx, start_ms, end_ms, audio_file_hint(aligner));
        cursor_ms = end_ms + 1;
    }
}

fn audio_file_hint(aligner: &Aligner) -> String {
    aligner
        .forced_src_hint()
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlignerConfig;
    use crate::core::align::Word;
    use crate::core::sentence::Sentence;

    fn sentences(texts: &[&str]) -> Vec<Sentence> {
        texts
            .iter()
            .map(|t| Sentence::from_visible(t.to_string()))
            .collect()
    }

    #[test]
    fn s2_missing_middle_anchor_recovery() {
        let mut aligner = Aligner::new(
            sentences(&[
                "The first sentence appears here.",
                "A completely unheard middle sentence.",
                "The third sentence closes things.",
            ]),
            AlignerConfig::default(),
        );
        aligner.set_forced_src(Some("a.wav".to_string()));
        aligner.set_stop_idx(Some(3));

        let words = vec![
            crate::core::align::Word {
                text: "the".into(),
                start_ms: 0,
                end_ms: 200,
            },
            Word {
                text: "first".into(),
                start_ms: 200,
                end_ms: 600,
            },
            Word {
                text: "sentence".into(),
                start_ms: 600,
                end_ms: 1100,
            },
            Word {
                text: "appears".into(),
                start_ms: 1100,
                end_ms: 1500,
            },
            Word {
                text: "here".into(),
                start_ms: 1500,
                end_ms: 1800,
            },
            Word {
                text: "the".into(),
                start_ms: 4000,
                end_ms: 4200,
            },
            Word {
                text: "third".into(),
                start_ms: 4200,
                end_ms: 4600,
            },
            Word {
                text: "sentence".into(),
                start_ms: 4600,
                end_ms: 5100,
            },
            Word {
                text: "closes".into(),
                start_ms: 5100,
                end_ms: 5500,
            },
            Word {
                text: "things".into(),
                start_ms: 5500,
                end_ms: 6000,
            },
        ];
        aligner.extend_words_and_align(words, "a.wav");
        assert_eq!(aligner.sent_idx(), 1);

        let outcome = anchor_recovery(&mut aligner, 3, 6000, &crate::config::RecoveryConfig::default());
        assert_eq!(outcome, RecoveryOutcome::Progressed);
        assert_eq!(aligner.sent_idx(), 3);

        let results = aligner.results();
        assert!(results[1].start_ms.is_some());
        assert!(results[1].end_ms.unwrap() >= results[1].start_ms.unwrap() + 200);
        assert!(results[2].start_ms.is_some());
    }

    #[test]
    fn s3_total_asr_failure_weighted_approximation() {
        let mut aligner = Aligner::new(
            sentences(&[
                "Sentence number one here.",
                "Sentence number two here.",
                "Sentence number three here.",
                "Sentence number four here.",
            ]),
            AlignerConfig::default(),
        );
        aligner.set_forced_src(Some("b.wav".to_string()));
        aligner.set_stop_idx(Some(4));

        let outcome = weighted_approximation(
            &mut aligner,
            4,
            4000,
            "b.wav",
            200,
            &crate::config::RecoveryConfig::default(),
            None,
        );
        assert_eq!(outcome, RecoveryOutcome::Progressed);
        let results = aligner.results();
        assert_eq!(results[0].start_ms, Some(0));
        assert_eq!(results[3].end_ms, Some(4000));
        for r in results {
            assert_eq!(r.audio_file.as_deref(), Some("b.wav"));
        }
    }
}
