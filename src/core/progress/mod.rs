//! Crash-safe resumable JSON progress store.
//!
//! Writes two files per transcript: `<name>.json` (full items, every
//! sentence of the stream, aligned or not) and `<name>Progress.json` (a
//! meta-only sidecar written just as often, for cheap status reads).
//! Replaces are atomic (write-to-`.tmp`-then-rename) with a bounded retry
//! ladder on contention.

use crate::config::ProgressConfig;
use crate::core::align::AlignedSlot;
use crate::core::sentence::Sentence;
use crate::error::AlignError;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level progress payload: ambient metadata plus every sentence of the
/// stream, aligned or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Ambient run metadata.
    pub meta: ProgressMeta,
    /// One entry per sentence of the stream, in stream order.
    pub items: Vec<ProgressItem>,
}

/// Ambient metadata describing the run as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMeta {
    /// `"ok"` while running/complete successfully, `"error"` on a fatal stall.
    pub status: String,
    /// Per-audio processing ledger: `[name, attempt_seconds, cumulative_seconds]`.
    #[serde(default)]
    pub processed_audio: Vec<(String, f64, f64)>,
    /// Audio file name that triggered an alignment stall, if any.
    #[serde(default)]
    pub problem_audio: Option<String>,
    /// Text the aligner could not match when it stalled, if any.
    #[serde(default)]
    pub unrecognized_text: Option<String>,
    /// Forced/detected ASR language, recorded for downstream consumers.
    #[serde(default)]
    pub language: Option<String>,
    /// Structured-ordering mode used for this run.
    pub mode: String,
}

impl Default for ProgressMeta {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            processed_audio: Vec::new(),
            problem_audio: None,
            unrecognized_text: None,
            language: None,
            mode: "default".to_string(),
        }
    }
}

/// One sentence's committed (or still-pending) alignment result plus its
/// text and structured-mode metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressItem {
    /// Index of this sentence in the stream.
    pub idx: usize,
    /// Sanitized visible text.
    pub text: String,
    /// Normalized (lowercased/folded) text.
    pub normalized: String,
    /// Tokens, serialized compactly on a single line.
    pub tokens: Box<RawValue>,
    /// Committed start time in milliseconds, `null` if unaligned.
    pub start_ms: Option<i64>,
    /// Committed end time in milliseconds, `null` if unaligned.
    pub end_ms: Option<i64>,
    /// Attributed audio file, `null` if unaligned.
    pub audio_file: Option<String>,
    /// Index of the sentence this placeholder was merged into, if any.
    #[serde(default, rename = "merged_with")]
    pub merged_with: Option<usize>,
    /// Pre-merge text, if this sentence absorbed a suffix attachment.
    #[serde(default, rename = "preMergedText")]
    pub pre_merged_text: Option<String>,
    /// Structured-mode display order.
    #[serde(default)]
    pub order: Option<i64>,
    /// Structured-mode suborder.
    #[serde(default)]
    pub suborder: Option<usize>,
    /// Default-mode chunk index.
    #[serde(default)]
    pub chunk: Option<usize>,
}

impl ProgressItem {
    /// Build a progress item from a sentence and its current alignment slot.
    pub fn from_sentence(idx: usize, sentence: &Sentence, slot: &AlignedSlot) -> Self {
        let tokens_json =
            serde_json::to_string(&sentence.tokens).unwrap_or_else(|_| "[]".to_string());
        Self {
            idx,
            text: sentence.text_visible.clone(),
            normalized: sentence.text_normalized.clone(),
            tokens: RawValue::from_string(tokens_json).unwrap_or_else(|_| {
                RawValue::from_string("[]".to_string()).expect("literal is valid JSON")
            }),
            start_ms: slot.start_ms,
            end_ms: slot.end_ms,
            audio_file: slot.audio_file.clone(),
            merged_with: sentence.meta.merged_into,
            pre_merged_text: sentence.meta.pre_merged_text.clone(),
            order: sentence.meta.order,
            suborder: sentence.meta.suborder,
            chunk: sentence.meta.chunk,
        }
    }
}

/// State recovered from a prior run, ready to seed a fresh `Aligner`.
pub struct ResumeState {
    /// Replayed alignment results, one per sentence of the (unchanged) stream.
    pub results: Vec<AlignedSlot>,
    /// `last_end_ms` to restore into the aligner.
    pub last_end_ms: i64,
    /// Sanitized processed-audio ledger.
    pub processed_audio: Vec<(String, f64, f64)>,
    /// The audio file that was rewound (cleared and will be re-run), if any.
    pub rewound_file: Option<String>,
}

/// Atomic JSON progress writer/reader with sidecar meta file.
pub struct ProgressStore {
    output_path: PathBuf,
    sidecar_path: PathBuf,
    config: ProgressConfig,
}

impl ProgressStore {
    /// Build a progress store for `output_path`; the sidecar path is
    /// derived as `<stem>Progress.<ext>`.
    pub fn new(output_path: PathBuf, config: ProgressConfig) -> Self {
        let sidecar_path = derive_sidecar_path(&output_path);
        Self {
            output_path,
            sidecar_path,
            config,
        }
    }

    /// Path to the full transcript JSON.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Write the full payload to `<name>.json` and the meta-only sidecar
    /// to `<name>Progress.json`, both via atomic replace.
    pub fn save(&self, payload: &ProgressPayload) -> crate::Result<()> {
        let full_json = serde_json::to_string_pretty(payload)?;
        atomic_write(&self.output_path, full_json.as_bytes(), &self.config)?;

        let meta_json = serde_json::to_string_pretty(&payload.meta)?;
        atomic_write(&self.sidecar_path, meta_json.as_bytes(), &self.config)?;
        Ok(())
    }

    /// Load the full payload from disk, if it exists.
    pub fn load(&self) -> crate::Result<Option<ProgressPayload>> {
        if !self.output_path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.output_path)?;
        let payload: ProgressPayload = serde_json::from_str(&data)?;
        Ok(Some(payload))
    }

    /// Replay a previously saved payload against the (unchanged) sentence
    /// stream: pre-load committed tuples up to the first divergence, then
    /// rewind the last processed-audio ledger entry so its file is re-run.
    pub fn resume(&self, sentences: &[Sentence]) -> crate::Result<Option<ResumeState>> {
        let Some(payload) = self.load()? else {
            return Ok(None);
        };

        let mut results = vec![AlignedSlot::default(); sentences.len()];
        let mut replay_boundary = 0usize;
        for (i, item) in payload.items.iter().enumerate() {
            if i >= sentences.len() || item.text != sentences[i].text_visible || item.start_ms.is_none() {
                break;
            }
            results[i] = AlignedSlot {
                start_ms: item.start_ms,
                end_ms: item.end_ms,
                audio_file: item.audio_file.clone(),
            };
            replay_boundary = i + 1;
        }

        let committed_files: std::collections::HashSet<&str> = results[..replay_boundary]
            .iter()
            .filter_map(|r| r.audio_file.as_deref())
            .collect();
        let mut processed_audio: Vec<(String, f64, f64)> = payload
            .meta
            .processed_audio
            .into_iter()
            .filter(|(name, _, _)| committed_files.contains(name.as_str()))
            .collect();

        let rewound_file = processed_audio.last().map(|(name, _, _)| name.clone());
        if let Some(ref file) = rewound_file {
            let rewind_from = results[..replay_boundary]
                .iter()
                .position(|r| r.audio_file.as_deref() == Some(file.as_str()))
                .unwrap_or(replay_boundary);
            for slot in &mut results[rewind_from..replay_boundary] {
                *slot = AlignedSlot::default();
            }
            replay_boundary = rewind_from;
            processed_audio.pop();
        }

        let last_end_ms = results[..replay_boundary]
            .iter()
            .rev()
            .find_map(|r| r.end_ms)
            .unwrap_or(-1);

        Ok(Some(ResumeState {
            results,
            last_end_ms,
            processed_audio,
            rewound_file,
        }))
    }
}

fn derive_sidecar_path(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "transcript".to_string());
    let ext = output_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "json".to_string());
    output_path.with_file_name(format!("{stem}Progress.{ext}"))
}

fn atomic_write(target: &Path, contents: &[u8], config: &ProgressConfig) -> crate::Result<()> {
    let tmp_path = target.with_extension(match target.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });

    std::fs::write(&tmp_path, contents)?;

    let mut attempt = 0u32;
    loop {
        match std::fs::rename(&tmp_path, target) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < config.max_retries && is_retryable(&e) => {
                attempt += 1;
                let backoff = (config.base_sleep_ms.saturating_mul(attempt as u64))
                    .min(config.max_sleep_ms);
                std::thread::sleep(Duration::from_millis(backoff));
            }
            Err(e) => {
                return Err(AlignError::progress_store(format!(
                    "atomic rename of {:?} to {:?} failed after {} attempts: {}",
                    tmp_path, target, attempt, e
                )));
            }
        }
    }
}

#[cfg(windows)]
fn is_retryable(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(5) | Some(32))
}

#[cfg(not(windows))]
fn is_retryable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sentence::Sentence;

    fn payload_with_items(items: Vec<ProgressItem>) -> ProgressPayload {
        ProgressPayload {
            meta: ProgressMeta::default(),
            items,
        }
    }

    #[test]
    fn derives_sidecar_path_alongside_stem() {
        let out = PathBuf::from("/tmp/out/transcript.json");
        assert_eq!(
            derive_sidecar_path(&out),
            PathBuf::from("/tmp/out/transcriptProgress.json")
        );
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.json");
        let store = ProgressStore::new(out.clone(), ProgressConfig::default());

        let sentence = Sentence::from_visible("Hello world.".to_string());
        let slot = AlignedSlot {
            start_ms: Some(0),
            end_ms: Some(1000),
            audio_file: Some("a.wav".to_string()),
        };
        let item = ProgressItem::from_sentence(0, &sentence, &slot);
        store.save(&payload_with_items(vec![item])).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].start_ms, Some(0));
        assert!(out.exists());
        assert!(derive_sidecar_path(&out).exists());
    }

    #[test]
    fn resume_replays_committed_prefix_and_rewinds_last_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.json");
        let store = ProgressStore::new(out, ProgressConfig::default());

        let sentences = vec![
            Sentence::from_visible("First sentence.".to_string()),
            Sentence::from_visible("Second sentence.".to_string()),
        ];
        let slot0 = AlignedSlot {
            start_ms: Some(0),
            end_ms: Some(900),
            audio_file: Some("a.wav".to_string()),
        };
        let slot1 = AlignedSlot {
            start_ms: Some(1000),
            end_ms: Some(1900),
            audio_file: Some("b.wav".to_string()),
        };
        let mut meta = ProgressMeta::default();
        meta.processed_audio = vec![
            ("a.wav".to_string(), 1.0, 1.0),
            ("b.wav".to_string(), 2.0, 2.0),
        ];
        let payload = ProgressPayload {
            meta,
            items: vec![
                ProgressItem::from_sentence(0, &sentences[0], &slot0),
                ProgressItem::from_sentence(1, &sentences[1], &slot1),
            ],
        };
        store.save(&payload).unwrap();

        let resumed = store.resume(&sentences).unwrap().unwrap();
        assert_eq!(resumed.rewound_file.as_deref(), Some("b.wav"));
        assert!(resumed.results[0].start_ms.is_some());
        assert!(resumed.results[1].start_ms.is_none());
        assert_eq!(resumed.last_end_ms, 900);
        assert_eq!(resumed.processed_audio, vec![("a.wav".to_string(), 1.0, 1.0)]);
    }
}
