//! The Orchestrator: drives ASR for each audio clip in order, feeds words
//! into the Aligner, enforces per-file chunk boundaries, invokes recovery,
//! and finalizes the run by saving the progress store and printing the
//! terminal `true`/`false` status line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::{Config, ConfigService, Mode};
use crate::core::align::{Aligner, Word};
use crate::core::chunker::{
    assign_structured_order, build_sentences_from_parts, gather_structured_parts, sanitize_and_chunk,
};
use crate::core::progress::{ProgressItem, ProgressMeta, ProgressPayload, ProgressStore};
use crate::core::recovery::{anchor_recovery, weighted_approximation, RecoveryOutcome};
use crate::core::sentence::{build_sentences, Sentence, SentenceBuilderConfig};
use crate::error::AlignError;
use crate::services::asr::{AsrProvider, WhisperHttpProvider};
use crate::services::discovery::{discover_audio_files, discover_text_blocks};
use crate::services::duration::{DurationProbe, SymphoniaDurationProbe};
use crate::services::vram::{wait_for_vram, NoopVramGate, VramGate};
use crate::cli::AlignArgs;

/// Execute the `align` subcommand against production collaborators: a
/// Whisper-family HTTP ASR provider, a `symphonia` duration probe, and a
/// no-op VRAM gate (admission only ever blocks when `min_free_vram_gb` is
/// configured, and no concrete GPU query binding is part of this crate's
/// dependency stack).
pub async fn execute(args: AlignArgs, config_service: &dyn ConfigService) -> crate::Result<()> {
    let config = build_run_config(&args, config_service.get_config()?);
    let asr_provider: Arc<dyn AsrProvider> = Arc::new(WhisperHttpProvider::new(config.asr.clone())?);
    let duration_probe: Arc<dyn DurationProbe> = Arc::new(SymphoniaDurationProbe::new());
    let vram_gate: Arc<dyn VramGate> = Arc::new(NoopVramGate);
    run(args, config, asr_provider, duration_probe, vram_gate).await
}

/// Merge CLI overrides onto a base configuration loaded from disk/env.
fn build_run_config(args: &AlignArgs, mut config: Config) -> Config {
    config.general.mode = args.mode.into();
    if let Some(device) = &args.device {
        config.general.device = device.clone();
    }
    if let Some(language) = &args.language {
        config.general.language = Some(language.clone());
    }
    if let Some(path) = &args.text_parts_path {
        config.general.text_parts_path = Some(path.clone());
    }
    if let Some(limit) = args.chunk_limit {
        config.chunker.chunk_limit = limit;
    }
    if let Some(chars) = args.min_index_chars {
        config.sentence.min_chars = chars;
    }
    if let Some(tokens) = args.min_index_tokens {
        config.sentence.min_tokens = tokens;
    }
    if let Some(workers) = args.asr_workers {
        config.orchestrator.asr_workers = workers;
    }
    if let Some(vram) = args.min_free_vram_gb {
        config.orchestrator.min_free_vram_gb = Some(vram);
    }
    if let Some(prompt) = &args.asr_prompt {
        config.orchestrator.asr_prompt = Some(prompt.clone());
    }
    if let Some(max_chars) = args.asr_prompt_max_chars {
        config.orchestrator.asr_prompt_max_chars = max_chars;
    }
    config
}

/// The sentence stream plus the per-audio-file chunk boundaries it was
/// built with, and (when available) the raw chunk texts used for ASR
/// prompting.
struct StreamBuild {
    sentences: Vec<Sentence>,
    chunk_ranges: Vec<(usize, usize)>,
    chunk_texts: Option<Vec<String>>,
}

/// Run the alignment engine with injected collaborators. Exposed separately
/// from [`execute`] so tests can drive the full orchestration loop against
/// deterministic test adapters.
pub async fn run(
    args: AlignArgs,
    config: Config,
    asr_provider: Arc<dyn AsrProvider>,
    duration_probe: Arc<dyn DurationProbe>,
    vram_gate: Arc<dyn VramGate>,
) -> crate::Result<()> {
    let audio_files = discover_audio_files(&args.audio_dir)?;
    if audio_files.is_empty() {
        return Err(AlignError::InvalidInput(
            "no audio files found in audio_dir".to_string(),
        ));
    }

    let stream = build_stream(&args, &config, audio_files.len()).await?;
    if stream.sentences.is_empty() {
        return Err(AlignError::InvalidInput(
            "text corpus produced an empty sentence stream".to_string(),
        ));
    }

    let progress_store = ProgressStore::new(args.output.clone(), config.progress.clone());
    let resume_state = if args.resume {
        progress_store.resume(&stream.sentences)?
    } else {
        None
    };

    let mut aligner = Aligner::new(stream.sentences, config.aligner.clone());
    let mut processed_audio: Vec<(String, f64, f64)> = Vec::new();
    let mut skip_names: HashSet<String> = HashSet::new();
    let mut running_offset_ms: i64 = 0;

    if let Some(resumed) = resume_state {
        processed_audio = resumed.processed_audio;
        skip_names = processed_audio.iter().map(|(name, _, _)| name.clone()).collect();
        aligner.restore(resumed.results, resumed.last_end_ms);
    }

    // Step 1 of the orchestrator loop: advance past files already committed
    // on resume, recovering the global timeline offset from their real
    // duration (the processed ledger records ASR wall-clock time, not audio
    // duration, so the offset is re-derived by re-probing).
    for path in &audio_files {
        let name = file_name(path);
        if !skip_names.contains(&name) {
            break;
        }
        let duration = duration_probe.duration_sec(path).await?;
        running_offset_ms += seconds_to_ms(duration);
    }

    let mut meta = ProgressMeta {
        mode: config.general.mode.to_string(),
        language: config.general.language.clone(),
        processed_audio: processed_audio.clone(),
        ..ProgressMeta::default()
    };

    let pending: Vec<(usize, PathBuf)> = audio_files
        .iter()
        .enumerate()
        .filter(|(_, path)| !skip_names.contains(&file_name(path)))
        .map(|(idx, path)| (idx, path.clone()))
        .collect();

    let semaphore = Arc::new(Semaphore::new(config.orchestrator.asr_workers.max(1)));
    let mut handles = Vec::with_capacity(pending.len());
    for (file_idx, path) in &pending {
        let prompt = build_prompt(&config, &stream.chunk_texts, audio_files.len(), *file_idx);
        let semaphore = semaphore.clone();
        let asr_provider = asr_provider.clone();
        let vram_gate = vram_gate.clone();
        let device = config.general.device.clone();
        let language = config.general.language.clone();
        let min_free_vram_gb = config.orchestrator.min_free_vram_gb;
        let poll_interval_ms = config.orchestrator.vram_poll_interval_ms;
        let timeout_secs = config.orchestrator.vram_timeout_secs;
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            wait_for_vram(vram_gate.as_ref(), min_free_vram_gb, poll_interval_ms, timeout_secs).await;
            let result = asr_provider
                .transcribe_words(&path, &device, language.as_deref(), prompt.as_deref())
                .await;
            vram_gate.release().await;
            result
        }));
    }

    // Results are consumed strictly in audio-file order even though the
    // ASR calls above may have overlapped across the bounded worker pool.
    for ((file_idx, path), handle) in pending.into_iter().zip(handles.into_iter()) {
        let asr_result = tokio::select! {
            res = handle => res.map_err(|e| AlignError::asr(format!("ASR task panicked: {e}")))??,
            _ = tokio::signal::ctrl_c() => {
                meta.status = "error".to_string();
                save_progress(&progress_store, &aligner, &meta)?;
                println!("false");
                return Err(AlignError::Interrupted(
                    "cancelled while waiting for ASR transcription".to_string(),
                ));
            }
        };

        let duration_sec = if asr_result.duration_sec > 0.0 {
            asr_result.duration_sec
        } else {
            duration_probe.duration_sec(&path).await?
        };
        if let Some(lang) = &asr_result.language {
            meta.language.get_or_insert_with(|| lang.clone());
        }

        let name = file_name(&path);
        let file_start_ms = running_offset_ms;
        let file_end_ms = running_offset_ms + seconds_to_ms(duration_sec);

        let words: Vec<Word> = asr_result
            .words
            .into_iter()
            .map(|w| Word {
                text: w.text,
                start_ms: file_start_ms + seconds_to_ms(w.start_sec),
                end_ms: file_start_ms + seconds_to_ms(w.end_sec),
            })
            .collect();

        let stop_idx = stop_idx_for_file(file_idx, &stream.chunk_ranges, aligner.len_sentences());
        let sent_idx_before = aligner.sent_idx();

        aligner.set_forced_src(Some(name.clone()));
        aligner.set_stop_idx(Some(stop_idx));
        aligner.extend_words_and_align(words, &name);

        if let Err(err) = drive_recovery(&mut aligner, stop_idx, file_end_ms, &name, &config) {
            meta.status = "error".to_string();
            meta.problem_audio = Some(name.clone());
            meta.unrecognized_text = aligner
                .sentences()
                .get(aligner.sent_idx())
                .map(|s| s.text_visible.clone());
            save_progress(&progress_store, &aligner, &meta)?;
            println!("false");
            return Err(err);
        }

        aligner.set_forced_src(None);
        aligner.set_stop_idx(None);
        running_offset_ms = file_end_ms;

        if aligner.sent_idx() > sent_idx_before {
            let cumulative = processed_audio
                .iter()
                .filter(|(n, _, _)| n == &name)
                .map(|(_, _, cumulative)| *cumulative)
                .last()
                .unwrap_or(0.0)
                + duration_sec;
            processed_audio.push((name.clone(), duration_sec, cumulative));
            meta.processed_audio = processed_audio.clone();
        }

        save_progress(&progress_store, &aligner, &meta)?;
    }

    if aligner.sent_idx() < aligner.len_sentences() {
        meta.status = "error".to_string();
        save_progress(&progress_store, &aligner, &meta)?;
        println!("false");
        return Err(AlignError::alignment_stalled(
            aligner.sent_idx(),
            "sentences remained unaligned after every audio file was processed",
        ));
    }

    meta.status = "ok".to_string();
    save_progress(&progress_store, &aligner, &meta)?;
    println!("true");
    Ok(())
}

/// While the current audio file's chunk still expects more sentences and
/// the audio itself still has unmatched content, try anchor recovery, then
/// weighted approximation. Returns an error (the orchestrator's sole fatal
/// outcome) only if neither can make progress.
fn drive_recovery(
    aligner: &mut Aligner,
    stop_idx: usize,
    file_end_ms: i64,
    name: &str,
    config: &Config,
) -> crate::Result<()> {
    let margin = config.orchestrator.chunk_underflow_margin_ms;
    loop {
        let underflow = aligner.last_end_ms() + margin < aligner.last_word_end_ms();
        if aligner.sent_idx() >= stop_idx || !underflow {
            return Ok(());
        }

        if anchor_recovery(aligner, stop_idx, file_end_ms, &config.recovery) == RecoveryOutcome::Progressed
        {
            continue;
        }

        let historical = historical_ms_per_char(aligner);
        let outcome = weighted_approximation(
            aligner,
            stop_idx,
            file_end_ms,
            name,
            config.aligner.min_match_ms,
            &config.recovery,
            historical,
        );
        if outcome != RecoveryOutcome::Progressed {
            return Err(AlignError::alignment_stalled(
                aligner.sent_idx(),
                format!("anchor recovery and weighted approximation both exhausted on {name}"),
            ));
        }
        return Ok(());
    }
}

/// Average committed milliseconds per visible character across the stream
/// so far, used by weighted approximation's deviation warning.
fn historical_ms_per_char(aligner: &Aligner) -> Option<f64> {
    let mut total_ms: i64 = 0;
    let mut total_chars: usize = 0;
    for (sentence, slot) in aligner.sentences().iter().zip(aligner.results().iter()) {
        if let (Some(start), Some(end)) = (slot.start_ms, slot.end_ms) {
            if end > start {
                total_ms += end - start;
                total_chars += sentence.char_len().max(1);
            }
        }
    }
    if total_chars == 0 {
        None
    } else {
        Some(total_ms as f64 / total_chars as f64)
    }
}

/// Build the progress items for every sentence of the stream, patching
/// placeholder sentences that have no committed timing of their own to
/// inherit `start_ms == end_ms ==` the previous committed `end_ms` and the
/// previous committed `audio_file` (invariant 3 / testable property 3),
/// then save.
fn save_progress(store: &ProgressStore, aligner: &Aligner, meta: &ProgressMeta) -> crate::Result<()> {
    let mut items = Vec::with_capacity(aligner.len_sentences());
    let mut last_end_ms: Option<i64> = None;
    let mut last_audio_file: Option<String> = None;

    for (idx, (sentence, slot)) in aligner.sentences().iter().zip(aligner.results().iter()).enumerate() {
        let mut slot = slot.clone();
        if slot.start_ms.is_none() && sentence.meta.placeholder {
            if let Some(end_ms) = last_end_ms {
                slot.start_ms = Some(end_ms);
                slot.end_ms = Some(end_ms);
                if slot.audio_file.is_none() {
                    slot.audio_file = last_audio_file.clone();
                }
            }
        }

        let item = ProgressItem::from_sentence(idx, sentence, &slot);
        if let Some(end_ms) = item.end_ms {
            last_end_ms = Some(end_ms);
        }
        if let Some(audio_file) = &item.audio_file {
            last_audio_file = Some(audio_file.clone());
        }
        items.push(item);
    }

    store.save(&ProgressPayload {
        meta: meta.clone(),
        items,
    })
}

fn stop_idx_for_file(file_idx: usize, chunk_ranges: &[(usize, usize)], total: usize) -> usize {
    if file_idx + 1 < chunk_ranges.len() {
        chunk_ranges[file_idx].1
    } else {
        total
    }
}

/// The per-file ASR initial prompt: the chunk text at `file_idx`, trimmed to
/// the configured character budget with bracketed tags stripped. Disabled
/// (returns `None`) whenever chunk count does not match audio file count,
/// since the prompt-to-file correspondence would otherwise be meaningless.
fn build_prompt(
    config: &Config,
    chunk_texts: &Option<Vec<String>>,
    audio_count: usize,
    file_idx: usize,
) -> Option<String> {
    let chunk_texts = chunk_texts.as_ref()?;
    if chunk_texts.len() != audio_count {
        return None;
    }
    let chunk_text = chunk_texts.get(file_idx)?;
    let stripped = crate::core::chunker::text_parts::strip_bracketed_tags(chunk_text);

    let mut prompt = String::new();
    if let Some(fixed) = &config.orchestrator.asr_prompt {
        prompt.push_str(fixed);
        prompt.push(' ');
    }
    prompt.push_str(&stripped);

    let max_chars = config.orchestrator.asr_prompt_max_chars;
    if prompt.chars().count() > max_chars {
        prompt = prompt.chars().take(max_chars).collect();
    }
    if prompt.trim().is_empty() {
        None
    } else {
        Some(prompt)
    }
}

/// Build the sentence stream and its chunk boundaries: pre-segmented parts
/// when `text_parts_path` is configured, otherwise the balanced chunker
/// over the discovered text corpus (with structured order assignment
/// layered on top in manga mode).
async fn build_stream(args: &AlignArgs, config: &Config, audio_count: usize) -> crate::Result<StreamBuild> {
    let sentence_cfg = SentenceBuilderConfig::from(&config.sentence);

    if let Some(source) = &config.general.text_parts_path {
        let client = reqwest::Client::new();
        let parts = crate::services::text_parts::load_text_parts(source, &client).await?;
        if parts.is_empty() {
            return Err(AlignError::InvalidInput(
                "text-parts source yielded no parts".to_string(),
            ));
        }
        let mut sentences = build_sentences_from_parts(&parts, config.sentence.min_chars);
        let chunk_ranges = assign_even_chunks(&mut sentences, audio_count.max(1));

        if config.general.mode == Mode::Manga {
            if let Some(script_path) = &args.structured_script {
                let structured_parts = load_structured_parts(script_path)?;
                assign_structured_order(&mut sentences, &structured_parts);
            }
        }

        return Ok(StreamBuild {
            sentences,
            chunk_ranges,
            chunk_texts: None,
        });
    }

    let blocks = load_corpus_blocks(args)?;
    if blocks.iter().all(|b| b.trim().is_empty()) {
        return Err(AlignError::InvalidInput("text corpus is empty".to_string()));
    }
    let corpus = blocks.join("\n\n");
    let limit = if config.chunker.chunk_limit == 0 {
        corpus.chars().count().max(1)
    } else {
        config.chunker.chunk_limit
    };
    let chunk_texts = sanitize_and_chunk(&corpus, limit);
    if chunk_texts.is_empty() {
        return Err(AlignError::InvalidInput(
            "balanced chunker produced no chunks".to_string(),
        ));
    }

    let mut sentences = Vec::new();
    let mut chunk_ranges = Vec::with_capacity(chunk_texts.len());
    for (idx, chunk_text) in chunk_texts.iter().enumerate() {
        let start = sentences.len();
        let mut chunk_sentences = build_sentences(std::slice::from_ref(chunk_text), &sentence_cfg);
        for sentence in &mut chunk_sentences {
            sentence.meta.chunk = Some(idx);
        }
        sentences.extend(chunk_sentences);
        chunk_ranges.push((start, sentences.len()));
    }

    if config.general.mode == Mode::Manga {
        let script_path = args.structured_script.as_ref().ok_or_else(|| {
            AlignError::InvalidInput("--structured-script is required in manga mode".to_string())
        })?;
        let structured_parts = load_structured_parts(script_path)?;
        assign_structured_order(&mut sentences, &structured_parts);
    }

    Ok(StreamBuild {
        sentences,
        chunk_ranges,
        chunk_texts: Some(chunk_texts),
    })
}

fn load_structured_parts(path: &Path) -> crate::Result<Vec<crate::core::chunker::StructuredPart>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AlignError::InvalidInput(format!("failed to read {path:?}: {e}")))?;
    let json: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(gather_structured_parts(&json))
}

fn load_corpus_blocks(args: &AlignArgs) -> crate::Result<Vec<String>> {
    if args.text_source.is_file() {
        let content = std::fs::read_to_string(&args.text_source).map_err(|e| {
            AlignError::InvalidInput(format!("failed to read {:?}: {e}", args.text_source))
        })?;
        Ok(vec![content])
    } else {
        discover_text_blocks(&args.text_source, None)
    }
}

/// Distribute a flat pre-segmented sentence stream evenly (by count) across
/// `buckets` chunks, tagging each sentence's `meta.chunk` and returning the
/// resulting ranges. Used for `text_parts_path` mode, where sentences arrive
/// already segmented rather than produced by the balanced chunker.
fn assign_even_chunks(sentences: &mut [Sentence], buckets: usize) -> Vec<(usize, usize)> {
    let total = sentences.len();
    if total == 0 || buckets == 0 {
        return Vec::new();
    }
    let buckets = buckets.min(total).max(1);
    let base = total / buckets;
    let remainder = total % buckets;

    let mut ranges = Vec::with_capacity(buckets);
    let mut start = 0;
    for b in 0..buckets {
        let extra = if b < remainder { 1 } else { 0 };
        let end = start + base + extra;
        for sentence in &mut sentences[start..end] {
            sentence.meta.chunk = Some(b);
        }
        ranges.push((start, end));
        start = end;
    }
    ranges
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn seconds_to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ModeArg;
    use crate::services::asr::{AsrResult, AsrWord, TestAsrProvider};
    use crate::services::duration::TestDurationProbe;
    use crate::services::vram::TestVramGate;

    fn base_args(audio_dir: PathBuf, text_source: PathBuf, output: PathBuf) -> AlignArgs {
        AlignArgs {
            audio_dir,
            text_source,
            output,
            resume: false,
            mode: ModeArg::Default,
            structured_script: None,
            text_parts_path: None,
            device: None,
            language: None,
            chunk_limit: None,
            min_index_chars: None,
            min_index_tokens: None,
            asr_workers: None,
            min_free_vram_gb: None,
            asr_prompt: None,
            asr_prompt_max_chars: None,
        }
    }

    fn loose_config() -> Config {
        let mut config = Config::default();
        config.sentence.min_chars = 1;
        config.sentence.min_chars_arabic = 1;
        config.sentence.min_tokens = 1;
        config.chunker.chunk_limit = 500;
        config
    }

    fn word(text: &str, start_sec: f64, end_sec: f64) -> AsrWord {
        AsrWord {
            text: text.to_string(),
            start_sec,
            end_sec,
        }
    }

    #[tokio::test]
    async fn s1_exact_match_single_file_end_to_end() {
        let audio_dir = tempfile::tempdir().unwrap();
        std::fs::write(audio_dir.path().join("a.wav"), b"").unwrap();
        let text_dir = tempfile::tempdir().unwrap();
        let text_path = text_dir.path().join("script.txt");
        std::fs::write(&text_path, "Hello world. Goodbye now.").unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("transcript.json");

        let args = base_args(audio_dir.path().to_path_buf(), text_path, output.clone());
        let config = loose_config();

        let asr = Arc::new(TestAsrProvider::new(vec![AsrResult {
            words: vec![
                word("hello", 0.0, 0.5),
                word("world", 0.5, 1.0),
                word("goodbye", 1.2, 1.7),
                word("now", 1.7, 2.1),
            ],
            language: Some("en".to_string()),
            duration_sec: 2.2,
        }]));
        let duration = Arc::new(TestDurationProbe::new(2.2));
        let vram = Arc::new(TestVramGate::new(None));

        run(args, config, asr, duration, vram).await.unwrap();

        let saved: ProgressPayload =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(saved.meta.status, "ok");
        assert_eq!(saved.items.len(), 2);
        assert_eq!(saved.items[0].start_ms, Some(0));
        assert_eq!(saved.items[0].end_ms, Some(1000));
        assert_eq!(saved.items[0].audio_file.as_deref(), Some("a.wav"));
        assert_eq!(saved.items[1].start_ms, Some(1200));
        assert_eq!(saved.items[1].end_ms, Some(2100));
    }

    #[tokio::test]
    async fn s3_total_asr_failure_falls_back_to_weighted_approximation() {
        let audio_dir = tempfile::tempdir().unwrap();
        std::fs::write(audio_dir.path().join("b.wav"), b"").unwrap();
        let text_dir = tempfile::tempdir().unwrap();
        let text_path = text_dir.path().join("script.txt");
        std::fs::write(
            &text_path,
            "Sentence number one here. Sentence number two here. Sentence number three here. Sentence number four here.",
        )
        .unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("transcript.json");

        let args = base_args(audio_dir.path().to_path_buf(), text_path, output.clone());
        let config = loose_config();

        let asr = Arc::new(TestAsrProvider::new(vec![AsrResult {
            words: Vec::new(),
            language: None,
            duration_sec: 4.0,
        }]));
        let duration = Arc::new(TestDurationProbe::new(4.0));
        let vram = Arc::new(TestVramGate::new(None));

        run(args, config, asr, duration, vram).await.unwrap();

        let saved: ProgressPayload =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(saved.meta.status, "ok");
        assert_eq!(saved.items[0].start_ms, Some(0));
        assert_eq!(saved.items.last().unwrap().end_ms, Some(4000));
        for item in &saved.items {
            assert_eq!(item.audio_file.as_deref(), Some("b.wav"));
        }
    }

    #[tokio::test]
    async fn resume_skips_already_committed_file() {
        let audio_dir = tempfile::tempdir().unwrap();
        std::fs::write(audio_dir.path().join("a.wav"), b"").unwrap();
        std::fs::write(audio_dir.path().join("b.wav"), b"").unwrap();
        let text_dir = tempfile::tempdir().unwrap();
        let text_path = text_dir.path().join("script.txt");
        std::fs::write(&text_path, "First file sentence here. Second file sentence here.").unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("transcript.json");

        let args = base_args(audio_dir.path().to_path_buf(), text_path.clone(), output.clone());
        let config = loose_config();
        let asr = Arc::new(TestAsrProvider::new(vec![
            AsrResult {
                words: Vec::new(),
                language: None,
                duration_sec: 2.0,
            },
            AsrResult {
                words: Vec::new(),
                language: None,
                duration_sec: 2.0,
            },
        ]));
        let duration = Arc::new(TestDurationProbe::new(2.0));
        let vram = Arc::new(TestVramGate::new(None));
        run(args, config, asr, duration, vram).await.unwrap();

        let before: ProgressPayload =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(before.meta.processed_audio.len(), 2);

        // Resume with an ASR provider that would fail if invoked for "a.wav"
        // again: only one scripted result remains, for the rewound file.
        let mut resume_args = base_args(audio_dir.path().to_path_buf(), text_path, output.clone());
        resume_args.resume = true;
        let asr = Arc::new(TestAsrProvider::new(vec![AsrResult {
            words: Vec::new(),
            language: None,
            duration_sec: 2.0,
        }]));
        let duration = Arc::new(TestDurationProbe::new(2.0));
        let vram = Arc::new(TestVramGate::new(None));
        run(resume_args, loose_config(), asr, duration, vram)
            .await
            .unwrap();

        let after: ProgressPayload =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(after.meta.status, "ok");
        assert_eq!(after.items[0].start_ms, before.items[0].start_ms);
    }

    #[tokio::test]
    async fn missing_audio_dir_returns_invalid_input() {
        let text_dir = tempfile::tempdir().unwrap();
        let text_path = text_dir.path().join("script.txt");
        std::fs::write(&text_path, "Hello there.").unwrap();
        let out_dir = tempfile::tempdir().unwrap();

        let args = base_args(
            PathBuf::from("/nonexistent/audio/dir"),
            text_path,
            out_dir.path().join("out.json"),
        );
        let config = loose_config();
        let asr = Arc::new(TestAsrProvider::new(Vec::new()));
        let duration = Arc::new(TestDurationProbe::new(1.0));
        let vram = Arc::new(TestVramGate::new(None));

        let result = run(args, config, asr, duration, vram).await;
        assert!(matches!(result, Err(AlignError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn manga_mode_without_structured_script_fails() {
        let audio_dir = tempfile::tempdir().unwrap();
        std::fs::write(audio_dir.path().join("a.wav"), b"").unwrap();
        let text_dir = tempfile::tempdir().unwrap();
        let text_path = text_dir.path().join("script.txt");
        std::fs::write(&text_path, "Hello there friend.").unwrap();
        let out_dir = tempfile::tempdir().unwrap();

        let args = base_args(
            audio_dir.path().to_path_buf(),
            text_path,
            out_dir.path().join("out.json"),
        );
        let mut config = loose_config();
        config.general.mode = Mode::Manga;
        let asr = Arc::new(TestAsrProvider::new(Vec::new()));
        let duration = Arc::new(TestDurationProbe::new(1.0));
        let vram = Arc::new(TestVramGate::new(None));

        let result = run(args, config, asr, duration, vram).await;
        assert!(matches!(result, Err(AlignError::InvalidInput(_))));
    }

    #[test]
    fn placeholder_sentence_inherits_previous_end_ms_and_audio_file() {
        let mut sentences = vec![
            Sentence::from_visible("First sentence here.".to_string()),
            Sentence::from_visible(String::new()),
        ];
        sentences[1].meta.placeholder = true;
        sentences[1].meta.merged_into = Some(0);
        sentences[1].meta.pre_merged_text = Some("skipped fragment".to_string());

        let mut aligner = Aligner::new(sentences, crate::config::AlignerConfig::default());
        aligner.set_forced_src(Some("a.wav".to_string()));
        aligner.extend_words_and_align(
            vec![
                Word {
                    text: "first".into(),
                    start_ms: 0,
                    end_ms: 400,
                },
                Word {
                    text: "sentence".into(),
                    start_ms: 400,
                    end_ms: 900,
                },
                Word {
                    text: "here".into(),
                    start_ms: 900,
                    end_ms: 1300,
                },
            ],
            "a.wav",
        );

        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("t.json");
        let store = ProgressStore::new(output.clone(), crate::config::ProgressConfig::default());
        save_progress(&store, &aligner, &ProgressMeta::default()).unwrap();

        let saved: ProgressPayload =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(saved.items[1].start_ms, saved.items[0].end_ms);
        assert_eq!(saved.items[1].end_ms, saved.items[0].end_ms);
        assert_eq!(saved.items[1].audio_file, saved.items[0].audio_file);
    }
}
