use clap::Args;
use std::path::PathBuf;

/// Arguments for the `align` subcommand: align a text corpus to the ASR
/// transcription of a sequence of audio files.
#[derive(Args, Debug, Clone)]
pub struct AlignArgs {
    /// Directory containing the ordered audio clips (.mp3/.wav/.m4a/.flac/.ogg/.aac).
    pub audio_dir: PathBuf,

    /// Directory or file containing the source text corpus (.txt/.srt/.vtt).
    pub text_source: PathBuf,

    /// Output transcript path; the progress sidecar is derived from it
    /// (`<name>.json` / `<name>Progress.json`).
    pub output: PathBuf,

    /// Resume from an existing progress file at `output`, if present.
    #[arg(long)]
    pub resume: bool,

    /// Structured-ordering mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Default)]
    pub mode: ModeArg,

    /// Path to a JSON manga reading-order tree (required when `--mode manga`).
    #[arg(long)]
    pub structured_script: Option<PathBuf>,

    /// External pre-segmented parts source: a local path or an http(s) URL.
    #[arg(long)]
    pub text_parts_path: Option<String>,

    /// ASR device selector ("cpu", "cuda", ...).
    #[arg(long)]
    pub device: Option<String>,

    /// Force ASR language (passed through to the provider, recorded in meta).
    #[arg(long)]
    pub language: Option<String>,

    /// Text chunk size in characters; `0` disables default-mode chunking.
    #[arg(long)]
    pub chunk_limit: Option<usize>,

    /// Minimum character count for sentence coalescing.
    #[arg(long)]
    pub min_index_chars: Option<usize>,

    /// Minimum token count for sentence coalescing.
    #[arg(long)]
    pub min_index_tokens: Option<usize>,

    /// ASR parallelism ceiling (bounded worker pool size).
    #[arg(long)]
    pub asr_workers: Option<usize>,

    /// Minimum free VRAM in GB required before starting an ASR job.
    #[arg(long)]
    pub min_free_vram_gb: Option<f64>,

    /// Fixed text prepended to the per-file ASR initial prompt.
    #[arg(long)]
    pub asr_prompt: Option<String>,

    /// Character budget for the ASR initial prompt.
    #[arg(long)]
    pub asr_prompt_max_chars: Option<usize>,
}

/// Structured-ordering mode, as a CLI-friendly enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// Flat balanced-chunker mode.
    Default,
    /// Structured manga panel reading-order tree mode.
    Manga,
}

impl From<ModeArg> for crate::config::Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Default => crate::config::Mode::Default,
            ModeArg::Manga => crate::config::Mode::Manga,
        }
    }
}
