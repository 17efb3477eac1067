//! Configuration management module for the alignment engine.
//!
//! This module provides the complete configuration service system with
//! dependency injection support and comprehensive type definitions, mirroring
//! the donor CLI's `ConfigService` architecture so that the orchestrator and
//! commands stay unit-testable without touching the filesystem.
//!
//! # Key Components
//!
//! - [`Config`] - Main configuration structure, one sub-struct per component
//!   named in the specification (`general`, `sentence`, `chunker`, `aligner`,
//!   `recovery`, `progress`, `orchestrator`, `asr`).
//! - [`ConfigService`] - Service interface for configuration management.
//! - [`ProductionConfigService`] - Production implementation with file I/O.
//! - [`TestConfigService`] - Test implementation with controlled behavior.
//!
//! # Examples
//!
//! ```rust
//! use scriptalign_cli::config::{Config, ConfigService, ProductionConfigService};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config_service = ProductionConfigService::new()?;
//! let config = config_service.get_config()?;
//! println!("mode: {}", config.general.mode);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod environment;
pub mod service;
pub mod test_service;

pub use environment::{EnvironmentProvider, SystemEnvironmentProvider, TestEnvironmentProvider};
pub use service::{ConfigService, ProductionConfigService};
pub use test_service::TestConfigService;

/// Full application configuration, one section per component in the spec.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Ambient/general options (device, language, mode, text-parts source).
    pub general: GeneralConfig,
    /// Sentence Builder coalesce thresholds.
    pub sentence: SentenceConfig,
    /// Balanced Chunker limits.
    pub chunker: ChunkerConfig,
    /// Aligner fuzzy-matching thresholds and search budgets.
    pub aligner: AlignerConfig,
    /// Recovery (anchor / weighted-approximation) tuning.
    pub recovery: RecoveryConfig,
    /// Progress Store retry/layout tuning.
    pub progress: ProgressConfig,
    /// Orchestrator concurrency and prompting options.
    pub orchestrator: OrchestratorConfig,
    /// ASR provider connection settings.
    pub asr: AsrConfig,
    /// Optional file path from which the configuration was loaded.
    pub loaded_from: Option<PathBuf>,
}

/// Structured-script mode selector.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Flat balanced-chunker mode: one chunk per audio file.
    Default,
    /// Structured (manga panel reading-order tree) mode.
    Manga,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Default => write!(f, "default"),
            Mode::Manga => write!(f, "manga"),
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Default
    }
}

/// General, ambient options for a single alignment run.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    /// ASR device selector passed through to the provider ("cpu", "cuda", ...).
    pub device: String,
    /// Forced ASR language; recorded in progress meta. `None` lets ASR detect it.
    pub language: Option<String>,
    /// Structured-ordering mode.
    pub mode: Mode,
    /// Optional external pre-segmented parts source (local path or http(s) URL).
    pub text_parts_path: Option<String>,
    /// Workspace directory for resolving relative input paths.
    pub workspace: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            language: None,
            mode: Mode::Default,
            text_parts_path: None,
            workspace: PathBuf::from("."),
        }
    }
}

/// Sentence Builder coalesce thresholds.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SentenceConfig {
    /// Minimum character count before a fragment is coalesced (Latin scripts).
    pub min_chars: usize,
    /// Reduced minimum character count for Arabic-script text.
    pub min_chars_arabic: usize,
    /// Minimum token count before a fragment is coalesced.
    pub min_tokens: usize,
}

impl Default for SentenceConfig {
    fn default() -> Self {
        Self {
            min_chars: 50,
            min_chars_arabic: 20,
            min_tokens: 3,
        }
    }
}

/// Balanced Chunker limits.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters; `0` disables default-mode chunking.
    pub chunk_limit: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { chunk_limit: 2000 }
    }
}

/// Aligner fuzzy-matching thresholds and search budgets.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlignerConfig {
    /// Minimum committed span length in milliseconds for a matched sentence.
    pub min_match_ms: i64,
    /// Fuzzy score acceptance threshold in normal mode (0-100).
    pub normal_threshold: f64,
    /// Fuzzy score acceptance threshold in aggressive mode (0-100).
    pub aggressive_threshold: f64,
    /// Minimum sliding-scan checks budget before giving up, normal mode.
    pub max_checks: usize,
    /// Sliding-scan checks ceiling in aggressive mode.
    pub max_checks_aggressive: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_match_ms: 200,
            normal_threshold: 75.0,
            aggressive_threshold: 62.0,
            max_checks: 4000,
            max_checks_aggressive: 200_000,
        }
    }
}

/// Recovery (anchor / weighted-approximation) tuning.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoveryConfig {
    /// How many upcoming sentences anchor recovery searches past the stall.
    pub anchor_search_span: usize,
    /// Warn (not fail) when expected ms/char deviates from history by more than this fraction.
    pub duration_deviation_warn_pct: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            anchor_search_span: 9,
            duration_deviation_warn_pct: 0.5,
        }
    }
}

/// Progress Store retry/layout tuning.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProgressConfig {
    /// Maximum atomic-rename retries on contention.
    pub max_retries: u32,
    /// Base retry backoff in milliseconds.
    pub base_sleep_ms: u64,
    /// Retry backoff ceiling in milliseconds.
    pub max_sleep_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            max_retries: 40,
            base_sleep_ms: 50,
            max_sleep_ms: 250,
        }
    }
}

/// Orchestrator concurrency, admission, and prompting options.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrchestratorConfig {
    /// ASR parallelism ceiling (bounded worker pool size).
    pub asr_workers: usize,
    /// Minimum free VRAM in GB required before starting an ASR job.
    pub min_free_vram_gb: Option<f64>,
    /// GPU memory polling interval in milliseconds.
    pub vram_poll_interval_ms: u64,
    /// GPU memory admission timeout in seconds (0 disables the timeout).
    pub vram_timeout_secs: u64,
    /// Margin in milliseconds: below this, an audio file is considered exhausted.
    pub chunk_underflow_margin_ms: i64,
    /// Fixed prompt text prepended to the per-file chunk prompt, if any.
    pub asr_prompt: Option<String>,
    /// Maximum character budget for the ASR initial prompt.
    pub asr_prompt_max_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            asr_workers: num_cpus::get().min(4),
            min_free_vram_gb: None,
            vram_poll_interval_ms: 500,
            vram_timeout_secs: 60,
            chunk_underflow_margin_ms: 1500,
            asr_prompt: None,
            asr_prompt_max_chars: 200,
        }
    }
}

/// ASR provider connection settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AsrConfig {
    /// Provider selector: `"whisper-http"` (production) or `"test"` (deterministic stub).
    pub provider: String,
    /// Base URL of the OpenAI-compatible Whisper-family transcription endpoint.
    pub base_url: String,
    /// API key for authentication, if the endpoint requires one.
    pub api_key: Option<String>,
    /// Model name to request from the provider.
    pub model: String,
    /// HTTP request timeout in seconds.
    pub timeout_seconds: u64,
    /// Number of retries on request failure.
    pub max_retries: u32,
    /// Retry interval in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            provider: "whisper-http".to_string(),
            base_url: "http://127.0.0.1:8000/v1".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            timeout_seconds: 120,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Initialize the global config manager side effects (directory creation etc).
///
/// Currently a thin placeholder kept for `main`'s startup sequence: it
/// mirrors the donor CLI's `init_config_manager` entry point so future
/// process-wide initialization (e.g. XDG directory creation) has a single
/// place to live.
pub fn init_config_manager() -> crate::Result<()> {
    Ok(())
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();
        assert_eq!(config.general.mode, Mode::Default);
        assert_eq!(config.sentence.min_chars, 50);
        assert_eq!(config.sentence.min_chars_arabic, 20);
        assert_eq!(config.aligner.min_match_ms, 200);
    }

    #[test]
    fn test_aligner_thresholds() {
        let aligner = AlignerConfig::default();
        assert_eq!(aligner.normal_threshold, 75.0);
        assert_eq!(aligner.aggressive_threshold, 62.0);
        assert_eq!(aligner.max_checks, 4000);
        assert_eq!(aligner.max_checks_aggressive, 200_000);
    }

    #[test]
    fn test_progress_retry_defaults() {
        let progress = ProgressConfig::default();
        assert_eq!(progress.max_retries, 40);
        assert_eq!(progress.base_sleep_ms, 50);
        assert_eq!(progress.max_sleep_ms, 250);
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[aligner]"));
        assert!(toml_str.contains("[recovery]"));
        let round_tripped: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(round_tripped.aligner.min_match_ms, config.aligner.min_match_ms);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Default.to_string(), "default");
        assert_eq!(Mode::Manga.to_string(), "manga");
    }
}
