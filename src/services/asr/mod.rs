//! ASR collaborator: transcribes one audio file into timed words.
//!
//! Modeled as a narrow async trait so the orchestrator never depends on a
//! concrete speech engine, matching the donor crate's pattern of
//! trait-based AI/VAD services behind a factory.

use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;

use crate::config::AsrConfig;
use crate::error::AlignError;

/// One transcribed word with audio-relative timing.
#[derive(Debug, Clone, PartialEq)]
pub struct AsrWord {
    /// Transcribed text.
    pub text: String,
    /// Start time in seconds, relative to the start of this audio file.
    pub start_sec: f64,
    /// End time in seconds, relative to the start of this audio file.
    pub end_sec: f64,
}

/// Result of transcribing one audio file.
#[derive(Debug, Clone)]
pub struct AsrResult {
    /// Ordered words covering the entire audio (may be empty on failure).
    pub words: Vec<AsrWord>,
    /// Detected or forced language code, if known.
    pub language: Option<String>,
    /// Real duration of the audio in seconds, as reported by the provider.
    pub duration_sec: f64,
}

/// Transcribes a single audio file into timed words.
///
/// On failure, callers are expected to continue with zero words: alignment
/// falls back to the recovery paths rather than aborting the run.
#[async_trait]
pub trait AsrProvider: Send + Sync {
    /// Transcribe `path`, optionally forcing `language` and seeding the
    /// model with `prompt` (trimmed to the configured character budget).
    async fn transcribe_words(
        &self,
        path: &std::path::Path,
        device: &str,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> crate::Result<AsrResult>;
}

/// RAII guard that suppresses the ASR provider's log/stdout noise for the
/// duration of one invocation by raising the crate's effective max log
/// level, restoring it on drop even if the call panics or returns early.
pub struct LogSuppressGuard {
    previous: log::LevelFilter,
}

impl LogSuppressGuard {
    /// Raise the max log level to `Error` for the lifetime of the guard.
    pub fn new() -> Self {
        let previous = log::max_level();
        log::set_max_level(log::LevelFilter::Error);
        Self { previous }
    }
}

impl Default for LogSuppressGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LogSuppressGuard {
    fn drop(&mut self) {
        log::set_max_level(self.previous);
    }
}

/// Whisper-family OpenAI-compatible HTTP transcription client, with
/// verbose-JSON word timestamps and a bounded retry ladder.
pub struct WhisperHttpProvider {
    client: reqwest::Client,
    config: AsrConfig,
}

impl WhisperHttpProvider {
    /// Build a provider from ASR connection settings.
    pub fn new(config: AsrConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AlignError::asr(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.config.base_url.trim_end_matches('/'))
    }

    async fn transcribe_once(
        &self,
        path: &std::path::Path,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> crate::Result<AsrResult> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AlignError::asr(format!("failed to read {path:?}: {e}")))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename));
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }
        if let Some(p) = prompt {
            form = form.text("prompt", p.to_string());
        }

        let mut request = self.client.post(self.endpoint()).multipart(form);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AlignError::asr(format!("request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AlignError::asr(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let body: WhisperVerboseJson = response
            .json()
            .await
            .map_err(|e| AlignError::asr(format!("failed to parse response: {e}")))?;

        let words = body
            .words
            .unwrap_or_default()
            .into_iter()
            .map(|w| AsrWord {
                text: w.word,
                start_sec: w.start,
                end_sec: w.end,
            })
            .collect();

        Ok(AsrResult {
            words,
            language: body.language,
            duration_sec: body.duration.unwrap_or(0.0),
        })
    }
}

#[async_trait]
impl AsrProvider for WhisperHttpProvider {
    async fn transcribe_words(
        &self,
        path: &std::path::Path,
        _device: &str,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> crate::Result<AsrResult> {
        let _guard = LogSuppressGuard::new();
        let mut attempt = 0u32;
        loop {
            match self.transcribe_once(path, language, prompt).await {
                Ok(result) => {
                    debug!("transcribed {path:?}: {} words", result.words.len());
                    return Ok(result);
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!("ASR attempt {attempt} for {path:?} failed: {e}; retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) => {
                    warn!("ASR exhausted retries for {path:?}: {e}; continuing with zero words");
                    return Ok(AsrResult {
                        words: Vec::new(),
                        language: language.map(|s| s.to_string()),
                        duration_sec: 0.0,
                    });
                }
            }
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct WhisperVerboseJson {
    language: Option<String>,
    duration: Option<f64>,
    words: Option<Vec<WhisperWord>>,
}

#[derive(Debug, serde::Deserialize)]
struct WhisperWord {
    word: String,
    start: f64,
    end: f64,
}

/// Deterministic test adapter: returns a pre-seeded script of results in
/// call order, one per invocation, falling back to empty words thereafter.
pub struct TestAsrProvider {
    scripted: std::sync::Mutex<Vec<AsrResult>>,
}

impl TestAsrProvider {
    /// Build a test provider that replays `results` in order, one per call.
    pub fn new(results: Vec<AsrResult>) -> Self {
        Self {
            scripted: std::sync::Mutex::new(results),
        }
    }
}

#[async_trait]
impl AsrProvider for TestAsrProvider {
    async fn transcribe_words(
        &self,
        _path: &std::path::Path,
        _device: &str,
        language: Option<&str>,
        _prompt: Option<&str>,
    ) -> crate::Result<AsrResult> {
        let mut scripted = self.scripted.lock().expect("test provider mutex poisoned");
        if scripted.is_empty() {
            Ok(AsrResult {
                words: Vec::new(),
                language: language.map(|s| s.to_string()),
                duration_sec: 0.0,
            })
        } else {
            Ok(scripted.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_provider_replays_scripted_results_in_order() {
        let provider = TestAsrProvider::new(vec![
            AsrResult {
                words: vec![AsrWord {
                    text: "hello".to_string(),
                    start_sec: 0.0,
                    end_sec: 0.5,
                }],
                language: Some("en".to_string()),
                duration_sec: 1.0,
            },
        ]);
        let result = provider
            .transcribe_words(std::path::Path::new("a.wav"), "cpu", None, None)
            .await
            .unwrap();
        assert_eq!(result.words.len(), 1);
        assert_eq!(result.duration_sec, 1.0);

        let second = provider
            .transcribe_words(std::path::Path::new("b.wav"), "cpu", None, None)
            .await
            .unwrap();
        assert!(second.words.is_empty());
    }

    #[test]
    fn log_suppress_guard_restores_previous_level_on_drop() {
        log::set_max_level(log::LevelFilter::Debug);
        {
            let _guard = LogSuppressGuard::new();
            assert_eq!(log::max_level(), log::LevelFilter::Error);
        }
        assert_eq!(log::max_level(), log::LevelFilter::Debug);
    }
}
