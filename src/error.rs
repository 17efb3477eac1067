//! Error types for the alignment engine and its CLI.
//!
//! This module defines the `AlignError` enum covering every failure surface
//! named in the alignment engine's error handling design: configuration,
//! ASR provider failures, audio duration probing, sentence construction,
//! progress-store I/O, and the unrecoverable alignment stall that is the
//! only truly fatal outcome of an otherwise best-effort pipeline.
use thiserror::Error;

/// Represents all possible errors in the alignment application.
///
/// Each variant maps to a stable process exit code via [`AlignError::exit_code`]
/// and a remediation hint via [`AlignError::user_friendly_message`].
#[derive(Error, Debug)]
pub enum AlignError {
    /// I/O operation failed during file system access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error due to invalid or missing settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The ASR provider failed to transcribe an audio file.
    #[error("ASR error: {message}")]
    Asr {
        /// Description of the ASR failure.
        message: String,
    },

    /// Audio duration probing failed.
    #[error("Audio duration probe error: {message}")]
    AudioProbe {
        /// Description of the probing failure.
        message: String,
    },

    /// Sentence construction from the text corpus failed.
    #[error("Sentence construction error: {message}")]
    SentenceBuild {
        /// Description of the sentence-building failure.
        message: String,
    },

    /// The progress store could not be read, written, or parsed.
    #[error("Progress store error: {message}")]
    ProgressStore {
        /// Description of the progress-store failure.
        message: String,
    },

    /// Alignment stalled: a sentence could not be matched and recovery was
    /// exhausted while the current audio file still had unmatched content.
    #[error("Alignment stalled at sentence {sentence_index}: {message}")]
    AlignmentStalled {
        /// Index of the sentence the aligner could not advance past.
        sentence_index: usize,
        /// Description of why recovery could not resolve the stall.
        message: String,
    },

    /// The provided input (audio list, text corpus, structured script) was
    /// invalid or empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The run was cancelled (e.g. Ctrl-C) after a final progress save.
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Catch-all error variant wrapping any other failure.
    #[error("Unknown error: {0}")]
    Other(#[from] anyhow::Error),
}

// Convert reqwest error to ASR error (the HTTP Whisper-family provider is the
// only reqwest consumer in the fallible path).
impl From<reqwest::Error> for AlignError {
    fn from(err: reqwest::Error) -> Self {
        AlignError::Asr {
            message: err.to_string(),
        }
    }
}

impl From<walkdir::Error> for AlignError {
    fn from(err: walkdir::Error) -> Self {
        AlignError::InvalidInput(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for AlignError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        AlignError::AudioProbe {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AlignError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => AlignError::Config {
                message: format!("Configuration file not found: {}", path),
            },
            config::ConfigError::Message(msg) => AlignError::Config { message: msg },
            _ => AlignError::Config {
                message: format!("Configuration error: {}", err),
            },
        }
    }
}

impl From<serde_json::Error> for AlignError {
    fn from(err: serde_json::Error) -> Self {
        AlignError::ProgressStore {
            message: format!("JSON serialization/deserialization error: {}", err),
        }
    }
}

/// Specialized `Result` type for alignment operations.
pub type AlignResult<T> = Result<T, AlignError>;

impl AlignError {
    /// Create a configuration error with the given message.
    pub fn config<S: Into<String>>(message: S) -> Self {
        AlignError::Config {
            message: message.into(),
        }
    }

    /// Create an ASR provider error with the given message.
    pub fn asr<S: Into<String>>(message: S) -> Self {
        AlignError::Asr {
            message: message.into(),
        }
    }

    /// Create an audio duration probe error with the given message.
    pub fn audio_probe<S: Into<String>>(message: S) -> Self {
        AlignError::AudioProbe {
            message: message.into(),
        }
    }

    /// Create a sentence construction error with the given message.
    pub fn sentence_build<S: Into<String>>(message: S) -> Self {
        AlignError::SentenceBuild {
            message: message.into(),
        }
    }

    /// Create a progress store error with the given message.
    pub fn progress_store<S: Into<String>>(message: S) -> Self {
        AlignError::ProgressStore {
            message: message.into(),
        }
    }

    /// Create an alignment-stalled error for the given sentence index.
    pub fn alignment_stalled<S: Into<String>>(sentence_index: usize, message: S) -> Self {
        AlignError::AlignmentStalled {
            sentence_index,
            message: message.into(),
        }
    }

    /// Return the corresponding exit code for this error variant.
    pub fn exit_code(&self) -> i32 {
        match self {
            AlignError::Io(_) => 1,
            AlignError::Config { .. } => 2,
            AlignError::Asr { .. } => 3,
            AlignError::AudioProbe { .. } => 5,
            AlignError::SentenceBuild { .. } => 4,
            AlignError::ProgressStore { .. } => 7,
            AlignError::AlignmentStalled { .. } => 8,
            AlignError::InvalidInput(_) => 9,
            AlignError::Interrupted(_) => 10,
            AlignError::Other(_) => 1,
        }
    }

    /// Return a user-friendly error message with a remediation hint.
    pub fn user_friendly_message(&self) -> String {
        match self {
            AlignError::Io(e) => format!("File operation error: {}", e),
            AlignError::Config { message } => format!(
                "Configuration error: {}\nHint: run 'scriptalign-cli config --help' for details",
                message
            ),
            AlignError::Asr { message } => format!(
                "ASR error: {}\nHint: check the ASR provider endpoint and device settings",
                message
            ),
            AlignError::AudioProbe { message } => format!(
                "Audio duration probe error: {}\nHint: ensure the audio file is a supported container",
                message
            ),
            AlignError::SentenceBuild { message } => format!(
                "Sentence construction error: {}\nHint: check the text corpus encoding and structure",
                message
            ),
            AlignError::ProgressStore { message } => format!(
                "Progress store error: {}\nHint: check write permissions on the output directory",
                message
            ),
            AlignError::AlignmentStalled {
                sentence_index,
                message,
            } => format!(
                "Alignment stalled at sentence {}: {}\nHint: inspect the progress file's problem_audio/unrecognized_text fields",
                sentence_index, message
            ),
            AlignError::InvalidInput(msg) => format!("Invalid input: {}", msg),
            AlignError::Interrupted(msg) => format!(
                "Interrupted: {}\nHint: re-run with --resume to continue from the saved progress",
                msg
            ),
            AlignError::Other(err) => {
                format!("Unknown error: {}\nHint: please report this issue", err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_creation() {
        let error = AlignError::config("test config error");
        assert!(matches!(error, AlignError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: test config error");
    }

    #[test]
    fn test_alignment_stalled_error_creation() {
        let error = AlignError::alignment_stalled(7, "anchor recovery exhausted");
        assert!(matches!(error, AlignError::AlignmentStalled { .. }));
        let msg = error.to_string();
        assert!(msg.contains("sentence 7"));
        assert!(msg.contains("anchor recovery exhausted"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let align_error: AlignError = io_error.into();
        assert!(matches!(align_error, AlignError::Io(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AlignError::config("x").exit_code(), 2);
        assert_eq!(AlignError::asr("x").exit_code(), 3);
        assert_eq!(AlignError::sentence_build("x").exit_code(), 4);
        assert_eq!(AlignError::audio_probe("x").exit_code(), 5);
        assert_eq!(AlignError::progress_store("x").exit_code(), 7);
        assert_eq!(AlignError::alignment_stalled(0, "x").exit_code(), 8);
        assert_eq!(AlignError::Interrupted("x".to_string()).exit_code(), 10);
    }

    #[test]
    fn test_user_friendly_messages() {
        let config_error = AlignError::config("missing key");
        let message = config_error.user_friendly_message();
        assert!(message.contains("Configuration error:"));
        assert!(message.contains("config --help"));

        let asr_error = AlignError::asr("endpoint unreachable");
        let message = asr_error.user_friendly_message();
        assert!(message.contains("ASR error:"));
        assert!(message.contains("device settings"));
    }
}
