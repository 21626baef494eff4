//! Error types for loading, encoding, training and composing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for note-composer operations
pub type Result<T> = std::result::Result<T, ComposerError>;

/// Errors that can occur anywhere in the compose pipeline
#[derive(Debug, Error)]
pub enum ComposerError {
    /// I/O error while reading or writing a file
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Note file could not be opened
    #[error("cannot open note file {path}: {source}")]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A row of the note file did not hold a valid note code
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// The note file had a header but no rows
    #[error("dataset contains no notes")]
    EmptyDataset,

    /// Window length of zero
    #[error("window length must be at least 1")]
    InvalidWindowLength,

    /// Not enough notes to build a single (window, target) pair
    #[error("sequence of {len} notes is too short for windows of length {window}")]
    SequenceTooShort { len: usize, window: usize },

    /// A note code does not fit the vocabulary
    #[error("vocabulary of size {vocab} cannot hold note {max_note}")]
    VocabularyTooSmall { vocab: usize, max_note: usize },

    /// Parallel inputs disagree in length
    #[error("length mismatch: {left} predicted vs {right} actual")]
    LengthMismatch { left: usize, right: usize },

    /// Tensor shape does not match what the model expects
    #[error("shape mismatch: {reason}")]
    ShapeMismatch { reason: String },

    /// Configuration rejected by validation
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Model could not be serialized or deserialized
    #[error("serialization error: {reason}")]
    Persistence { reason: String },
}

impl ComposerError {
    /// Create a parse error for a 1-based line number
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape(reason: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ComposerError {
    fn from(error: serde_json::Error) -> Self {
        ComposerError::Persistence {
            reason: error.to_string(),
        }
    }
}

impl From<bincode::Error> for ComposerError {
    fn from(error: bincode::Error) -> Self {
        ComposerError::Persistence {
            reason: error.to_string(),
        }
    }
}
