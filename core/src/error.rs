//! Error kinds shared across the crate.
//!
//! Per-sentence problems (malformed corpus tokens, bad user analyses) are
//! recoverable: the caller logs them and moves on. Model-file problems are
//! fatal for the invoking command.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed corpus token or malformed inline analysis bracket.
    #[error("malformed input: '{0}'")]
    Parsing(String),

    /// User-supplied analysis probabilities do not sum to 1.0.
    #[error("analysis probabilities sum to {sum} (expected 1.0) at token '{token}'")]
    UserProbSumNotOne { token: String, sum: f64 },

    /// Model file missing, unreadable or not decodable.
    #[error("model file '{path}': {message}")]
    ModelLoad { path: String, message: String },

    /// The requested morphological analyzer cannot be loaded.
    #[error("morphological analyzer unavailable: {0}")]
    AnalyzerUnavailable(String),

    /// Bad run-time configuration (XML file or separator spec).
    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
