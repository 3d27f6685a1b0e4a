//! Error types for rlwsd.
//!
//! Conditions that only degrade a result (unknown embeddings, annotator
//! disagreement, senses without vectors, missing weight files, clustering
//! that hits its iteration cap) are logged and never reach this type.
//!
//! # Example
//!
//! ```rust
//! use rlwsd::{Result, WsdError};
//!
//! fn require_examples(n: usize) -> Result<()> {
//!     if n == 0 {
//!         return Err(WsdError::EmptyInput("no training examples".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_examples(0).is_err());
//! assert!(require_examples(3).is_ok());
//! ```

use thiserror::Error;

/// Result type alias for rlwsd operations.
pub type Result<T> = std::result::Result<T, WsdError>;

/// Errors that can occur in rlwsd.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WsdError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Malformed input line (labeled data, weights, embeddings).
    #[error("parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// Sense inventory error.
    #[error("inventory error: {0}")]
    Inventory(String),

    /// Empty input where non-empty was required.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Too few examples of one word to split into training and test sets.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Vector dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Clustering error.
    #[error("clustering error: {0}")]
    Clustering(String),

    /// Training error.
    #[error("training error: {0}")]
    Training(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle tensor operation error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl WsdError {
    /// Build a parse error for a 1-based line number.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
