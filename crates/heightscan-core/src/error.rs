//! Error types for the height scanning pipeline.

use thiserror::Error;

/// Errors that can occur while scanning heights.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("block {height}: {reason}")]
    Execution { height: u64, reason: String },

    #[error("executor panicked while processing block {height}")]
    Panicked { height: u64 },

    #[error("flush error: {0}")]
    Flush(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid scan task '{title}': {reason}")]
    InvalidTask { title: String, reason: String },

    #[error("no executor for task '{title}': {reason}")]
    ExecutorUnavailable { title: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl ScanError {
    /// The height this error is attached to, if any.
    pub fn height(&self) -> Option<u64> {
        match self {
            Self::Execution { height, .. } | Self::Panicked { height } => Some(*height),
            _ => None,
        }
    }
}
