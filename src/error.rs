use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable category attached to every failed report entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    UnreadableDocument,
    EmptyDocument,
    InvalidModeForDocument,
    ConversionFailure,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UnreadableDocument => "UnreadableDocument",
            ErrorCategory::EmptyDocument => "EmptyDocument",
            ErrorCategory::InvalidModeForDocument => "InvalidModeForDocument",
            ErrorCategory::ConversionFailure => "ConversionFailure",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors scoped to a single document. None of these abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("unreadable document: {0}")]
    UnreadableDocument(String),
    #[error("document has zero pages")]
    EmptyDocument,
    #[error("requested intent {intent} is invalid for this document: {reason}")]
    InvalidModeForDocument { intent: String, reason: String },
    #[error("conversion failed: {0}")]
    ConversionFailure(String),
    #[error("timeout")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
}

impl DocumentError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DocumentError::UnreadableDocument(_) => ErrorCategory::UnreadableDocument,
            DocumentError::EmptyDocument => ErrorCategory::EmptyDocument,
            DocumentError::InvalidModeForDocument { .. } => ErrorCategory::InvalidModeForDocument,
            DocumentError::ConversionFailure(_) => ErrorCategory::ConversionFailure,
            DocumentError::Timeout => ErrorCategory::Timeout,
            DocumentError::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// Fatal configuration problems, reported once before any document is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", problems.join("; "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}
