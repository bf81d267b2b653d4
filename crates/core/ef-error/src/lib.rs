//! Error types and classification for exportflow.
//!
//! This crate provides:
//! - [`ExportError`] - Top-level error enum for every pipeline stage
//! - [`ErrorCategory`] for retry decision making
//! - Error classification logic based on error variant

use thiserror::Error;

/// Top-level error type for exportflow.
#[derive(Error, Debug)]
pub enum ExportError {
    /// A required option is missing, mistyped, or names an unknown plugin.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Post-delivery consistency check failed.
    #[error("Inconsistent write state: {0}")]
    InconsistentWriteState(String),

    /// A user-supplied expression failed static checks.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// Copied object does not match its source.
    #[error("Integrity check failed for key {key}: expected {expected}, got {actual}")]
    InvalidKeyIntegrityCheck {
        key: String,
        expected: String,
        actual: String,
    },

    /// Reader errors (listing, fetching, parsing input)
    #[error("Reader error: {0}")]
    Reader(String),

    /// Writer errors (delivery to the destination)
    #[error("Writer error: {0}")]
    Writer(String),

    /// State store errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Record serialization errors
    #[error("Format error: {0}")]
    Format(String),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Local I/O errors (temp files, local destinations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExportError {
    /// Shorthand for a [`ExportError::Configuration`] error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for a [`ExportError::Reader`] error.
    pub fn reader(msg: impl Into<String>) -> Self {
        Self::Reader(msg.into())
    }

    /// Shorthand for a [`ExportError::Writer`] error.
    pub fn writer(msg: impl Into<String>) -> Self {
        Self::Writer(msg.into())
    }

    /// Shorthand for a [`ExportError::Persistence`] error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

/// Error classification for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient error - retry with exponential backoff
    ///
    /// Examples: network timeout, S3 throttling, HTTP 503
    Transient,

    /// Permanent error - never retry
    ///
    /// Examples: bad configuration, integrity failure, missing key
    Permanent,
}

/// Classifies an error to determine retry behavior.
pub fn classify_error(error: &ExportError) -> ErrorCategory {
    match error {
        ExportError::Configuration(_)
        | ExportError::InconsistentWriteState(_)
        | ExportError::InvalidExpression(_)
        | ExportError::InvalidKeyIntegrityCheck { .. }
        | ExportError::Format(_)
        | ExportError::Json(_) => ErrorCategory::Permanent,
        ExportError::Reader(msg)
        | ExportError::Writer(msg)
        | ExportError::Persistence(msg)
        | ExportError::Notification(msg) => classify_message(msg),
        ExportError::Io(e) => match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorCategory::Permanent
            }
            _ => ErrorCategory::Transient,
        },
    }
}

/// Classify a remote error message for retry purposes.
///
/// Throttling, 5xx, timeouts and connection failures are transient.
/// 4xx, NoSuchKey, AccessDenied and InvalidRequest are permanent.
/// Anything else is treated as transient.
pub fn classify_message(error: &str) -> ErrorCategory {
    let error_lower = error.to_lowercase();

    if error_lower.contains("slowdown")
        || error_lower.contains("toomanyrequests")
        || error_lower.contains("throttl")
        || error_lower.contains("service unavailable")
        || error_lower.contains("500")
        || error_lower.contains("502")
        || error_lower.contains("503")
        || error_lower.contains("504")
        || error_lower.contains("timeout")
        || error_lower.contains("connection reset")
        || error_lower.contains("connection refused")
    {
        return ErrorCategory::Transient;
    }

    if error_lower.contains("nosuchkey")
        || error_lower.contains("accessdenied")
        || error_lower.contains("invalidrequest")
        || error_lower.contains("nosuchbucket")
        || error_lower.contains("403")
        || error_lower.contains("404")
        || error_lower.contains("400")
    {
        return ErrorCategory::Permanent;
    }

    ErrorCategory::Transient
}

/// Result type alias using ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;
