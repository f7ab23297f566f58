//! Error Handling Module
//!
//! Defines the error type for the nodulescan library.
//! Uses thiserror for ergonomic error definitions.
//!
//! The three failure modes of a prediction (model load, bad input image,
//! runtime fault) are separate variants so callers can map them to different
//! user-facing behavior.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Main error type for nodulescan operations
#[derive(Error, Debug)]
pub enum NoduleScanError {
    /// The model artifact is missing, unreadable or not a valid graph
    #[error("Failed to load model at '{path}': {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// The input buffer could not be turned into an input tensor
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),

    /// The forward pass or output extraction failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// The engine has no loaded session
    #[error("Model session is not ready")]
    NotReady,

    /// A caller-side deadline expired before the prediction finished
    #[error("Prediction timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of an error for the caller's response policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The request carried a bad image (4xx); retrying will not help
    BadInput,
    /// Server-side fault (5xx)
    Internal,
    /// The model is not available (503)
    Unavailable,
}

impl NoduleScanError {
    pub fn model_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Map the error to the response category a caller should use
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Preprocessing(_) => ErrorCategory::BadInput,
            Self::ModelLoad { .. } | Self::NotReady => ErrorCategory::Unavailable,
            Self::Inference(_)
            | Self::Timeout(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a bounded retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Inference(_))
    }
}

impl From<serde_json::Error> for NoduleScanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for NoduleScanError {
    fn from(err: image::ImageError) -> Self {
        Self::Preprocessing(err.to_string())
    }
}

/// Convenience Result type for nodulescan operations
pub type Result<T> = std::result::Result<T, NoduleScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NoduleScanError::Preprocessing("unsupported format".to_string());
        assert_eq!(format!("{}", err), "Preprocessing error: unsupported format");
    }

    #[test]
    fn test_model_load_error() {
        let err = NoduleScanError::model_load("/models/missing.onnx", "file not found");
        let msg = format!("{}", err);
        assert!(msg.contains("missing.onnx"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_categories_are_distinct() {
        assert_eq!(
            NoduleScanError::Preprocessing("x".into()).category(),
            ErrorCategory::BadInput
        );
        assert_eq!(
            NoduleScanError::Inference("x".into()).category(),
            ErrorCategory::Internal
        );
        assert_eq!(
            NoduleScanError::model_load("m.onnx", "x").category(),
            ErrorCategory::Unavailable
        );
        assert_eq!(NoduleScanError::NotReady.category(), ErrorCategory::Unavailable);
    }

    #[test]
    fn test_only_inference_is_retryable() {
        assert!(NoduleScanError::Inference("oom".into()).is_retryable());
        assert!(!NoduleScanError::Preprocessing("bad".into()).is_retryable());
        assert!(!NoduleScanError::model_load("m.onnx", "x").is_retryable());
        assert!(!NoduleScanError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: NoduleScanError = io.into();
        assert!(matches!(err, NoduleScanError::Io(_)));
    }
}
