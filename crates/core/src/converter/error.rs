//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::error_codes;
use crate::storage::StorageError;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Conversion process failed.
    #[error("Conversion failed: {reason}")]
    Failed {
        reason: String,
        stderr: Option<String>,
    },

    /// Conversion timed out.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Output could not be stored.
    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure with an executor-chosen code.
    #[error("{message}")]
    Coded { code: u32, message: String },
}

impl ConversionError {
    /// Creates a new conversion failed error with stderr output.
    pub fn failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn coded(code: u32, message: impl Into<String>) -> Self {
        Self::Coded {
            code,
            message: message.into(),
        }
    }

    /// Job error code for this failure.
    pub fn code(&self) -> u32 {
        match self {
            Self::InputNotFound { .. } => error_codes::INPUT_MISSING,
            Self::Timeout { .. } => error_codes::CONVERSION_TIMEOUT,
            Self::Upload(_) => error_codes::UPLOAD_FAILED,
            Self::Failed { .. } | Self::Io(_) => error_codes::CONVERSION_FAILED,
            Self::Coded { code, .. } => *code,
        }
    }

    /// Message stored on the job, with the stderr tail when there is one.
    pub fn job_message(&self) -> String {
        match self {
            Self::Failed {
                reason,
                stderr: Some(stderr),
            } if !stderr.trim().is_empty() => format!("{}: {}", reason, stderr.trim()),
            other => other.to_string(),
        }
    }
}
