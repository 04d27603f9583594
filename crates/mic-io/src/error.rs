//! Error types for I/O operations.
//!
//! Covers stack and calibration-field decoding, stack encoding, discovery,
//! and calibration-model loading.

use std::io;
use thiserror::Error;

/// I/O operation error.
#[derive(Debug, Error)]
pub enum IoError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unsupported file format or colour layout.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Sample type not representable as an unsigned integer stack.
    #[error("unsupported sample type: {0}")]
    UnsupportedSampleType(String),

    /// Invalid or corrupted file.
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// Decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Encoding error.
    #[error("encode error: {0}")]
    EncodeError(String),

    /// Pages or fields disagree in size.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected size.
        expected: String,
        /// Actual size.
        actual: String,
    },

    /// Parse error (text fields, glob patterns).
    #[error("parse error: {0}")]
    Parse(String),

    /// No usable calibration model could be assembled.
    #[error("cannot load calibration model for objective '{objective}': {reason}")]
    ModelLoad {
        /// Objective the model was requested for.
        objective: String,
        /// Why loading failed.
        reason: String,
    },

    /// Data model validation error.
    #[error(transparent)]
    Core(#[from] mic_core::Error),
}

impl IoError {
    /// Returns `true` for [`IoError::ModelLoad`].
    pub fn is_model_load(&self) -> bool {
        matches!(self, Self::ModelLoad { .. })
    }
}

impl From<tiff::TiffError> for IoError {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => IoError::Io(io),
            other => IoError::DecodeError(other.to_string()),
        }
    }
}

/// Result type for I/O operations.
pub type IoResult<T> = Result<T, IoError>;
