//! Error types for correction operations.

use std::io;
use std::path::PathBuf;

use mic_io::IoError;
use thiserror::Error;

/// Error type for correction operations.
#[derive(Error, Debug)]
pub enum OpsError {
    /// Invalid dimensions specified.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Unrecognized option value, such as a filter or NaN policy name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Calibration model does not fit the stack.
    #[error("model does not match stack: {0}")]
    ModelMismatch(#[source] mic_core::Error),

    /// Correcting one depth slice failed; the whole stack is abandoned.
    #[error("slice {index} failed: {source}")]
    SliceTask {
        /// Depth index of the failing slice.
        index: usize,
        /// Underlying failure.
        #[source]
        source: mic_core::Error,
    },

    /// Reading an input stack failed.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// Input stack.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: IoError,
    },

    /// Writing a corrected stack failed.
    #[error("failed to write '{path}': {source}")]
    Persist {
        /// Output stack.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: IoError,
    },

    /// Scratch storage could not be created.
    #[error("scratch storage at '{path}': {source}")]
    Scratch {
        /// Scratch directory or file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// Worker pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(String),

    /// Other I/O-layer failure, including calibration-model loading.
    #[error(transparent)]
    Io(#[from] IoError),

    /// Data model validation error.
    #[error(transparent)]
    Core(#[from] mic_core::Error),
}

impl OpsError {
    /// `true` when the error is a calibration-model load failure.
    pub fn is_model_load(&self) -> bool {
        matches!(self, OpsError::Io(e) if e.is_model_load())
    }
}

/// Result type for correction operations.
pub type OpsResult<T> = Result<T, OpsError>;
