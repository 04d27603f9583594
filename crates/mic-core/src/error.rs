//! Error types for mic-core operations.
//!
//! The [`Error`] enum covers the failure modes of the in-memory data model:
//! - Stack and calibration-field shape validation
//! - Model/stack compatibility checks before correction
//! - Conversion of raw correction-mode integers
//!
//! # Usage
//!
//! ```rust
//! use mic_core::{Error, Result};
//!
//! fn check_depth(depth: usize) -> Result<()> {
//!     if depth == 0 {
//!         return Err(Error::invalid_shape(vec![depth], "depth must be > 0"));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the data model and the correction kernel.
#[derive(Debug, Error)]
pub enum Error {
    /// A shape is structurally invalid (zero extent, overflow, bad rank).
    #[error("invalid shape {shape:?}: {reason}")]
    InvalidShape {
        /// Offending shape
        shape: Vec<usize>,
        /// Why it was rejected
        reason: String,
    },

    /// Buffer length does not match the declared shape.
    #[error("length mismatch: expected {expected} samples, got {actual}")]
    LengthMismatch {
        /// Samples implied by the shape
        expected: usize,
        /// Samples actually present
        actual: usize,
    },

    /// Lateral shapes of two arrays disagree.
    #[error("lateral shape mismatch: {a_height}x{a_width} vs {b_height}x{b_width}")]
    LateralMismatch {
        /// First array height
        a_height: usize,
        /// First array width
        a_width: usize,
        /// Second array height
        b_height: usize,
        /// Second array width
        b_width: usize,
    },

    /// Channel count of the calibration model differs from the stack.
    #[error("channel mismatch: model has {model} channel(s), stack has {stack}")]
    ChannelMismatch {
        /// Channels in the calibration model
        model: usize,
        /// Channels in the image stack
        stack: usize,
    },

    /// No channel carries calibration data, so no reference shape exists.
    #[error("no calibration channel available")]
    NoChannels,

    /// Raw correction mode outside `0..=2`.
    #[error("unknown correction mode: {0} (expected 0, 1 or 2)")]
    UnknownMode(i64),

    /// A correction produced a value that is not a number.
    #[error("{count} sample(s) evaluated to NaN")]
    NonFinite {
        /// Number of NaN samples found
        count: usize,
    },
}

impl Error {
    /// Creates an [`Error::InvalidShape`] error.
    #[inline]
    pub fn invalid_shape(shape: Vec<usize>, reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            shape,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::LateralMismatch`] error from `(height, width)` pairs.
    #[inline]
    pub fn lateral_mismatch(a: (usize, usize), b: (usize, usize)) -> Self {
        Self::LateralMismatch {
            a_height: a.0,
            a_width: a.1,
            b_height: b.0,
            b_width: b.1,
        }
    }

    /// Returns `true` for shape-related errors.
    #[inline]
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidShape { .. }
                | Self::LengthMismatch { .. }
                | Self::LateralMismatch { .. }
                | Self::ChannelMismatch { .. }
        )
    }
}
