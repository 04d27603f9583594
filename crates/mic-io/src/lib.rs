//! # mic-io
//!
//! File I/O for microscopy illumination correction.
//!
//! - [`tiff`] - multi-page TIFF z-stacks and single-page calibration fields
//! - [`text`] - delimited-text calibration fields
//! - [`ModelRepository`] - per-objective, per-wavelength calibration lookup
//! - [`discover_stacks`] - input stack listing
//!
//! # Example
//!
//! ```rust,ignore
//! use mic_io::{FieldFormat, ModelRepository};
//!
//! let repo = ModelRepository::new("models", FieldFormat::Tiff);
//! let model = repo.load("tpfm_zeiss25x", &[Some(618), Some(482), None])?;
//! let stack = mic_io::tiff::read_stack("acq.tif")?;
//! ```

#![warn(missing_docs)]

pub mod discover;
pub mod error;
pub mod repository;
pub mod text;
pub mod tiff;

pub use discover::{DEFAULT_EXTENSIONS, discover_stacks};
pub use error::{IoError, IoResult};
pub use repository::{FieldFormat, ModelRepository, channel_label, parse_wavelengths};
