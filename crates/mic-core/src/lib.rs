//! # mic-core
//!
//! Core types for microscopy illumination correction.
//!
//! - [`ImageStack`], [`StackShape`], [`SampleType`] - volumetric integer stacks
//! - [`CalibrationModel`], [`ChannelSource`], [`ChannelMeans`] - flat/dark-field models
//! - [`CorrectionMode`] - the three correction formulas
//! - [`kernel`] - the stateless per-pixel correction
//!
//! ## Crate Structure
//!
//! ```text
//! mic-core (this crate)
//!    ^
//!    +-- mic-io  (TIFF stacks, calibration repository)
//!    +-- mic-ops (resampling, parallel correction, finalization, pipeline)
//!    +-- mic-cli
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod kernel;
pub mod mode;
pub mod model;
pub mod sample;
pub mod stack;

pub use error::{Error, Result};
pub use mode::CorrectionMode;
pub use model::{CalibrationModel, ChannelKind, ChannelMeans, ChannelSource, Field};
pub use sample::{Sample, SampleType};
pub use stack::{Axes, ImageStack, StackData, StackShape};
