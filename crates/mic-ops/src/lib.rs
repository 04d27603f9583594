//! # mic-ops
//!
//! Correction engine for microscopy illumination correction.
//!
//! - [`resize`] - calibration model resampling with a one-entry cache
//! - [`parallel`] - per-slice correction on a bounded Rayon pool
//! - [`scratch`] - heap or memory-mapped `f64` workspace
//! - [`finalize`] - clip, sample-type restoration, persistence
//! - [`pipeline`] - per-stack orchestration and batches
//!
//! # Example
//!
//! ```rust,ignore
//! use mic_io::{FieldFormat, ModelRepository, discover_stacks, DEFAULT_EXTENSIONS};
//! use mic_ops::{PipelineConfig, correct_dataset};
//!
//! let repo = ModelRepository::new("models", FieldFormat::Tiff);
//! let stacks = discover_stacks("raw".as_ref(), DEFAULT_EXTENSIONS)?;
//! let report = correct_dataset(
//!     &repo,
//!     "tpfm_zeiss25x",
//!     &[Some(618), Some(482), None],
//!     &stacks,
//!     "corrected".as_ref(),
//!     &PipelineConfig::default(),
//! )?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod finalize;
pub mod parallel;
pub mod pipeline;
pub mod resize;
pub mod scratch;

pub use error::{OpsError, OpsResult};
pub use finalize::{clamp_to_range, finalize, persist};
pub use parallel::{NanPolicy, SliceProcessor, available_cores};
pub use pipeline::{BatchReport, FailurePolicy, PipelineConfig, StackFailure, StackPipeline, correct_dataset};
pub use resize::{Filter, ModelResizer};
pub use scratch::{ScratchPolicy, Workspace};
