//! Parallel per-slice correction using Rayon.
//!
//! Each depth slice of a stack is corrected independently into its own
//! disjoint chunk of the [`Workspace`], so the fan-out needs no locks and the
//! result does not depend on the number of workers or on scheduling order.
//!
//! # Example
//!
//! ```rust,ignore
//! use mic_ops::parallel::SliceProcessor;
//! use mic_core::CorrectionMode;
//!
//! let processor = SliceProcessor::new().with_workers(8);
//! let workspace = processor.process(&stack, &model, CorrectionMode::ZeroPreserved)?;
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use mic_core::kernel::{correct_slice, count_nan};
use mic_core::{CalibrationModel, CorrectionMode, ImageStack, Sample, StackData};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::scratch::{ScratchPolicy, Workspace};
use crate::{OpsError, OpsResult};

/// Handling of NaN samples produced by the correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NanPolicy {
    /// Let NaN through; finalization maps it to 0.
    #[default]
    ClampToZero,
    /// Fail the slice that produced a NaN.
    Reject,
}

impl FromStr for NanPolicy {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clamp" | "zero" | "clamp-to-zero" => Ok(NanPolicy::ClampToZero),
            "reject" | "error" => Ok(NanPolicy::Reject),
            other => Err(OpsError::InvalidArgument(format!("unknown NaN policy '{other}'"))),
        }
    }
}

/// Cores available to the process.
///
/// `OMP_NUM_THREADS` takes precedence when set to a positive integer.
pub fn available_cores() -> usize {
    resolve_cores(
        std::env::var("OMP_NUM_THREADS").ok().as_deref(),
        std::thread::available_parallelism().ok().map(|n| n.get()),
    )
}

fn resolve_cores(omp_num_threads: Option<&str>, detected: Option<usize>) -> usize {
    omp_num_threads
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .or(detected)
        .unwrap_or(1)
}

/// Corrects all depth slices of a stack on a bounded worker pool.
#[derive(Debug, Clone)]
pub struct SliceProcessor {
    workers: Option<usize>,
    scratch: ScratchPolicy,
    scratch_root: PathBuf,
    nan_policy: NanPolicy,
}

impl Default for SliceProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SliceProcessor {
    /// Processor using all available cores, default scratch policy, scratch
    /// files under the system temporary directory.
    pub fn new() -> Self {
        Self {
            workers: None,
            scratch: ScratchPolicy::default(),
            scratch_root: std::env::temp_dir(),
            nan_policy: NanPolicy::default(),
        }
    }

    /// Caps the number of workers (0 means all available cores).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = (workers > 0).then_some(workers);
        self
    }

    /// Sets where the workspace is kept.
    pub fn with_scratch(mut self, policy: ScratchPolicy, root: impl Into<PathBuf>) -> Self {
        self.scratch = policy;
        self.scratch_root = root.into();
        self
    }

    /// Sets the NaN policy.
    pub fn with_nan_policy(mut self, policy: NanPolicy) -> Self {
        self.nan_policy = policy;
        self
    }

    /// Workers used for a stack of `depth` slices: never more than slices.
    pub fn worker_count(&self, depth: usize) -> usize {
        self.workers
            .unwrap_or_else(available_cores)
            .min(depth)
            .max(1)
    }

    /// Corrects `stack` with `model` into a new workspace.
    ///
    /// The model must already match the stack's lateral shape and channel
    /// count. If any slice fails, the workspace is released and the failing
    /// slice is reported as [`OpsError::SliceTask`].
    pub fn process(
        &self,
        stack: &ImageStack,
        model: &CalibrationModel,
        mode: CorrectionMode,
    ) -> OpsResult<Workspace> {
        let shape = stack.shape();
        trace!(shape = ?shape.dims(), mode = mode.name(), "SliceProcessor::process");

        model.check_fits(&shape).map_err(OpsError::ModelMismatch)?;

        let mut workspace = Workspace::allocate(shape, self.scratch, &self.scratch_root)?;
        let workers = self.worker_count(shape.depth);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("mic-slice-{i}"))
            .build()
            .map_err(|e| OpsError::ThreadPool(e.to_string()))?;

        debug!(depth = shape.depth, workers, "correcting slices");

        let out = workspace.as_mut_slice();
        let nan_policy = self.nan_policy;
        pool.install(|| match stack.data() {
            StackData::U8(d) => correct_slices(d, out, model, mode, nan_policy),
            StackData::U16(d) => correct_slices(d, out, model, mode, nan_policy),
            StackData::U32(d) => correct_slices(d, out, model, mode, nan_policy),
        })?;

        Ok(workspace)
    }
}

fn correct_slices<T: Sample>(
    input: &[T],
    out: &mut [f64],
    model: &CalibrationModel,
    mode: CorrectionMode,
    nan_policy: NanPolicy,
) -> OpsResult<()> {
    let slice_len = model.slice_len();
    out.par_chunks_mut(slice_len)
        .zip(input.par_chunks(slice_len))
        .enumerate()
        .try_for_each(|(index, (dst, src))| {
            correct_slice(src, dst, model, mode).map_err(|source| OpsError::SliceTask { index, source })?;
            if nan_policy == NanPolicy::Reject {
                let count = count_nan(dst);
                if count > 0 {
                    return Err(OpsError::SliceTask {
                        index,
                        source: mic_core::Error::NonFinite { count },
                    });
                }
            }
            Ok(())
        })
}
