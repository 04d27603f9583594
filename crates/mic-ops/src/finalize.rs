//! Output finalization: clip, restore the sample type, persist.

use std::path::Path;

use mic_core::{ImageStack, Sample, SampleType, StackData};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::scratch::Workspace;
use crate::{OpsError, OpsResult};

/// Clips a corrected value into `[0, max]`.
///
/// Two ordered comparisons: anything not `>= 0` (negatives, NaN) becomes 0,
/// then anything not `<= max` (including +inf) becomes `max`.
#[inline]
pub fn clamp_to_range(value: f64, max: f64) -> f64 {
    let v = if value >= 0.0 { value } else { 0.0 };
    if v <= max { v } else { max }
}

fn cast_into<T: Sample>(src: &[f64]) -> Vec<T> {
    let max = T::TYPE.max_value();
    src.par_iter().map(|&v| T::from_f64(clamp_to_range(v, max))).collect()
}

/// Converts a workspace back into an integer stack of `sample_type` and
/// releases the workspace.
pub fn finalize(workspace: Workspace, sample_type: SampleType) -> OpsResult<ImageStack> {
    let shape = workspace.shape();
    trace!(shape = ?shape.dims(), %sample_type, "finalize");

    let data = {
        let src = workspace.as_slice();
        match sample_type {
            SampleType::U8 => StackData::U8(cast_into(src)),
            SampleType::U16 => StackData::U16(cast_into(src)),
            SampleType::U32 => StackData::U32(cast_into(src)),
        }
    };
    workspace.release();

    Ok(ImageStack::new(shape, data)?)
}

/// Writes a finalized stack, tagged with its axis layout.
pub fn persist(path: &Path, stack: &ImageStack) -> OpsResult<()> {
    mic_io::tiff::write_stack(path, stack).map_err(|source| OpsError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        path = %path.display(),
        axes = stack.shape().axes().as_str(),
        "persisted stack"
    );
    Ok(())
}
