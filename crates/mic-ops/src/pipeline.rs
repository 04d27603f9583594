//! Stack pipeline: per-stack orchestration and batch iteration.
//!
//! One calibration model is shared by a whole batch. For every stack the
//! pipeline reads the file, fits the model to the stack's lateral shape
//! (cached between stacks of equal shape), corrects all slices in parallel,
//! drops the input, then clips, casts and writes the result under `dest`
//! with the input's file name. Stacks are processed one after another.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use mic_core::{CalibrationModel, CorrectionMode};
use mic_io::{IoError, ModelRepository};
use tracing::{error, info, trace, warn};

use crate::finalize::{finalize, persist};
use crate::parallel::{NanPolicy, SliceProcessor};
use crate::resize::{Filter, ModelResizer};
use crate::scratch::ScratchPolicy;
use crate::{OpsError, OpsResult};

/// What to do when one stack of a batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and go on with the next stack.
    #[default]
    ContinueBatch,
    /// Stop at the first failure.
    AbortBatch,
}

/// Pipeline settings.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Correction formula.
    pub mode: CorrectionMode,
    /// Worker cap per stack; 0 uses all available cores.
    pub workers: usize,
    /// Workspace placement.
    pub scratch: ScratchPolicy,
    /// Directory for disk-backed workspaces; defaults to the destination.
    pub scratch_dir: Option<PathBuf>,
    /// Model resampling filter.
    pub filter: Filter,
    /// NaN handling.
    pub nan_policy: NanPolicy,
    /// Batch failure handling.
    pub failure_policy: FailurePolicy,
}

/// A stack that could not be corrected.
#[derive(Debug)]
pub struct StackFailure {
    /// Input stack.
    pub path: PathBuf,
    /// Why it failed.
    pub error: OpsError,
}

/// Outcome of a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Written output files, in processing order.
    pub corrected: Vec<PathBuf>,
    /// Failed stacks, in processing order.
    pub failures: Vec<StackFailure>,
    /// Stacks never attempted because the batch was aborted.
    pub skipped: usize,
}

impl BatchReport {
    /// `true` when every stack was corrected.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }

    /// Number of stacks attempted.
    pub fn attempted(&self) -> usize {
        self.corrected.len() + self.failures.len()
    }
}

/// Corrects stacks with one calibration model.
pub struct StackPipeline {
    model: Arc<CalibrationModel>,
    resizer: ModelResizer,
    processor: SliceProcessor,
    mode: CorrectionMode,
    failure_policy: FailurePolicy,
    dest: PathBuf,
}

impl StackPipeline {
    /// Pipeline writing into `dest`.
    pub fn new(model: impl Into<Arc<CalibrationModel>>, dest: impl Into<PathBuf>, config: &PipelineConfig) -> Self {
        let dest = dest.into();
        let scratch_root = config.scratch_dir.clone().unwrap_or_else(|| dest.clone());
        let processor = SliceProcessor::new()
            .with_workers(config.workers)
            .with_scratch(config.scratch, scratch_root)
            .with_nan_policy(config.nan_policy);
        Self {
            model: model.into(),
            resizer: ModelResizer::new(config.filter),
            processor,
            mode: config.mode,
            failure_policy: config.failure_policy,
            dest,
        }
    }

    /// The model resizer and its cache statistics.
    pub fn resizer(&self) -> &ModelResizer {
        &self.resizer
    }

    /// Where the corrected version of `input` is written.
    pub fn output_path(&self, input: &Path) -> OpsResult<PathBuf> {
        input
            .file_name()
            .map(|name| self.dest.join(name))
            .ok_or_else(|| OpsError::Read {
                path: input.to_path_buf(),
                source: IoError::InvalidFile("path has no file name".into()),
            })
    }

    /// Corrects one stack and returns the output path.
    pub fn correct_stack(&mut self, input: &Path) -> OpsResult<PathBuf> {
        trace!(input = %input.display(), "StackPipeline::correct_stack");
        let output = self.output_path(input)?;

        let stack = mic_io::tiff::read_stack(input).map_err(|source| OpsError::Read {
            path: input.to_path_buf(),
            source,
        })?;
        let shape = stack.shape();
        let sample_type = stack.sample_type();

        let model = self.resizer.resize(&self.model, shape.lateral())?;
        let workspace = self.processor.process(&stack, &model, self.mode)?;
        drop(stack);

        let corrected = finalize(workspace, sample_type)?;
        std::fs::create_dir_all(&self.dest).map_err(|e| OpsError::Persist {
            path: self.dest.clone(),
            source: IoError::Io(e),
        })?;
        persist(&output, &corrected)?;
        Ok(output)
    }

    /// Corrects `stacks` in order, collecting failures per the failure policy.
    pub fn run(&mut self, stacks: &[PathBuf]) -> BatchReport {
        let total = stacks.len();
        info!(stacks = total, dest = %self.dest.display(), mode = self.mode.name(), "starting batch");

        let mut report = BatchReport::default();
        for (i, input) in stacks.iter().enumerate() {
            let started = Instant::now();
            match self.correct_stack(input) {
                Ok(output) => {
                    info!(
                        index = i + 1,
                        total,
                        input = %input.display(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "corrected stack"
                    );
                    report.corrected.push(output);
                }
                Err(e) => {
                    error!(index = i + 1, total, input = %input.display(), error = %e, "stack failed");
                    report.failures.push(StackFailure {
                        path: input.clone(),
                        error: e,
                    });
                    if self.failure_policy == FailurePolicy::AbortBatch {
                        report.skipped = total - i - 1;
                        warn!(skipped = report.skipped, "batch aborted");
                        break;
                    }
                }
            }
        }

        info!(
            success = report.corrected.len(),
            failed = report.failures.len(),
            skipped = report.skipped,
            resamples = self.resizer.resample_count(),
            "batch complete"
        );
        report
    }
}

/// Loads the model for `objective` once and corrects every stack with it.
///
/// A model that cannot be loaded fails the whole batch; per-stack failures
/// end up in the report.
pub fn correct_dataset(
    repo: &ModelRepository,
    objective: &str,
    wavelengths: &[Option<u32>],
    stacks: &[PathBuf],
    dest: &Path,
    config: &PipelineConfig,
) -> OpsResult<BatchReport> {
    let model = repo.load(objective, wavelengths)?;
    let mut pipeline = StackPipeline::new(model, dest, config);
    Ok(pipeline.run(stacks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mic_core::{ImageStack, StackData, StackShape};
    use tempfile::TempDir;

    fn write_gray(path: &Path, d: usize, h: usize, w: usize, value: u16) {
        let shape = StackShape::zyx(d, h, w);
        let stack = ImageStack::new(shape, vec![value; shape.len()]).unwrap();
        mic_io::tiff::write_stack(path, &stack).unwrap();
    }

    #[test]
    fn test_output_path() {
        let p = StackPipeline::new(CalibrationModel::identity(2, 2, 1), "/out", &PipelineConfig::default());
        assert_eq!(p.output_path(Path::new("/in/a.tif")).unwrap(), PathBuf::from("/out/a.tif"));
        assert!(p.output_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_identity_batch() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.tif");
        write_gray(&src, 2, 4, 4, 1234);
        let dest = tmp.path().join("out");

        let config = PipelineConfig {
            scratch: ScratchPolicy::Disk,
            ..Default::default()
        };
        let mut p = StackPipeline::new(CalibrationModel::identity(4, 4, 1), &dest, &config);
        let report = p.run(&[src]);
        assert!(report.is_success());

        let out = mic_io::tiff::read_stack(&report.corrected[0]).unwrap();
        assert_eq!(out.data(), &StackData::U16(vec![1234; 32]));
        // only the output file remains, no scratch directories
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 1);
    }

    #[test]
    fn test_abort_policy_skips_rest() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.tif");
        write_gray(&good, 1, 4, 4, 1);
        let stacks = vec![tmp.path().join("missing.tif"), good.clone(), good];

        let config = PipelineConfig {
            failure_policy: FailurePolicy::AbortBatch,
            ..Default::default()
        };
        let mut p = StackPipeline::new(CalibrationModel::identity(4, 4, 1), tmp.path().join("out"), &config);
        let report = p.run(&stacks);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, OpsError::Read { .. }));
        assert_eq!(report.skipped, 2);
        assert!(report.corrected.is_empty());
    }
}
