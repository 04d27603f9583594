//! mic - microscopy illumination correction
//!
//! Corrects spatial illumination non-uniformity of TIFF z-stacks with
//! precomputed flat-field (`v`) and dark-field (`z`) models.

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::{error, info, trace};

use mic_io::{FieldFormat, ModelRepository, discover_stacks, parse_wavelengths};
use mic_ops::{FailurePolicy, NanPolicy, PipelineConfig, correct_dataset};

mod logging;
mod output;
mod settings;

use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "mic")]
#[command(author, version, about = "Microscopy illumination correction")]
#[command(long_about = "
Corrects spatial illumination non-uniformity of TIFF z-stacks using
flat-field (v) and dark-field (z) models stored as

  <field>/<objective>/<wavelength>/v.tif
  <field>/<objective>/<wavelength>/z.tif

Correction modes (v̄, z̄: spatial means of v and z):
  0  zero-light-preserved      z̄ + v̄·(I - z)/v
  1  dynamic-range-corrected   v̄·(I - z)/v
  2  direct                    (I - z)/v

Examples:
  mic /data/stacks -o tpfm_nikon10x -m 1 -w 618 530 -1
  mic stack.tif -f models/ -w 530 -j 8
  mic /data/stacks --config mic.yaml --scratch disk
")]
pub struct Cli {
    /// TIFF stack, or directory containing multiple stacks
    source: PathBuf,

    /// Output path (default: next to the source)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Root of the flat/dark-field models [default: models]
    #[arg(short, long)]
    field: Option<PathBuf>,

    /// Field file extension: tif, tiff or txt [default: tif]
    #[arg(long)]
    field_ext: Option<String>,

    /// Objective [default: tpfm_zeiss25x]
    #[arg(short, long)]
    objective: Option<String>,

    /// Wavelength per channel in nm, -1 skips a channel [default: 618 482 -1]
    #[arg(short, long, num_args = 1.., allow_negative_numbers = true)]
    wavelength: Option<Vec<i64>>,

    /// Correction mode: 0, 1, 2 or its name [default: 0]
    #[arg(short, long)]
    mode: Option<String>,

    /// Input stack extensions [default: tif tiff]
    #[arg(long, num_args = 1..)]
    fmt: Option<Vec<String>>,

    /// Number of worker threads (0 = auto, honours OMP_NUM_THREADS)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Workspace placement: memory, disk or auto [default: auto]
    #[arg(long)]
    scratch: Option<String>,

    /// Largest in-memory workspace for --scratch auto, in MiB
    #[arg(long)]
    max_heap_mb: Option<u64>,

    /// Directory for disk workspaces (default: output directory)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Model resampling filter: nearest, bilinear, bicubic, lanczos3 [default: bilinear]
    #[arg(long)]
    filter: Option<String>,

    /// NaN handling: clamp (to zero) or reject [default: clamp]
    #[arg(long)]
    nan: Option<String>,

    /// Stop at the first failing stack
    #[arg(long)]
    abort_on_error: bool,

    /// YAML settings file; command-line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply_cli(&cli);

    logging::init(cli.verbose, settings.log_file.as_deref())?;
    trace!(?settings, "resolved settings");

    run(&cli, &settings)
}

fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    let mode = settings.mode.resolve().context("Invalid correction mode")?;
    let wavelengths = parse_wavelengths(&settings.wavelengths).context("Invalid wavelengths")?;
    let field_format = FieldFormat::from_extension(&settings.field_ext)
        .with_context(|| format!("Unsupported field extension '{}'", settings.field_ext))?;

    let config = PipelineConfig {
        mode,
        workers: settings.threads,
        scratch: settings.scratch_policy()?,
        scratch_dir: settings.scratch_dir.clone(),
        filter: settings.filter.parse().context("Invalid resampling filter")?,
        nan_policy: settings.nan.parse::<NanPolicy>().context("Invalid NaN policy")?,
        failure_policy: if settings.abort_on_error {
            FailurePolicy::AbortBatch
        } else {
            FailurePolicy::ContinueBatch
        },
    };

    output::heading(mode, &settings.objective);

    let stacks = discover_stacks(&cli.source, &settings.formats[..])
        .with_context(|| format!("Failed to list stacks in {}", cli.source.display()))?;
    if stacks.is_empty() {
        bail!(
            "No stacks with extensions [{}] in {}",
            settings.formats.join(", "),
            cli.source.display()
        );
    }

    let dest = output::create_save_dir(&cli.source, cli.dest.as_deref(), &settings.objective, mode)?;
    info!(stacks = stacks.len(), dest = %dest.display(), "found input stacks");

    let repo = ModelRepository::new(&settings.field, field_format).with_extension(&settings.field_ext);
    let report = correct_dataset(&repo, &settings.objective, &wavelengths, &stacks, &dest, &config)
        .context("Correction failed")?;

    for failure in &report.failures {
        error!(stack = %failure.path.display(), error = %failure.error, "not corrected");
    }
    println!(
        "Processed: {} corrected, {} failed, {} skipped",
        report.corrected.len(),
        report.failures.len(),
        report.skipped
    );

    if !report.is_success() {
        bail!("{} of {} stacks failed", report.failures.len(), stacks.len());
    }
    Ok(())
}
