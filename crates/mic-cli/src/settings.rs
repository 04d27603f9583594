//! Run settings: defaults, optional YAML file, command-line overrides.
//!
//! ```yaml
//! field: /data/models
//! objective: tpfm_nikon10x
//! wavelengths: [618, 530, -1]
//! mode: 1
//! threads: 8
//! scratch: disk
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mic_core::CorrectionMode;
use serde::Deserialize;

use crate::Cli;

/// Correction mode as written by the user: `1` or `dynamic-range-corrected`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ModeSetting {
    /// Integer code.
    Code(i64),
    /// Code or name as text.
    Name(String),
}

impl ModeSetting {
    /// Resolves to a correction mode.
    pub fn resolve(&self) -> Result<CorrectionMode> {
        let mode = match self {
            ModeSetting::Code(c) => CorrectionMode::try_from(*c)?,
            ModeSetting::Name(n) => n.parse::<CorrectionMode>()?,
        };
        Ok(mode)
    }
}

/// Effective settings of a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Calibration model root.
    pub field: PathBuf,
    /// Field file extension (`tif`, `txt`, ...).
    pub field_ext: String,
    /// Objective name.
    pub objective: String,
    /// Wavelength per channel, negative to skip.
    pub wavelengths: Vec<i64>,
    /// Correction mode.
    pub mode: ModeSetting,
    /// Accepted stack extensions.
    pub formats: Vec<String>,
    /// Worker cap, 0 = all cores.
    pub threads: usize,
    /// `memory`, `disk` or `auto`.
    pub scratch: String,
    /// Heap budget for `auto`, in MiB.
    pub max_heap_mb: u64,
    /// Directory for disk workspaces; defaults to the output directory.
    pub scratch_dir: Option<PathBuf>,
    /// Resampling filter name.
    pub filter: String,
    /// `clamp` or `reject`.
    pub nan: String,
    /// Stop at the first failing stack.
    pub abort_on_error: bool,
    /// Optional log file.
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            field: PathBuf::from("models"),
            field_ext: "tif".into(),
            objective: "tpfm_zeiss25x".into(),
            wavelengths: vec![618, 482, -1],
            mode: ModeSetting::Code(0),
            formats: vec!["tif".into(), "tiff".into()],
            threads: 0,
            scratch: "auto".into(),
            max_heap_mb: mic_ops::scratch::DEFAULT_MAX_HEAP_BYTES / (1024 * 1024),
            scratch_dir: None,
            filter: "bilinear".into(),
            nan: "clamp".into(),
            abort_on_error: false,
            log_file: None,
        }
    }
}

impl Settings {
    /// Reads a YAML settings file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid settings {}", path.display()))
    }

    /// Parses YAML settings text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Applies command-line values on top.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = &cli.field {
            self.field = v.clone();
        }
        if let Some(v) = &cli.field_ext {
            self.field_ext = v.clone();
        }
        if let Some(v) = &cli.objective {
            self.objective = v.clone();
        }
        if let Some(v) = &cli.wavelength {
            self.wavelengths = v.clone();
        }
        if let Some(v) = &cli.mode {
            self.mode = ModeSetting::Name(v.clone());
        }
        if let Some(v) = &cli.fmt {
            self.formats = v.clone();
        }
        if let Some(v) = cli.threads {
            self.threads = v;
        }
        if let Some(v) = &cli.scratch {
            self.scratch = v.clone();
        }
        if let Some(v) = cli.max_heap_mb {
            self.max_heap_mb = v;
        }
        if let Some(v) = &cli.scratch_dir {
            self.scratch_dir = Some(v.clone());
        }
        if let Some(v) = &cli.filter {
            self.filter = v.clone();
        }
        if let Some(v) = &cli.nan {
            self.nan = v.clone();
        }
        if cli.abort_on_error {
            self.abort_on_error = true;
        }
        if let Some(v) = &cli.log_file {
            self.log_file = Some(v.clone());
        }
    }

    /// Workspace placement policy.
    pub fn scratch_policy(&self) -> Result<mic_ops::ScratchPolicy> {
        use mic_ops::ScratchPolicy;
        match self.scratch.to_ascii_lowercase().as_str() {
            "memory" | "heap" => Ok(ScratchPolicy::Memory),
            "disk" | "mmap" => Ok(ScratchPolicy::Disk),
            "auto" => Ok(ScratchPolicy::Auto {
                max_heap_bytes: self.max_heap_mb.saturating_mul(1024 * 1024),
            }),
            other => anyhow::bail!("Unknown scratch policy '{other}' (memory, disk, auto)"),
        }
    }
}
