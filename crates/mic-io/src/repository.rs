//! Calibration-model repository.
//!
//! Fields live under `<root>/<objective>/<wavelength>/{v,z}.<ext>`, with the
//! objective name lowercased. A channel whose fields cannot be read is not an
//! error: it degrades to an identity channel and the load summary says so.

use std::path::{Path, PathBuf};

use mic_core::{CalibrationModel, ChannelKind, ChannelSource, Field};
use tracing::{info, trace, warn};

use crate::error::{IoError, IoResult};

/// On-disk format of calibration fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldFormat {
    /// Single-page grayscale TIFF (`v.tif`, `z.tif`).
    #[default]
    Tiff,
    /// Delimited-text matrix (`v.txt`, `z.txt`).
    Text,
}

impl FieldFormat {
    /// Default file extension.
    pub fn extension(self) -> &'static str {
        match self {
            FieldFormat::Tiff => "tif",
            FieldFormat::Text => "txt",
        }
    }

    /// Picks the format implied by an extension (`tif`, `tiff`, `txt`, `csv`, `tsv`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "tif" | "tiff" => Some(FieldFormat::Tiff),
            "txt" | "csv" | "tsv" => Some(FieldFormat::Text),
            _ => None,
        }
    }

    fn read(self, path: &Path) -> IoResult<Field> {
        match self {
            FieldFormat::Tiff => crate::tiff::read_field(path),
            FieldFormat::Text => crate::text::read_field(path),
        }
    }
}

/// Display label of channel `index`: `R`, `G`, `B`, then `C3`, `C4`, ...
pub fn channel_label(index: usize) -> String {
    match index {
        0 => "R".into(),
        1 => "G".into(),
        2 => "B".into(),
        n => format!("C{n}"),
    }
}

/// Converts raw wavelength arguments; negative values mean "no channel".
pub fn parse_wavelengths(raw: &[i64]) -> IoResult<Vec<Option<u32>>> {
    raw.iter()
        .map(|&w| {
            if w < 0 {
                Ok(None)
            } else {
                u32::try_from(w)
                    .map(Some)
                    .map_err(|_| IoError::Parse(format!("wavelength {w} out of range")))
            }
        })
        .collect()
}

/// Loads calibration models from a directory tree.
#[derive(Debug, Clone)]
pub struct ModelRepository {
    root: PathBuf,
    format: FieldFormat,
    extension: String,
}

impl ModelRepository {
    /// Repository rooted at `root`, reading fields in `format`.
    pub fn new(root: impl Into<PathBuf>, format: FieldFormat) -> Self {
        Self {
            root: root.into(),
            format,
            extension: format.extension().to_string(),
        }
    }

    /// Overrides the field file extension (e.g. `tiff`).
    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    /// Path of field `name` (`"v"` or `"z"`) for an objective and wavelength.
    pub fn field_path(&self, objective: &str, wavelength: u32, name: &str) -> PathBuf {
        self.root
            .join(objective.to_lowercase())
            .join(wavelength.to_string())
            .join(format!("{name}.{}", self.extension))
    }

    /// Reads the gain/offset pair of one channel.
    pub fn load_channel(&self, objective: &str, wavelength: u32) -> IoResult<ChannelSource> {
        let gain = self.format.read(&self.field_path(objective, wavelength, "v"))?;
        let offset = self.format.read(&self.field_path(objective, wavelength, "z"))?;
        if gain.shape() != offset.shape() {
            return Err(IoError::DimensionMismatch {
                expected: format!("{:?} (v)", gain.shape()),
                actual: format!("{:?} (z)", offset.shape()),
            });
        }
        Ok(ChannelSource::Available {
            wavelength,
            gain,
            offset,
        })
    }

    /// Builds the model for `objective`, one channel per wavelength entry.
    ///
    /// `None` entries and unreadable channels become identity channels.
    /// Fails when no channel could be loaded or the loaded ones disagree in
    /// shape.
    pub fn load(&self, objective: &str, wavelengths: &[Option<u32>]) -> IoResult<CalibrationModel> {
        trace!(objective, root = %self.root.display(), "ModelRepository::load");

        let model_err = |reason: String| IoError::ModelLoad {
            objective: objective.to_string(),
            reason,
        };
        if wavelengths.is_empty() {
            return Err(model_err("no wavelengths requested".into()));
        }

        let sources: Vec<ChannelSource> = wavelengths
            .iter()
            .enumerate()
            .map(|(c, wl)| match wl {
                None => ChannelSource::Identity,
                Some(w) => match self.load_channel(objective, *w) {
                    Ok(source) => source,
                    Err(e) => {
                        warn!(
                            channel = %channel_label(c),
                            wavelength = w,
                            error = %e,
                            "calibration not available, channel left uncorrected"
                        );
                        ChannelSource::Identity
                    }
                },
            })
            .collect();

        let model = CalibrationModel::from_channels(sources).map_err(|e| model_err(e.to_string()))?;

        let summary: Vec<String> = model
            .kinds()
            .iter()
            .zip(wavelengths)
            .enumerate()
            .map(|(c, (kind, wl))| match (kind, wl) {
                (ChannelKind::Measured(w), _) => format!("{} ({w}nm)", channel_label(c)),
                (ChannelKind::Identity, Some(w)) => format!("{} ({w}nm not available)", channel_label(c)),
                (ChannelKind::Identity, None) => format!("{} (skipped)", channel_label(c)),
            })
            .collect();
        let (height, width) = model.lateral_shape();
        info!(
            objective,
            height,
            width,
            channels = %summary.join(", "),
            "loaded calibration model"
        );

        Ok(model)
    }
}
