//! Output directory naming and the run heading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mic_core::CorrectionMode;
use tracing::info;

/// Name of the directory corrected stacks are written to.
pub fn save_dir_name(objective: &str, mode: CorrectionMode) -> String {
    format!("flat-field-corrected_{objective}_mode{}", mode.code())
}

/// Creates `<base>/flat-field-corrected_<objective>_mode<mode>`.
///
/// `base` is `dest` when given, otherwise the source directory (or the
/// directory containing a single source file).
pub fn create_save_dir(source: &Path, dest: Option<&Path>, objective: &str, mode: CorrectionMode) -> Result<PathBuf> {
    let base = match dest {
        Some(d) => d.to_path_buf(),
        None if source.is_file() => source.parent().map(Path::to_path_buf).unwrap_or_default(),
        None => source.to_path_buf(),
    };
    let dir = base.join(save_dir_name(objective, mode));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

/// Logs the run heading.
pub fn heading(mode: CorrectionMode, objective: &str) {
    info!("Microscopy illumination correction");
    info!(mode = mode.name(), objective, "settings");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dir_name() {
        assert_eq!(
            save_dir_name("tpfm_nikon10x", CorrectionMode::DynamicRangeCorrected),
            "flat-field-corrected_tpfm_nikon10x_mode1"
        );
    }

    #[test]
    fn test_dir_next_to_source() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("stack.tif");
        std::fs::write(&file, b"").unwrap();

        let from_file = create_save_dir(&file, None, "obj", CorrectionMode::ZeroPreserved).unwrap();
        assert_eq!(from_file, tmp.path().join("flat-field-corrected_obj_mode0"));
        assert!(from_file.is_dir());

        let from_dir = create_save_dir(tmp.path(), None, "obj", CorrectionMode::Direct).unwrap();
        assert_eq!(from_dir, tmp.path().join("flat-field-corrected_obj_mode2"));

        let dest = tmp.path().join("elsewhere");
        let explicit = create_save_dir(&file, Some(&dest), "obj", CorrectionMode::Direct).unwrap();
        assert!(explicit.starts_with(&dest) && explicit.is_dir());
    }
}
