//! Input stack discovery.

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::error::{IoError, IoResult};

/// Extensions accepted when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// Lists the stacks to correct.
///
/// A file `source` is returned as is. A directory is scanned non-recursively
/// for files whose extension matches one of `extensions` (case-insensitive);
/// the result is sorted by path.
pub fn discover_stacks<S: AsRef<str>>(source: &Path, extensions: &[S]) -> IoResult<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    if !source.is_dir() {
        return Err(IoError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", source.display()),
        )));
    }

    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let pattern = format!("{}/*", Pattern::escape(&source.to_string_lossy()));
    let entries = glob::glob(&pattern).map_err(|e| IoError::Parse(e.to_string()))?;

    let mut stacks: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| wanted.iter().any(|w| w.eq_ignore_ascii_case(e)))
        })
        .collect();
    stacks.sort();
    Ok(stacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.tif", "a.TIFF", "c.png", "notes.txt"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(tmp.path().join("sub.tif")).unwrap();

        let found = discover_stacks(tmp.path(), DEFAULT_EXTENSIONS).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.TIFF", "b.tif"]);
    }

    #[test]
    fn test_single_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("x.dat");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(discover_stacks(&file, &["tif"]).unwrap(), vec![file]);
    }

    #[test]
    fn test_missing_source() {
        assert!(discover_stacks(Path::new("/nonexistent/dir"), DEFAULT_EXTENSIONS).is_err());
    }
}
