//! Delimited-text calibration fields.
//!
//! Older calibration sets store `v`/`z` as plain text matrices, one row per
//! line. Values may be separated by tabs, commas or runs of spaces. Blank
//! lines and lines starting with `#` are skipped.

use std::fs;
use std::path::Path;

use mic_core::Field;

use crate::error::{IoError, IoResult};

/// Parses a text matrix into a [`Field`].
pub fn parse_field(text: &str) -> IoResult<Field> {
    let mut width = None;
    let mut data = Vec::new();
    let mut height = 0usize;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let before = data.len();
        for token in line
            .split(|c: char| c == '\t' || c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value: f64 = token.parse().map_err(|_| {
                IoError::Parse(format!("line {}: invalid number '{token}'", lineno + 1))
            })?;
            data.push(value);
        }

        let row_len = data.len() - before;
        match width {
            None => width = Some(row_len),
            Some(w) if w != row_len => {
                return Err(IoError::DimensionMismatch {
                    expected: format!("{w} values per row"),
                    actual: format!("{row_len} on line {}", lineno + 1),
                });
            }
            Some(_) => {}
        }
        height += 1;
    }

    let width = width.ok_or_else(|| IoError::Parse("empty field".into()))?;
    Ok(Field::new(height, width, data)?)
}

/// Reads a text field from disk.
pub fn read_field<P: AsRef<Path>>(path: P) -> IoResult<Field> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    parse_field(&text).map_err(|e| match e {
        IoError::Parse(msg) => IoError::Parse(format!("{}: {msg}", path.display())),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_delimited() {
        let f = parse_field("1\t2\t3\n4\t5\t6\n").unwrap();
        assert_eq!(f.shape(), (2, 3));
        assert_eq!(f.data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_mixed_separators_and_comments() {
        let f = parse_field("# flat field\n1.5, 2.5\n\n  3.5   4.5\n").unwrap();
        assert_eq!(f.shape(), (2, 2));
        assert_eq!(f.data()[3], 4.5);
    }

    #[test]
    fn test_ragged_rows() {
        let err = parse_field("1 2 3\n4 5\n").unwrap_err();
        assert!(matches!(err, IoError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_bad_token() {
        assert!(matches!(parse_field("1 x\n").unwrap_err(), IoError::Parse(_)));
        assert!(matches!(parse_field("# only\n").unwrap_err(), IoError::Parse(_)));
    }
}
