//! Correction modes.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How the flat/dark-field model is applied to a pixel.
///
/// With `I` the acquired value, `v`/`z` the local gain/offset and
/// `v̄`/`z̄` their spatial means:
///
/// | mode | output |
/// |---|---|
/// | [`ZeroPreserved`](Self::ZeroPreserved) | `z̄ + v̄·(I − z)/v` |
/// | [`DynamicRangeCorrected`](Self::DynamicRangeCorrected) | `v̄·(I − z)/v` |
/// | [`Direct`](Self::Direct) | `(I − z)/v` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CorrectionMode {
    /// Re-centers the output around the mean dark offset.
    #[default]
    ZeroPreserved,
    /// Normalizes by the mean gain without re-adding the offset.
    DynamicRangeCorrected,
    /// Raw division, no mean-based renormalization.
    Direct,
}

impl CorrectionMode {
    /// All modes, in integer order.
    pub const ALL: [CorrectionMode; 3] = [
        CorrectionMode::ZeroPreserved,
        CorrectionMode::DynamicRangeCorrected,
        CorrectionMode::Direct,
    ];

    /// Integer code used on the command line (`0`, `1`, `2`).
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            CorrectionMode::ZeroPreserved => 0,
            CorrectionMode::DynamicRangeCorrected => 1,
            CorrectionMode::Direct => 2,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            CorrectionMode::ZeroPreserved => "zero-light-preserved",
            CorrectionMode::DynamicRangeCorrected => "dynamic-range-corrected",
            CorrectionMode::Direct => "direct",
        }
    }

    /// Applies the mode to one sample.
    ///
    /// No guard on `v`: a zero gain yields `inf` or `NaN`, which is resolved
    /// downstream by clipping.
    #[inline(always)]
    pub fn apply(self, i: f64, v: f64, z: f64, v_mean: f64, z_mean: f64) -> f64 {
        match self {
            CorrectionMode::ZeroPreserved => z_mean + v_mean * ((i - z) / v),
            CorrectionMode::DynamicRangeCorrected => v_mean * ((i - z) / v),
            CorrectionMode::Direct => (i - z) / v,
        }
    }
}

impl TryFrom<i64> for CorrectionMode {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(CorrectionMode::ZeroPreserved),
            1 => Ok(CorrectionMode::DynamicRangeCorrected),
            2 => Ok(CorrectionMode::Direct),
            other => Err(Error::UnknownMode(other)),
        }
    }
}

impl TryFrom<u8> for CorrectionMode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        CorrectionMode::try_from(code as i64)
    }
}

impl FromStr for CorrectionMode {
    type Err = Error;

    /// Accepts the integer code or the mode name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return CorrectionMode::try_from(code);
        }
        CorrectionMode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or(Error::UnknownMode(-1))
    }
}

impl fmt::Display for CorrectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for mode in CorrectionMode::ALL {
            assert_eq!(CorrectionMode::try_from(mode.code()).unwrap(), mode);
        }
        assert!(CorrectionMode::try_from(3i64).is_err());
        assert!(CorrectionMode::try_from(-1i64).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("1".parse::<CorrectionMode>().unwrap(), CorrectionMode::DynamicRangeCorrected);
        assert_eq!("Direct".parse::<CorrectionMode>().unwrap(), CorrectionMode::Direct);
        assert!("bogus".parse::<CorrectionMode>().is_err());
    }

    #[test]
    fn test_apply_formulas() {
        let (i, v, z, vm, zm) = (100.0, 2.0, 10.0, 1.5, 4.0);
        assert_eq!(CorrectionMode::Direct.apply(i, v, z, vm, zm), 45.0);
        assert_eq!(CorrectionMode::DynamicRangeCorrected.apply(i, v, z, vm, zm), 67.5);
        assert_eq!(CorrectionMode::ZeroPreserved.apply(i, v, z, vm, zm), 71.5);
    }

    #[test]
    fn test_zero_gain_is_not_guarded() {
        assert!(CorrectionMode::Direct.apply(5.0, 0.0, 0.0, 1.0, 0.0).is_infinite());
        assert!(CorrectionMode::Direct.apply(0.0, 0.0, 0.0, 1.0, 0.0).is_nan());
    }
}
