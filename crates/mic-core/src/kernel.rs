//! Per-pixel correction kernel.
//!
//! Stateless and slice-local: a depth slice is corrected using only its own
//! samples and the (immutable) calibration model, which is what makes the
//! slice fan-out order-independent.

use crate::error::{Error, Result};
use crate::mode::CorrectionMode;
use crate::model::CalibrationModel;
use crate::sample::Sample;

/// Corrects a single sample. See [`CorrectionMode`] for the formulas.
#[inline(always)]
pub fn correct(i: f64, v: f64, z: f64, v_mean: f64, z_mean: f64, mode: CorrectionMode) -> f64 {
    mode.apply(i, v, z, v_mean, z_mean)
}

/// Corrects one depth slice into `out`.
///
/// `input` and `out` are interleaved `[H, W, C]` slices matching the model.
/// Intermediate precision is `f64`; non-finite results are written as is.
pub fn correct_slice<T: Sample>(
    input: &[T],
    out: &mut [f64],
    model: &CalibrationModel,
    mode: CorrectionMode,
) -> Result<()> {
    let expected = model.slice_len();
    if input.len() != expected {
        return Err(Error::LengthMismatch {
            expected,
            actual: input.len(),
        });
    }
    if out.len() != expected {
        return Err(Error::LengthMismatch {
            expected,
            actual: out.len(),
        });
    }

    let channels = model.channels();
    let means = model.means();
    let gain = model.gain();
    let offset = model.offset();

    for (c, (&v_mean, &z_mean)) in means.gain.iter().zip(&means.offset).enumerate() {
        let samples = input.iter().skip(c).step_by(channels);
        let fields = gain.iter().skip(c).step_by(channels).zip(offset.iter().skip(c).step_by(channels));
        let dst = out.iter_mut().skip(c).step_by(channels);
        for ((o, &i), (&v, &z)) in dst.zip(samples).zip(fields) {
            *o = mode.apply(i.to_f64(), v, z, v_mean, z_mean);
        }
    }

    Ok(())
}

/// Number of NaN samples in a corrected slice.
pub fn count_nan(out: &[f64]) -> usize {
    out.iter().filter(|v| v.is_nan()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelSource, Field};
    use approx::assert_relative_eq;

    fn model_1ch(v: Vec<f64>, z: Vec<f64>, h: usize, w: usize) -> CalibrationModel {
        CalibrationModel::from_channels(vec![ChannelSource::Available {
            wavelength: 618,
            gain: Field::new(h, w, v).unwrap(),
            offset: Field::new(h, w, z).unwrap(),
        }])
        .unwrap()
    }

    #[test]
    fn test_formula_exactness() {
        let v = vec![0.5, 1.0, 1.5, 2.0];
        let z = vec![0.0, 10.0, 20.0, 30.0];
        let model = model_1ch(v.clone(), z.clone(), 2, 2);
        let v_mean = 1.25;
        let z_mean = 15.0;
        let input: Vec<u16> = vec![0, 1000, 40000, u16::MAX];

        for mode in CorrectionMode::ALL {
            let mut out = vec![0.0; 4];
            correct_slice(&input, &mut out, &model, mode).unwrap();
            for p in 0..4 {
                let i = input[p] as f64;
                let expected = match mode {
                    CorrectionMode::ZeroPreserved => z_mean + v_mean * (i - z[p]) / v[p],
                    CorrectionMode::DynamicRangeCorrected => v_mean * (i - z[p]) / v[p],
                    CorrectionMode::Direct => (i - z[p]) / v[p],
                };
                assert_relative_eq!(out[p], expected, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_identity_passthrough() {
        let model = CalibrationModel::identity(3, 3, 3);
        let input: Vec<u16> = (0..27).map(|i| (i * 2427) as u16).collect();
        for mode in CorrectionMode::ALL {
            let mut out = vec![0.0; 27];
            correct_slice(&input, &mut out, &model, mode).unwrap();
            for (o, i) in out.iter().zip(&input) {
                assert_eq!(*o, *i as f64);
            }
        }
    }

    #[test]
    fn test_channels_independent() {
        let model = CalibrationModel::from_channels(vec![
            ChannelSource::Available {
                wavelength: 618,
                gain: Field::filled(1, 2, 2.0),
                offset: Field::filled(1, 2, 0.0),
            },
            ChannelSource::Identity,
        ])
        .unwrap();
        let input: Vec<u8> = vec![100, 100, 50, 50];
        let mut out = vec![0.0; 4];
        correct_slice(&input, &mut out, &model, CorrectionMode::Direct).unwrap();
        assert_eq!(out, vec![50.0, 100.0, 25.0, 50.0]);
    }

    #[test]
    fn test_length_mismatch() {
        let model = CalibrationModel::identity(2, 2, 1);
        let mut out = vec![0.0; 4];
        let err = correct_slice(&[1u8, 2, 3], &mut out, &model, CorrectionMode::Direct).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_zero_gain_propagates() {
        let model = model_1ch(vec![0.0, 0.0], vec![0.0, 0.0], 1, 2);
        let mut out = vec![0.0; 2];
        correct_slice(&[0u16, 7], &mut out, &model, CorrectionMode::Direct).unwrap();
        assert!(out[0].is_nan());
        assert!(out[1].is_infinite());
        assert_eq!(count_nan(&out), 1);
    }
}
