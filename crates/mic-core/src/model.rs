//! Illumination calibration models.
//!
//! A [`CalibrationModel`] holds the spatial gain field `V` and offset field
//! `Z` for every channel of an acquisition, stored interleaved as
//! `[height, width, channel]` so that a model pixel lines up with a stack
//! pixel. Channels without calibration data are resolved into identity
//! planes (gain 1, offset 0) when the model is built, so the correction path
//! never has to branch on availability.
//!
//! Per-channel spatial means ([`ChannelMeans`]) are computed once at
//! construction and survive resampling unchanged: they describe the absolute
//! calibration, not its sampling density.

use crate::error::{Error, Result};
use crate::stack::StackShape;

/// A single-channel 2-D calibration field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    height: usize,
    width: usize,
    data: Vec<f64>,
}

impl Field {
    /// Wraps row-major `data` of the given shape.
    pub fn new(height: usize, width: usize, data: Vec<f64>) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(Error::invalid_shape(vec![height, width], "field extents must be > 0"));
        }
        let expected = height * width;
        if data.len() != expected {
            return Err(Error::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// Field filled with `value`.
    pub fn filled(height: usize, width: usize, value: f64) -> Self {
        Self {
            height,
            width,
            data: vec![value; height * width],
        }
    }

    /// `(height, width)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Row-major samples.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Arithmetic mean of all samples.
    pub fn mean(&self) -> f64 {
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }
}

/// Calibration data for one channel, resolved at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSource {
    /// Gain and offset fields measured at `wavelength` nm.
    Available {
        /// Excitation/emission wavelength the fields belong to.
        wavelength: u32,
        /// Gain field `v`.
        gain: Field,
        /// Offset field `z`.
        offset: Field,
    },
    /// No data: the channel passes through unmodified.
    Identity,
}

/// What a model channel was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Measured fields at the given wavelength.
    Measured(u32),
    /// Synthesized identity sub-model.
    Identity,
}

/// Per-channel spatial means of the gain and offset fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMeans {
    /// Mean gain `v̄` per channel.
    pub gain: Vec<f64>,
    /// Mean offset `z̄` per channel.
    pub offset: Vec<f64>,
}

/// Gain/offset fields for all channels plus their spatial means.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    height: usize,
    width: usize,
    channels: usize,
    gain: Vec<f64>,
    offset: Vec<f64>,
    means: ChannelMeans,
    kinds: Vec<ChannelKind>,
}

impl CalibrationModel {
    /// Builds a model from per-channel sources.
    ///
    /// Identity channels take the shape of the first available channel.
    /// Fails with [`Error::NoChannels`] when no channel is available and with
    /// a shape error when available channels disagree.
    pub fn from_channels(sources: Vec<ChannelSource>) -> Result<Self> {
        let reference = sources
            .iter()
            .find_map(|s| match s {
                ChannelSource::Available { gain, .. } => Some(gain.shape()),
                ChannelSource::Identity => None,
            })
            .ok_or(Error::NoChannels)?;

        for source in &sources {
            if let ChannelSource::Available { gain, offset, .. } = source {
                if gain.shape() != reference {
                    return Err(Error::lateral_mismatch(reference, gain.shape()));
                }
                if offset.shape() != reference {
                    return Err(Error::lateral_mismatch(reference, offset.shape()));
                }
            }
        }

        let (height, width) = reference;
        let channels = sources.len();
        let pixels = height * width;
        let mut gain = vec![0.0; pixels * channels];
        let mut offset = vec![0.0; pixels * channels];
        let mut kinds = Vec::with_capacity(channels);

        for (c, source) in sources.iter().enumerate() {
            match source {
                ChannelSource::Available {
                    wavelength,
                    gain: v,
                    offset: z,
                } => {
                    for p in 0..pixels {
                        gain[p * channels + c] = v.data()[p];
                        offset[p * channels + c] = z.data()[p];
                    }
                    kinds.push(ChannelKind::Measured(*wavelength));
                }
                ChannelSource::Identity => {
                    for p in 0..pixels {
                        gain[p * channels + c] = 1.0;
                    }
                    kinds.push(ChannelKind::Identity);
                }
            }
        }

        let means = channel_means(&gain, &offset, channels);
        Ok(Self {
            height,
            width,
            channels,
            gain,
            offset,
            means,
            kinds,
        })
    }

    /// Identity model: every channel passes through unmodified.
    pub fn identity(height: usize, width: usize, channels: usize) -> Self {
        let len = height * width * channels;
        Self {
            height,
            width,
            channels,
            gain: vec![1.0; len],
            offset: vec![0.0; len],
            means: ChannelMeans {
                gain: vec![1.0; channels],
                offset: vec![0.0; channels],
            },
            kinds: vec![ChannelKind::Identity; channels],
        }
    }

    /// Replaces the fields with resampled ones of shape `(height, width)`,
    /// keeping the original channel means and kinds.
    pub fn with_resampled_fields(
        &self,
        height: usize,
        width: usize,
        gain: Vec<f64>,
        offset: Vec<f64>,
    ) -> Result<Self> {
        let expected = height * width * self.channels;
        for actual in [gain.len(), offset.len()] {
            if actual != expected {
                return Err(Error::LengthMismatch { expected, actual });
            }
        }
        Ok(Self {
            height,
            width,
            channels: self.channels,
            gain,
            offset,
            means: self.means.clone(),
            kinds: self.kinds.clone(),
        })
    }

    /// In-plane `(height, width)`.
    #[inline]
    pub fn lateral_shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Interleaved gain field `[H, W, C]`.
    #[inline]
    pub fn gain(&self) -> &[f64] {
        &self.gain
    }

    /// Interleaved offset field `[H, W, C]`.
    #[inline]
    pub fn offset(&self) -> &[f64] {
        &self.offset
    }

    /// Spatial means of the original (unresampled) fields.
    #[inline]
    pub fn means(&self) -> &ChannelMeans {
        &self.means
    }

    /// Provenance of each channel.
    #[inline]
    pub fn kinds(&self) -> &[ChannelKind] {
        &self.kinds
    }

    /// Samples per slice the model covers.
    #[inline]
    pub fn slice_len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Checks that the model covers slices of `shape`: same lateral shape and
    /// channel count.
    pub fn check_fits(&self, shape: &StackShape) -> Result<()> {
        if self.lateral_shape() != shape.lateral() {
            return Err(Error::lateral_mismatch(self.lateral_shape(), shape.lateral()));
        }
        if self.channels != shape.channel_count() {
            return Err(Error::ChannelMismatch {
                model: self.channels,
                stack: shape.channel_count(),
            });
        }
        Ok(())
    }

    /// Extracts channel `c` of the gain field as a standalone plane.
    pub fn gain_plane(&self, c: usize) -> Option<Vec<f64>> {
        (c < self.channels).then(|| self.gain.iter().skip(c).step_by(self.channels).copied().collect())
    }

    /// Extracts channel `c` of the offset field as a standalone plane.
    pub fn offset_plane(&self, c: usize) -> Option<Vec<f64>> {
        (c < self.channels)
            .then(|| self.offset.iter().skip(c).step_by(self.channels).copied().collect())
    }
}

fn channel_means(gain: &[f64], offset: &[f64], channels: usize) -> ChannelMeans {
    let pixels = (gain.len() / channels) as f64;
    let mut g = vec![0.0; channels];
    let mut o = vec![0.0; channels];
    for (i, (v, z)) in gain.iter().zip(offset).enumerate() {
        g[i % channels] += v;
        o[i % channels] += z;
    }
    g.iter_mut().for_each(|s| *s /= pixels);
    o.iter_mut().for_each(|s| *s /= pixels);
    ChannelMeans { gain: g, offset: o }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(h: usize, w: usize, base: f64) -> Field {
        Field::new(h, w, (0..h * w).map(|i| base + i as f64).collect()).unwrap()
    }

    #[test]
    fn test_identity_channel_synthesis() {
        let model = CalibrationModel::from_channels(vec![
            ChannelSource::Available {
                wavelength: 618,
                gain: ramp(4, 3, 1.0),
                offset: ramp(4, 3, 0.5),
            },
            ChannelSource::Identity,
            ChannelSource::Available {
                wavelength: 482,
                gain: Field::filled(4, 3, 2.0),
                offset: Field::filled(4, 3, 0.0),
            },
        ])
        .unwrap();

        assert_eq!(model.lateral_shape(), (4, 3));
        assert_eq!(model.channels(), 3);
        assert_eq!(
            model.kinds(),
            &[ChannelKind::Measured(618), ChannelKind::Identity, ChannelKind::Measured(482)]
        );
        assert!(model.gain_plane(1).unwrap().iter().all(|&v| v == 1.0));
        assert!(model.offset_plane(1).unwrap().iter().all(|&z| z == 0.0));
        assert_eq!(model.gain_plane(1).unwrap().len(), 12);
        assert_eq!(model.gain_plane(0).unwrap()[5], 6.0);
    }

    #[test]
    fn test_means_per_channel() {
        let model = CalibrationModel::from_channels(vec![
            ChannelSource::Available {
                wavelength: 530,
                gain: ramp(2, 2, 1.0),
                offset: Field::filled(2, 2, 3.0),
            },
            ChannelSource::Identity,
        ])
        .unwrap();
        assert_relative_eq!(model.means().gain[0], 2.5);
        assert_relative_eq!(model.means().offset[0], 3.0);
        assert_relative_eq!(model.means().gain[1], 1.0);
        assert_relative_eq!(model.means().offset[1], 0.0);
    }

    #[test]
    fn test_no_channels() {
        let err = CalibrationModel::from_channels(vec![ChannelSource::Identity; 3]).unwrap_err();
        assert!(matches!(err, Error::NoChannels));
    }

    #[test]
    fn test_mismatched_channels_rejected() {
        let err = CalibrationModel::from_channels(vec![
            ChannelSource::Available {
                wavelength: 618,
                gain: Field::filled(4, 4, 1.0),
                offset: Field::filled(4, 4, 0.0),
            },
            ChannelSource::Available {
                wavelength: 482,
                gain: Field::filled(8, 8, 1.0),
                offset: Field::filled(8, 8, 0.0),
            },
        ])
        .unwrap_err();
        assert!(matches!(err, Error::LateralMismatch { .. }));
    }

    #[test]
    fn test_check_fits() {
        let model = CalibrationModel::identity(4, 6, 3);
        assert!(model.check_fits(&StackShape::zyxc(9, 4, 6, 3)).is_ok());
        assert!(matches!(
            model.check_fits(&StackShape::zyxc(9, 6, 4, 3)),
            Err(Error::LateralMismatch { .. })
        ));
        assert!(matches!(
            model.check_fits(&StackShape::zyx(9, 4, 6)),
            Err(Error::ChannelMismatch { model: 3, stack: 1 })
        ));
    }

    #[test]
    fn test_resampled_keeps_means() {
        let model = CalibrationModel::from_channels(vec![ChannelSource::Available {
            wavelength: 618,
            gain: ramp(2, 2, 1.0),
            offset: Field::filled(2, 2, 0.0),
        }])
        .unwrap();
        let resized = model
            .with_resampled_fields(3, 3, vec![9.0; 9], vec![0.0; 9])
            .unwrap();
        assert_eq!(resized.lateral_shape(), (3, 3));
        assert_eq!(resized.means(), model.means());
        assert!(model.with_resampled_fields(3, 3, vec![1.0; 8], vec![0.0; 9]).is_err());
    }
}
