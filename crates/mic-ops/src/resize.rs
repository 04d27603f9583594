//! Calibration model resampling.
//!
//! Calibration fields are usually measured at a fixed resolution while stacks
//! may be acquired at another. [`ModelResizer`] resamples the gain and offset
//! fields of a model to a stack's lateral shape with a separable filter whose
//! support widens with the downscale factor (anti-aliasing), then clamps every
//! channel back into its source range.
//!
//! # Filters
//!
//! - [`Filter::Nearest`] - no interpolation
//! - [`Filter::Bilinear`] - triangle filter, never overshoots (default)
//! - [`Filter::Bicubic`] - Mitchell-Netravali
//! - [`Filter::Lanczos3`] - sinc-based
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mic_ops::resize::{Filter, ModelResizer};
//!
//! let mut resizer = ModelResizer::new(Filter::Bilinear);
//! let fitted = resizer.resize(&model, (2048, 2048))?;
//! let again = resizer.resize(&model, (2048, 2048))?; // cached
//! assert!(Arc::ptr_eq(&fitted, &again));
//! ```

use std::str::FromStr;
use std::sync::Arc;

use mic_core::CalibrationModel;
use rayon::prelude::*;
use tracing::debug;

use crate::{OpsError, OpsResult};

/// Resampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    /// Nearest-neighbor.
    Nearest,
    /// Bilinear (triangle) interpolation.
    #[default]
    Bilinear,
    /// Bicubic (Mitchell-Netravali, B = C = 1/3).
    Bicubic,
    /// Lanczos-3.
    Lanczos3,
}

impl Filter {
    /// Support radius.
    #[inline]
    pub fn support(&self) -> f64 {
        match self {
            Filter::Nearest => 0.5,
            Filter::Bilinear => 1.0,
            Filter::Bicubic => 2.0,
            Filter::Lanczos3 => 3.0,
        }
    }

    /// Evaluates the kernel at `x`.
    #[inline]
    pub fn weight(&self, x: f64) -> f64 {
        match self {
            Filter::Nearest => nearest_weight(x),
            Filter::Bilinear => bilinear_weight(x),
            Filter::Bicubic => bicubic_weight(x),
            Filter::Lanczos3 => lanczos_weight(x, 3.0),
        }
    }

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Nearest => "nearest",
            Filter::Bilinear => "bilinear",
            Filter::Bicubic => "bicubic",
            Filter::Lanczos3 => "lanczos3",
        }
    }
}

impl FromStr for Filter {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Filter::Nearest),
            "bilinear" | "linear" | "triangle" => Ok(Filter::Bilinear),
            "bicubic" | "cubic" | "mitchell" => Ok(Filter::Bicubic),
            "lanczos3" | "lanczos" => Ok(Filter::Lanczos3),
            other => Err(OpsError::InvalidArgument(format!("unknown filter '{other}'"))),
        }
    }
}

#[inline]
fn nearest_weight(x: f64) -> f64 {
    // Half-open so a tap exactly between two samples picks the left one.
    if (-0.5..0.5).contains(&x) { 1.0 } else { 0.0 }
}

#[inline]
fn bilinear_weight(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 1.0 { 1.0 - ax } else { 0.0 }
}

#[inline]
fn bicubic_weight(x: f64) -> f64 {
    const B: f64 = 1.0 / 3.0;
    const C: f64 = 1.0 / 3.0;

    let ax = x.abs();
    if ax < 1.0 {
        ((12.0 - 9.0 * B - 6.0 * C) * ax * ax * ax
            + (-18.0 + 12.0 * B + 6.0 * C) * ax * ax
            + (6.0 - 2.0 * B))
            / 6.0
    } else if ax < 2.0 {
        ((-B - 6.0 * C) * ax * ax * ax
            + (6.0 * B + 30.0 * C) * ax * ax
            + (-12.0 * B - 48.0 * C) * ax
            + (8.0 * B + 24.0 * C))
            / 6.0
    } else {
        0.0
    }
}

#[inline]
fn lanczos_weight(x: f64, a: f64) -> f64 {
    let ax = x.abs();
    if ax < 1e-12 {
        1.0
    } else if ax < a {
        let pi_x = std::f64::consts::PI * ax;
        let pi_x_a = pi_x / a;
        (pi_x.sin() / pi_x) * (pi_x_a.sin() / pi_x_a)
    } else {
        0.0
    }
}

/// Resizes interleaved `f64` field data of `(src_h, src_w, channels)`.
pub fn resize_field(
    src: &[f64],
    (src_h, src_w): (usize, usize),
    channels: usize,
    (dst_h, dst_w): (usize, usize),
    filter: Filter,
) -> OpsResult<Vec<f64>> {
    let expected = src_w * src_h * channels;
    if src.len() != expected {
        return Err(OpsError::InvalidDimensions(format!(
            "expected {} samples, got {}",
            expected,
            src.len()
        )));
    }
    if dst_w == 0 || dst_h == 0 {
        return Err(OpsError::InvalidDimensions(
            "destination size must be > 0".into(),
        ));
    }

    let temp = resize_horizontal_par(src, src_w, src_h, channels, dst_w, filter);
    Ok(resize_vertical_par(&temp, dst_w, src_h, channels, dst_h, filter))
}

fn resize_horizontal_par(
    src: &[f64],
    src_w: usize,
    src_h: usize,
    channels: usize,
    dst_w: usize,
    filter: Filter,
) -> Vec<f64> {
    let scale = src_w as f64 / dst_w as f64;
    let stretch = scale.max(1.0);
    let support = filter.support() * stretch;

    let mut dst = vec![0.0f64; dst_w * src_h * channels];

    dst.par_chunks_mut(dst_w * channels)
        .enumerate()
        .for_each(|(y, row)| {
            let mut sum = vec![0.0f64; channels];
            for x in 0..dst_w {
                let center = (x as f64 + 0.5) * scale - 0.5;
                let left = ((center - support).floor() as isize).max(0) as usize;
                let right = ((center + support).ceil().max(0.0) as usize).min(src_w - 1);

                sum.iter_mut().for_each(|s| *s = 0.0);
                let mut weight_sum = 0.0f64;

                for sx in left..=right {
                    let w = filter.weight((sx as f64 - center) / stretch);
                    weight_sum += w;
                    let src_idx = (y * src_w + sx) * channels;
                    for c in 0..channels {
                        sum[c] += src[src_idx + c] * w;
                    }
                }

                if weight_sum != 0.0 {
                    for c in 0..channels {
                        row[x * channels + c] = sum[c] / weight_sum;
                    }
                } else {
                    let src_idx = (y * src_w + nearest_index(center, src_w)) * channels;
                    row[x * channels..(x + 1) * channels].copy_from_slice(&src[src_idx..src_idx + channels]);
                }
            }
        });

    dst
}

fn resize_vertical_par(
    src: &[f64],
    src_w: usize,
    src_h: usize,
    channels: usize,
    dst_h: usize,
    filter: Filter,
) -> Vec<f64> {
    let scale = src_h as f64 / dst_h as f64;
    let stretch = scale.max(1.0);
    let support = filter.support() * stretch;

    let mut dst = vec![0.0f64; src_w * dst_h * channels];

    dst.par_chunks_mut(src_w * channels)
        .enumerate()
        .for_each(|(y, row)| {
            let center = (y as f64 + 0.5) * scale - 0.5;
            let top = ((center - support).floor() as isize).max(0) as usize;
            let bottom = ((center + support).ceil().max(0.0) as usize).min(src_h - 1);

            let mut taps: Vec<(usize, f64)> = (top..=bottom)
                .map(|sy| (sy, filter.weight((sy as f64 - center) / stretch)))
                .collect();
            let mut weight_sum: f64 = taps.iter().map(|(_, w)| w).sum();
            if weight_sum == 0.0 {
                taps = vec![(nearest_index(center, src_h), 1.0)];
                weight_sum = 1.0;
            }

            for (i, out) in row.iter_mut().enumerate() {
                let acc: f64 = taps.iter().map(|&(sy, w)| src[sy * src_w * channels + i] * w).sum();
                *out = acc / weight_sum;
            }
        });

    dst
}

/// Source sample closest to `center`, used when every tap weight is zero.
#[inline]
fn nearest_index(center: f64, len: usize) -> usize {
    (center.round().max(0.0) as usize).min(len - 1)
}

/// Per-channel `(min, max)` of interleaved data.
fn channel_ranges(data: &[f64], channels: usize) -> Vec<(f64, f64)> {
    let mut ranges = vec![(f64::INFINITY, f64::NEG_INFINITY); channels];
    for (i, &v) in data.iter().enumerate() {
        let r = &mut ranges[i % channels];
        r.0 = r.0.min(v);
        r.1 = r.1.max(v);
    }
    ranges
}

fn clamp_to_ranges(data: &mut [f64], ranges: &[(f64, f64)]) {
    let channels = ranges.len();
    data.par_chunks_mut(channels).for_each(|px| {
        for (v, &(lo, hi)) in px.iter_mut().zip(ranges) {
            *v = v.clamp(lo, hi);
        }
    });
}

struct CacheEntry {
    source: Arc<CalibrationModel>,
    target: (usize, usize),
    resized: Arc<CalibrationModel>,
}

/// Resamples calibration models to stack resolutions, remembering the last
/// result.
///
/// A request for the same source model and target shape as the previous one
/// returns the previous handle without recomputation. Channel means are kept
/// from the source model.
pub struct ModelResizer {
    filter: Filter,
    cached: Option<CacheEntry>,
    resamples: usize,
}

impl ModelResizer {
    /// Resizer using `filter`.
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            cached: None,
            resamples: 0,
        }
    }

    /// Configured filter.
    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Number of actual resampling computations performed so far.
    pub fn resample_count(&self) -> usize {
        self.resamples
    }

    /// Returns `model` fitted to `target` `(height, width)`.
    pub fn resize(
        &mut self,
        model: &Arc<CalibrationModel>,
        target: (usize, usize),
    ) -> OpsResult<Arc<CalibrationModel>> {
        if model.lateral_shape() == target {
            return Ok(Arc::clone(model));
        }
        if let Some(entry) = self
            .cached
            .as_ref()
            .filter(|e| e.target == target && Arc::ptr_eq(&e.source, model))
        {
            return Ok(Arc::clone(&entry.resized));
        }

        let source_shape = model.lateral_shape();
        let channels = model.channels();
        debug!(
            from = ?source_shape,
            to = ?target,
            channels,
            filter = self.filter.name(),
            "resampling calibration model"
        );

        let mut gain = resize_field(model.gain(), source_shape, channels, target, self.filter)?;
        let mut offset = resize_field(model.offset(), source_shape, channels, target, self.filter)?;
        clamp_to_ranges(&mut gain, &channel_ranges(model.gain(), channels));
        clamp_to_ranges(&mut offset, &channel_ranges(model.offset(), channels));

        let resized = Arc::new(model.with_resampled_fields(target.0, target.1, gain, offset)?);
        self.resamples += 1;
        self.cached = Some(CacheEntry {
            source: Arc::clone(model),
            target,
            resized: Arc::clone(&resized),
        });
        Ok(resized)
    }
}

impl Default for ModelResizer {
    fn default() -> Self {
        Self::new(Filter::default())
    }
}
