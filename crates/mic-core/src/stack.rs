//! Volumetric image stacks.
//!
//! An [`ImageStack`] is a z-stack of equally sized slices stored row-major as
//! `[depth, height, width]` (grayscale) or `[depth, height, width, channel]`
//! (multi-channel, channel-last). Samples are unsigned integers, see
//! [`SampleType`].

use crate::error::{Error, Result};
use crate::sample::SampleType;

/// Axis layout tag written alongside persisted stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axes {
    /// `[depth, height, width]`.
    Zyx,
    /// `[depth, height, width, channel]`.
    Zyxc,
}

impl Axes {
    /// Tag string (`"ZYX"` / `"ZYXC"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Axes::Zyx => "ZYX",
            Axes::Zyxc => "ZYXC",
        }
    }
}

/// Shape of a z-stack.
///
/// `channels == None` marks a 3-D (`ZYX`) stack; `Some(c)` a 4-D (`ZYXC`)
/// stack, even when `c == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackShape {
    /// Number of slices along Z.
    pub depth: usize,
    /// Slice height (Y).
    pub height: usize,
    /// Slice width (X).
    pub width: usize,
    /// Channel axis length, if the stack has one.
    pub channels: Option<usize>,
}

impl StackShape {
    /// 3-D grayscale shape.
    pub fn zyx(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
            channels: None,
        }
    }

    /// 4-D channel-last shape.
    pub fn zyxc(depth: usize, height: usize, width: usize, channels: usize) -> Self {
        Self {
            depth,
            height,
            width,
            channels: Some(channels),
        }
    }

    /// Number of array dimensions (3 or 4).
    #[inline]
    pub fn ndim(&self) -> usize {
        if self.channels.is_some() { 4 } else { 3 }
    }

    /// Axis tag matching [`ndim`](Self::ndim).
    #[inline]
    pub fn axes(&self) -> Axes {
        if self.channels.is_some() { Axes::Zyxc } else { Axes::Zyx }
    }

    /// Channels per pixel; 1 for 3-D stacks.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.unwrap_or(1)
    }

    /// In-plane `(height, width)`.
    #[inline]
    pub fn lateral(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Samples in one depth slice.
    #[inline]
    pub fn slice_len(&self) -> usize {
        self.height * self.width * self.channel_count()
    }

    /// Total sample count.
    #[inline]
    pub fn len(&self) -> usize {
        self.depth * self.slice_len()
    }

    /// `true` when the stack holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensions as a vector, numpy order.
    pub fn dims(&self) -> Vec<usize> {
        let mut dims = vec![self.depth, self.height, self.width];
        if let Some(c) = self.channels {
            dims.push(c);
        }
        dims
    }

    /// Checks that every extent is non-zero and the total size fits `usize`.
    pub fn validate(&self) -> Result<usize> {
        if self.depth == 0 || self.height == 0 || self.width == 0 || self.channel_count() == 0 {
            return Err(Error::invalid_shape(self.dims(), "all extents must be > 0"));
        }
        self.depth
            .checked_mul(self.height)
            .and_then(|v| v.checked_mul(self.width))
            .and_then(|v| v.checked_mul(self.channel_count()))
            .ok_or_else(|| Error::invalid_shape(self.dims(), "stack size overflows"))
    }
}

/// Typed sample buffer of a stack.
#[derive(Debug, Clone, PartialEq)]
pub enum StackData {
    /// 8-bit samples.
    U8(Vec<u8>),
    /// 16-bit samples.
    U16(Vec<u16>),
    /// 32-bit samples.
    U32(Vec<u32>),
}

impl StackData {
    /// Runtime sample type.
    pub fn sample_type(&self) -> SampleType {
        match self {
            StackData::U8(_) => SampleType::U8,
            StackData::U16(_) => SampleType::U16,
            StackData::U32(_) => SampleType::U32,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            StackData::U8(v) => v.len(),
            StackData::U16(v) => v.len(),
            StackData::U32(v) => v.len(),
        }
    }

    /// `true` when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_from_vec {
    ($t:ty, $variant:ident) => {
        impl From<Vec<$t>> for StackData {
            fn from(v: Vec<$t>) -> Self {
                StackData::$variant(v)
            }
        }
    };
}

impl_from_vec!(u8, U8);
impl_from_vec!(u16, U16);
impl_from_vec!(u32, U32);

/// A z-stack: shape plus typed samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStack {
    shape: StackShape,
    data: StackData,
}

impl ImageStack {
    /// Wraps `data` after checking it matches `shape`.
    pub fn new(shape: StackShape, data: impl Into<StackData>) -> Result<Self> {
        let data = data.into();
        let expected = shape.validate()?;
        if data.len() != expected {
            return Err(Error::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Stack shape.
    #[inline]
    pub fn shape(&self) -> StackShape {
        self.shape
    }

    /// Typed samples.
    #[inline]
    pub fn data(&self) -> &StackData {
        &self.data
    }

    /// Consumes the stack, returning its samples.
    pub fn into_data(self) -> StackData {
        self.data
    }

    /// Storage type.
    #[inline]
    pub fn sample_type(&self) -> SampleType {
        self.data.sample_type()
    }

    /// In-plane `(height, width)`.
    #[inline]
    pub fn lateral(&self) -> (usize, usize) {
        self.shape.lateral()
    }

    /// Buffer size in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len() * self.sample_type().bytes()
    }
}
