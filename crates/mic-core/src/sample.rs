//! Unsigned integer sample types of acquired stacks.
//!
//! Microscopy stacks are stored as unsigned integers; the bounded range
//! `[0, max]` of the storage type is what the corrected output is clipped to
//! before being cast back.

use std::fmt;

/// Storage type of an image stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// 8-bit unsigned.
    U8,
    /// 16-bit unsigned (most common for scientific cameras).
    U16,
    /// 32-bit unsigned.
    U32,
}

impl SampleType {
    /// Largest representable value, as `f64`.
    #[inline]
    pub fn max_value(self) -> f64 {
        match self {
            SampleType::U8 => u8::MAX as f64,
            SampleType::U16 => u16::MAX as f64,
            SampleType::U32 => u32::MAX as f64,
        }
    }

    /// Bits per sample.
    #[inline]
    pub fn bits(self) -> u8 {
        match self {
            SampleType::U8 => 8,
            SampleType::U16 => 16,
            SampleType::U32 => 32,
        }
    }

    /// Bytes per sample.
    #[inline]
    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Lowercase numpy-style name (`uint16`).
    pub fn name(self) -> &'static str {
        match self {
            SampleType::U8 => "uint8",
            SampleType::U16 => "uint16",
            SampleType::U32 => "uint32",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stack sample that can be widened to `f64` and narrowed back.
pub trait Sample: Copy + Send + Sync + 'static {
    /// Runtime tag of this type.
    const TYPE: SampleType;

    /// Lossless widening.
    fn to_f64(self) -> f64;

    /// Narrowing cast. Truncates toward zero and saturates, so callers clamp
    /// to `[0, max]` first.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_sample {
    ($t:ty, $tag:expr) => {
        impl Sample for $t {
            const TYPE: SampleType = $tag;

            #[inline(always)]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    };
}

impl_sample!(u8, SampleType::U8);
impl_sample!(u16, SampleType::U16);
impl_sample!(u32, SampleType::U32);
