//! Multi-page TIFF z-stacks and calibration fields.
//!
//! # Layout
//!
//! - One page per depth slice, pages in Z order
//! - Gray pages give a `ZYX` stack, RGB/RGBA pages a `ZYXC` stack with 3/4 channels
//! - Unsigned 8/16/32-bit samples
//!
//! Written stacks carry a JSON `ImageDescription` on the first page
//! (`{"shape": [...], "axes": "ZYXC"}`), the same shape description tifffile
//! uses. On read it is only consulted to recover a trailing single-channel
//! axis (`[D, H, W, 1]`), which plain gray pages cannot express.
//!
//! Stacks whose sample data approaches the 4 GiB offset limit of classic TIFF
//! are written as BigTIFF, the same switch tifffile makes.
//!
//! Calibration fields are single-page gray images of any numeric sample type.
//!
//! # Example
//!
//! ```rust,ignore
//! use mic_io::tiff;
//!
//! let stack = tiff::read_stack("acq_001.tif")?;
//! tiff::write_stack("corrected/acq_001.tif", &stack)?;
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;

use mic_core::{Field, ImageStack, StackData, StackShape};
use serde::{Deserialize, Serialize};
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{Compression, DeflateLevel, TiffEncoder, TiffKind, TiffValue, colortype};
use tiff::tags::Tag;
use tracing::{debug, trace};

use crate::error::{IoError, IoResult};

/// Shape description stored in the `ImageDescription` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ShapeDescription {
    shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    axes: Option<String>,
}

/// Pages decoded so far, accumulated in the type of the first page.
enum PageBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl PageBuffer {
    fn push(&mut self, page: DecodingResult) -> IoResult<()> {
        match (self, page) {
            (PageBuffer::U8(acc), DecodingResult::U8(buf)) => acc.extend_from_slice(&buf),
            (PageBuffer::U16(acc), DecodingResult::U16(buf)) => acc.extend_from_slice(&buf),
            (PageBuffer::U32(acc), DecodingResult::U32(buf)) => acc.extend_from_slice(&buf),
            _ => {
                return Err(IoError::InvalidFile(
                    "pages have different sample types".into(),
                ));
            }
        }
        Ok(())
    }

    fn into_data(self) -> StackData {
        match self {
            PageBuffer::U8(v) => StackData::U8(v),
            PageBuffer::U16(v) => StackData::U16(v),
            PageBuffer::U32(v) => StackData::U32(v),
        }
    }
}

fn start_buffer(page: DecodingResult, capacity: usize) -> IoResult<PageBuffer> {
    let mut buffer = match &page {
        DecodingResult::U8(_) => PageBuffer::U8(Vec::with_capacity(capacity)),
        DecodingResult::U16(_) => PageBuffer::U16(Vec::with_capacity(capacity)),
        DecodingResult::U32(_) => PageBuffer::U32(Vec::with_capacity(capacity)),
        DecodingResult::U64(_) => return Err(IoError::UnsupportedSampleType("uint64".into())),
        DecodingResult::F32(_) | DecodingResult::F64(_) => {
            return Err(IoError::UnsupportedSampleType("floating point".into()));
        }
        _ => return Err(IoError::UnsupportedSampleType("signed integer".into())),
    };
    buffer.push(page)?;
    Ok(buffer)
}

fn channels_of(color: ColorType) -> IoResult<usize> {
    match color {
        ColorType::Gray(_) => Ok(1),
        ColorType::RGB(_) => Ok(3),
        ColorType::RGBA(_) => Ok(4),
        other => Err(IoError::UnsupportedFormat(format!(
            "TIFF color type {other:?}"
        ))),
    }
}

fn open_decoder(path: &Path) -> IoResult<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited()))
}

/// Reads a multi-page TIFF as a z-stack.
///
/// All pages must share dimensions, colour type and sample type.
pub fn read_stack<P: AsRef<Path>>(path: P) -> IoResult<ImageStack> {
    let path = path.as_ref();
    trace!(path = %path.display(), "tiff::read_stack");

    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions()?;
    let color = decoder.colortype()?;
    let channels = channels_of(color)?;
    let description = decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .ok()
        .and_then(|s| serde_json::from_str::<ShapeDescription>(&s).ok());

    let page_len = width as usize * height as usize * channels;
    let mut buffer = start_buffer(decoder.read_image()?, page_len)?;
    let mut depth = 1usize;

    while decoder.more_images() {
        decoder.next_image()?;
        let dims = decoder.dimensions()?;
        if dims != (width, height) {
            return Err(IoError::DimensionMismatch {
                expected: format!("{width}x{height}"),
                actual: format!("{}x{} on page {depth}", dims.0, dims.1),
            });
        }
        let page_color = decoder.colortype()?;
        if page_color != color {
            return Err(IoError::InvalidFile(format!(
                "page {depth} has color type {page_color:?}, first page {color:?}"
            )));
        }
        buffer.push(decoder.read_image()?)?;
        depth += 1;
    }

    let explicit_channel_axis = description
        .as_ref()
        .is_some_and(|d| d.shape.len() == 4 && d.shape.last() == Some(&channels));
    let shape = if channels > 1 || explicit_channel_axis {
        StackShape::zyxc(depth, height as usize, width as usize, channels)
    } else {
        StackShape::zyx(depth, height as usize, width as usize)
    };

    debug!(
        path = %path.display(),
        shape = ?shape.dims(),
        "read stack"
    );
    Ok(ImageStack::new(shape, buffer.into_data())?)
}

/// Sample bytes above which stacks are written as BigTIFF.
///
/// Leaves 32 MiB of the classic 32-bit offset range for tags and Deflate
/// expansion.
pub const BIGTIFF_THRESHOLD: usize = u32::MAX as usize - (1 << 25) + 1;

/// TIFF container flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffVariant {
    /// Classic TIFF, 32-bit offsets.
    Classic,
    /// BigTIFF, 64-bit offsets.
    Big,
}

impl TiffVariant {
    /// Variant able to hold `byte_len` bytes of sample data.
    pub fn for_byte_len(byte_len: usize) -> Self {
        if byte_len >= BIGTIFF_THRESHOLD {
            TiffVariant::Big
        } else {
            TiffVariant::Classic
        }
    }
}

/// Writes a z-stack as a Deflate-compressed multi-page TIFF.
///
/// Supports 1, 3 and 4 channels. Large stacks are written as BigTIFF, see
/// [`TiffVariant::for_byte_len`].
pub fn write_stack<P: AsRef<Path>>(path: P, stack: &ImageStack) -> IoResult<()> {
    write_stack_as(path, stack, TiffVariant::for_byte_len(stack.byte_len()))
}

/// Writes a z-stack in an explicit container variant.
pub fn write_stack_as<P: AsRef<Path>>(path: P, stack: &ImageStack, variant: TiffVariant) -> IoResult<()> {
    let path = path.as_ref();
    trace!(path = %path.display(), ?variant, "tiff::write_stack");

    let shape = stack.shape();
    let description = serde_json::to_string(&ShapeDescription {
        shape: shape.dims(),
        axes: Some(shape.axes().as_str().to_string()),
    })
    .map_err(|e| IoError::EncodeError(e.to_string()))?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    match variant {
        TiffVariant::Classic => {
            let mut encoder = TiffEncoder::new(&mut writer)
                .map_err(|e: tiff::TiffError| IoError::EncodeError(e.to_string()))?
                .with_compression(Compression::Deflate(DeflateLevel::Best));
            encode_stack(&mut encoder, stack, &description)?;
        }
        TiffVariant::Big => {
            let mut encoder = TiffEncoder::new_big(&mut writer)
                .map_err(|e: tiff::TiffError| IoError::EncodeError(e.to_string()))?
                .with_compression(Compression::Deflate(DeflateLevel::Best));
            encode_stack(&mut encoder, stack, &description)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn encode_stack<W, K>(encoder: &mut TiffEncoder<W, K>, stack: &ImageStack, description: &str) -> IoResult<()>
where
    W: Write + Seek,
    K: TiffKind,
{
    let shape = stack.shape();
    match (stack.data(), shape.channel_count()) {
        (StackData::U8(d), 1) => write_pages::<_, _, colortype::Gray8>(encoder, shape, d, description),
        (StackData::U8(d), 3) => write_pages::<_, _, colortype::RGB8>(encoder, shape, d, description),
        (StackData::U8(d), 4) => write_pages::<_, _, colortype::RGBA8>(encoder, shape, d, description),
        (StackData::U16(d), 1) => write_pages::<_, _, colortype::Gray16>(encoder, shape, d, description),
        (StackData::U16(d), 3) => write_pages::<_, _, colortype::RGB16>(encoder, shape, d, description),
        (StackData::U16(d), 4) => write_pages::<_, _, colortype::RGBA16>(encoder, shape, d, description),
        (StackData::U32(d), 1) => write_pages::<_, _, colortype::Gray32>(encoder, shape, d, description),
        (StackData::U32(d), 3) => write_pages::<_, _, colortype::RGB32>(encoder, shape, d, description),
        (StackData::U32(d), 4) => write_pages::<_, _, colortype::RGBA32>(encoder, shape, d, description),
        (_, c) => Err(IoError::UnsupportedFormat(format!(
            "cannot encode {c} channels as TIFF pages"
        ))),
    }
}

fn write_pages<W, K, C>(
    encoder: &mut TiffEncoder<W, K>,
    shape: StackShape,
    data: &[C::Inner],
    description: &str,
) -> IoResult<()>
where
    W: Write + Seek,
    K: TiffKind,
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let width = u32::try_from(shape.width)
        .map_err(|_| IoError::EncodeError(format!("width {} exceeds TIFF limits", shape.width)))?;
    let height = u32::try_from(shape.height)
        .map_err(|_| IoError::EncodeError(format!("height {} exceeds TIFF limits", shape.height)))?;

    for (z, page) in data.chunks_exact(shape.slice_len()).enumerate() {
        let mut image = encoder
            .new_image::<C>(width, height)
            .map_err(|e: tiff::TiffError| IoError::EncodeError(e.to_string()))?;
        if z == 0 {
            image
                .encoder()
                .write_tag(Tag::ImageDescription, description)
                .map_err(|e: tiff::TiffError| IoError::EncodeError(e.to_string()))?;
        }
        image
            .write_data(page)
            .map_err(|e: tiff::TiffError| IoError::EncodeError(e.to_string()))?;
    }
    Ok(())
}

/// Reads a single-page grayscale calibration field.
pub fn read_field<P: AsRef<Path>>(path: P) -> IoResult<Field> {
    let path = path.as_ref();
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions()?;
    if channels_of(decoder.colortype()?)? != 1 {
        return Err(IoError::UnsupportedFormat(format!(
            "calibration field {} is not single-channel",
            path.display()
        )));
    }

    let data: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => {
            return Err(IoError::UnsupportedSampleType(format!(
                "signed calibration field {}",
                path.display()
            )));
        }
    };

    if decoder.more_images() {
        return Err(IoError::InvalidFile(format!(
            "calibration field {} has more than one page",
            path.display()
        )));
    }

    Ok(Field::new(height as usize, width as usize, data)?)
}

/// Writes a calibration field as a single-page 64-bit float TIFF.
pub fn write_field<P: AsRef<Path>>(path: P, field: &Field) -> IoResult<()> {
    let (height, width) = field.shape();
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    {
        let mut encoder = TiffEncoder::new(&mut writer)
            .map_err(|e: tiff::TiffError| IoError::EncodeError(e.to_string()))?;
        encoder
            .write_image::<colortype::Gray64Float>(width as u32, height as u32, field.data())
            .map_err(|e: tiff::TiffError| IoError::EncodeError(e.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_rgb16() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rgb.tif");
        let shape = StackShape::zyxc(3, 8, 5, 3);
        let data: Vec<u16> = (0..shape.len()).map(|i| (i * 37 % 65535) as u16).collect();
        let stack = ImageStack::new(shape, data).unwrap();

        write_stack(&path, &stack).unwrap();
        let loaded = read_stack(&path).unwrap();
        assert_eq!(loaded, stack);
    }

    #[test]
    fn test_roundtrip_gray8_zyx() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gray.tif");
        let shape = StackShape::zyx(4, 6, 6);
        let stack = ImageStack::new(shape, vec![42u8; shape.len()]).unwrap();

        write_stack(&path, &stack).unwrap();
        let loaded = read_stack(&path).unwrap();
        assert_eq!(loaded.shape(), shape);
        assert_eq!(loaded.shape().axes().as_str(), "ZYX");
    }

    #[test]
    fn test_single_channel_axis_survives() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1.tif");
        let shape = StackShape::zyxc(2, 4, 4, 1);
        let stack = ImageStack::new(shape, vec![7u32; shape.len()]).unwrap();

        write_stack(&path, &stack).unwrap();
        assert_eq!(read_stack(&path).unwrap().shape(), shape);
    }

    /// Header version: 42 for classic TIFF, 43 for BigTIFF.
    fn tiff_version(path: &Path) -> u16 {
        let header = std::fs::read(path).unwrap();
        match &header[..2] {
            b"MM" => u16::from_be_bytes([header[2], header[3]]),
            _ => u16::from_le_bytes([header[2], header[3]]),
        }
    }

    #[test]
    fn test_bigtiff_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.tif");
        let shape = StackShape::zyxc(3, 5, 4, 3);
        let data: Vec<u16> = (0..shape.len()).map(|i| (i * 211 % 65535) as u16).collect();
        let stack = ImageStack::new(shape, data).unwrap();

        write_stack_as(&path, &stack, TiffVariant::Big).unwrap();
        assert_eq!(tiff_version(&path), 43);
        assert_eq!(read_stack(&path).unwrap(), stack);

        let single = StackShape::zyxc(2, 3, 3, 1);
        let gray = ImageStack::new(single, vec![9u8; single.len()]).unwrap();
        write_stack_as(&path, &gray, TiffVariant::Big).unwrap();
        assert_eq!(read_stack(&path).unwrap(), gray);
    }

    #[test]
    fn test_variant_follows_size() {
        assert_eq!(TiffVariant::for_byte_len(0), TiffVariant::Classic);
        assert_eq!(TiffVariant::for_byte_len(BIGTIFF_THRESHOLD - 1), TiffVariant::Classic);
        assert_eq!(TiffVariant::for_byte_len(BIGTIFF_THRESHOLD), TiffVariant::Big);
        assert_eq!(TiffVariant::for_byte_len(usize::MAX), TiffVariant::Big);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.tif");
        let shape = StackShape::zyx(1, 2, 2);
        write_stack(&path, &ImageStack::new(shape, vec![1u8; 4]).unwrap()).unwrap();
        assert_eq!(tiff_version(&path), 42);
    }

    #[test]
    fn test_two_channels_rejected() {
        let dir = TempDir::new().unwrap();
        let shape = StackShape::zyxc(1, 2, 2, 2);
        let stack = ImageStack::new(shape, vec![0u16; shape.len()]).unwrap();
        let err = write_stack(dir.path().join("c2.tif"), &stack).unwrap_err();
        assert!(matches!(err, IoError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_field_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v.tif");
        let field = Field::new(3, 2, vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0]).unwrap();
        write_field(&path, &field).unwrap();
        assert_eq!(read_field(&path).unwrap(), field);
    }

    #[test]
    fn test_missing_file() {
        let err = read_stack("/nonexistent/stack.tif").unwrap_err();
        assert!(matches!(err, IoError::Io(_)));
    }
}
