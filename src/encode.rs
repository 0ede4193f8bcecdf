use std::io::{self, Cursor, Read};

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};

use crate::config::{DEFAULT_JPEG_QUALITY, DEFAULT_TARGET_WIDTH};
use crate::error::{CaptureError, CaptureResult};
use crate::frame::Frame;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Largest width or height a baseline JPEG frame header can carry.
pub const MAX_JPEG_DIMENSION: u32 = u16::MAX as u32;

/// A JPEG buffer together with the dimensions it was encoded at.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl EncodedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Output size for a `width` x `height` surface scaled to `target_width`:
/// the height keeps the aspect ratio, rounded half-to-even, and never
/// drops below one pixel. Sizes a JPEG cannot hold are rejected here,
/// before any pixel buffer is allocated.
pub fn target_dimensions(
    width: u32,
    height: u32,
    target_width: u32,
) -> CaptureResult<(u32, u32)> {
    if width == 0 || height == 0 {
        return Err(CaptureError::Encode(format!(
            "cannot scale an empty {width}x{height} surface"
        )));
    }
    if target_width == 0 {
        return Err(CaptureError::InvalidConfig(
            "target width must be positive".into(),
        ));
    }
    let scaled = f64::from(target_width) * f64::from(height) / f64::from(width);
    let target_height = scaled.round_ties_even().max(1.0);
    if target_width > MAX_JPEG_DIMENSION || target_height > f64::from(MAX_JPEG_DIMENSION) {
        return Err(CaptureError::Encode(format!(
            "{width}x{height} surface scales to {target_width}x{target_height}, \
             beyond the JPEG limit of {MAX_JPEG_DIMENSION}"
        )));
    }
    Ok((target_width, target_height as u32))
}

/// Downscales captured surfaces to a fixed width and encodes them as JPEG
/// with linear interpolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageEncoder {
    target_width: u32,
    quality: u8,
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageEncoder {
    pub fn new(target_width: u32, quality: u8) -> CaptureResult<Self> {
        if target_width == 0 {
            return Err(CaptureError::InvalidConfig(
                "target width must be positive".into(),
            ));
        }
        if !(1..=100).contains(&quality) {
            return Err(CaptureError::InvalidConfig(format!(
                "jpeg quality must be within 1..=100, got {quality}"
            )));
        }
        Ok(Self {
            target_width,
            quality,
        })
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    pub fn encode(&self, frame: Frame) -> CaptureResult<EncodedImage> {
        self.encode_while(frame, || true)
    }

    /// Like [`encode`](Self::encode), but gives up with
    /// [`CaptureError::Timeout`] as soon as `keep_going` turns false. It is
    /// polled before the resize and again before JPEG compression.
    pub fn encode_while(
        &self,
        frame: Frame,
        keep_going: impl Fn() -> bool,
    ) -> CaptureResult<EncodedImage> {
        let (width, height) =
            target_dimensions(frame.width(), frame.height(), self.target_width)?;
        if !keep_going() {
            return Err(CaptureError::Timeout);
        }
        let source = frame.into_rgba_image()?;
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);
        if !keep_going() {
            return Err(CaptureError::Timeout);
        }
        let rgb = DynamicImage::ImageRgba8(resized).into_rgb8();

        let mut stream = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut stream, self.quality)
            .encode_image(&rgb)
            .map_err(|err| CaptureError::Encode(err.to_string()))?;

        let reported_len = stream.get_ref().len();
        stream.set_position(0);
        let bytes = drain_to_fixed_buffer(stream, reported_len).map_err(|err| {
            CaptureError::Encode(format!("failed to read encoded stream: {err}"))
        })?;
        if !bytes.starts_with(&JPEG_SOI) || !bytes.ends_with(&JPEG_EOI) {
            return Err(CaptureError::Encode(format!(
                "encoded stream is incomplete ({} of {reported_len} bytes)",
                bytes.len()
            )));
        }

        Ok(EncodedImage {
            bytes,
            width,
            height,
        })
    }
}

/// Read `reader` into a buffer of `reported_len` bytes, looping over short
/// reads, and truncate to what was actually filled.
pub(crate) fn drain_to_fixed_buffer<R: Read>(
    mut reader: R,
    reported_len: usize,
) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; reported_len];
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    buffer.truncate(filled);
    Ok(buffer)
}
