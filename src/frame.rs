use image::RgbaImage;

use crate::convert::{self, BgraLayout};
use crate::error::{CaptureError, CaptureResult};

/// CPU-side copy of a captured surface, tightly packed RGBA8.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> CaptureResult<Self> {
        let expected = rgba_len(width, height)?;
        if data.len() != expected {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "rgba buffer length mismatch: expected {expected} bytes for {width}x{height}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Copy a mapped BGRA8 surface (GPU staging texture or DIB section)
    /// whose rows are `stride` bytes apart.
    pub fn from_bgra_surface(
        width: u32,
        height: u32,
        stride: usize,
        src: &[u8],
    ) -> CaptureResult<Self> {
        let mut data = vec![0u8; rgba_len(width, height)?];
        let layout = BgraLayout {
            width: usize::try_from(width).map_err(|_| CaptureError::BufferOverflow)?,
            height: usize::try_from(height).map_err(|_| CaptureError::BufferOverflow)?,
            stride,
        };
        convert::convert_bgra_surface_to_rgba(src, layout, &mut data)?;
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_rgba_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_rgba_image(self) -> CaptureResult<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data)
            .ok_or(CaptureError::BufferOverflow)
    }
}

fn rgba_len(width: u32, height: u32) -> CaptureResult<usize> {
    let w = usize::try_from(width).map_err(|_| CaptureError::BufferOverflow)?;
    let h = usize::try_from(height).map_err(|_| CaptureError::BufferOverflow)?;
    w.checked_mul(h)
        .and_then(|px| px.checked_mul(4))
        .ok_or(CaptureError::BufferOverflow)
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data_len", &self.data.len())
            .finish()
    }
}
