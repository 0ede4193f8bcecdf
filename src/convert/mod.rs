mod scalar;

use crate::error::{CaptureError, CaptureResult};

/// Source layout of a mapped BGRA8 surface: `height` rows of `width`
/// pixels, each row starting `stride` bytes after the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BgraLayout {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
}

impl BgraLayout {
    pub fn row_bytes(&self) -> CaptureResult<usize> {
        self.width.checked_mul(4).ok_or(CaptureError::BufferOverflow)
    }

    /// Bytes a source buffer must hold: full strides for every row but the
    /// last, which only needs its visible pixels.
    pub fn required_len(&self) -> CaptureResult<usize> {
        if self.height == 0 {
            return Ok(0);
        }
        let row_bytes = self.row_bytes()?;
        if self.stride < row_bytes {
            return Err(CaptureError::BufferOverflow);
        }
        self.stride
            .checked_mul(self.height - 1)
            .and_then(|base| base.checked_add(row_bytes))
            .ok_or(CaptureError::BufferOverflow)
    }
}

/// Convert one row of BGRA pixels to opaque RGBA.
pub fn convert_bgra_row_to_rgba(src: &[u8], dst: &mut [u8]) -> CaptureResult<()> {
    if src.len() % 4 != 0 || dst.len() != src.len() {
        return Err(CaptureError::BufferOverflow);
    }
    // SAFETY: both slices hold exactly `src.len() / 4` pixels and cannot
    // overlap because `dst` is a unique borrow.
    unsafe {
        scalar::convert_bgra_to_rgba_scalar_unchecked(
            src.as_ptr(),
            dst.as_mut_ptr(),
            src.len() / 4,
        );
    }
    Ok(())
}

/// Convert a strided BGRA surface into a tightly packed RGBA buffer.
pub fn convert_bgra_surface_to_rgba(
    src: &[u8],
    layout: BgraLayout,
    dst: &mut [u8],
) -> CaptureResult<()> {
    let row_bytes = layout.row_bytes()?;
    if src.len() < layout.required_len()? {
        return Err(CaptureError::BufferOverflow);
    }
    let dst_required = row_bytes
        .checked_mul(layout.height)
        .ok_or(CaptureError::BufferOverflow)?;
    if dst.len() != dst_required {
        return Err(CaptureError::BufferOverflow);
    }
    if row_bytes == 0 {
        return Ok(());
    }

    for (row, dst_row) in dst.chunks_exact_mut(row_bytes).enumerate() {
        let start = row * layout.stride;
        convert_bgra_row_to_rgba(&src[start..start + row_bytes], dst_row)?;
    }
    Ok(())
}
