/// Swap the blue and red channels of one packed little-endian BGRA pixel
/// and force it opaque. Desktop copies leave the alpha byte undefined.
#[inline(always)]
pub(crate) fn swap_bgra_to_opaque_rgba(pixel: u32) -> u32 {
    ((pixel & 0x0000_00FF) << 16)
        | (pixel & 0x0000_FF00)
        | ((pixel & 0x00FF_0000) >> 16)
        | 0xFF00_0000
}

/// # Safety
///
/// `src` and `dst` must each be valid for `pixel_count * 4` bytes and must
/// not overlap.
pub(crate) unsafe fn convert_bgra_to_rgba_scalar_unchecked(
    src: *const u8,
    dst: *mut u8,
    pixel_count: usize,
) {
    let mut src_px = src as *const u32;
    let mut dst_px = dst as *mut u32;
    let mut remaining = pixel_count;

    while remaining >= 4 {
        unsafe {
            let p0 = std::ptr::read_unaligned(src_px);
            let p1 = std::ptr::read_unaligned(src_px.add(1));
            let p2 = std::ptr::read_unaligned(src_px.add(2));
            let p3 = std::ptr::read_unaligned(src_px.add(3));

            std::ptr::write_unaligned(dst_px, swap_bgra_to_opaque_rgba(p0));
            std::ptr::write_unaligned(dst_px.add(1), swap_bgra_to_opaque_rgba(p1));
            std::ptr::write_unaligned(dst_px.add(2), swap_bgra_to_opaque_rgba(p2));
            std::ptr::write_unaligned(dst_px.add(3), swap_bgra_to_opaque_rgba(p3));
        }

        src_px = unsafe { src_px.add(4) };
        dst_px = unsafe { dst_px.add(4) };
        remaining -= 4;
    }

    while remaining != 0 {
        unsafe {
            let pixel = std::ptr::read_unaligned(src_px);
            std::ptr::write_unaligned(dst_px, swap_bgra_to_opaque_rgba(pixel));
        }

        src_px = unsafe { src_px.add(1) };
        dst_px = unsafe { dst_px.add(1) };
        remaining -= 1;
    }
}
