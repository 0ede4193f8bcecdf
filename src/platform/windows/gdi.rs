use std::ffi::c_void;
use std::mem::size_of;
use std::ptr::null_mut;

use anyhow::Context;
use windows::Win32::Foundation::{HANDLE, HWND};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CreateCompatibleDC, CreateDIBSection,
    DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, HBITMAP, HDC, HGDIOBJ, ReleaseDC, SRCCOPY,
    SelectObject,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN,
    SM_YVIRTUALSCREEN,
};

use crate::error::{CaptureError, CaptureResult};
use crate::frame::Frame;
use crate::monitor::MonitorBounds;

/// Screen DC, a compatible memory DC and a top-down 32bpp DIB selected
/// into it. Everything is released on drop.
struct GdiResources {
    screen_dc: HDC,
    mem_dc: HDC,
    bitmap: Option<HBITMAP>,
    old_bitmap: Option<HGDIOBJ>,
    bits: *mut u8,
    stride: usize,
}

impl GdiResources {
    fn new() -> CaptureResult<Self> {
        let screen_dc = unsafe { GetDC(HWND(null_mut())) };
        if screen_dc.0.is_null() {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "GetDC(NULL) returned null"
            )));
        }

        let mem_dc = unsafe { CreateCompatibleDC(screen_dc) };
        if mem_dc.0.is_null() {
            unsafe {
                let _ = ReleaseDC(HWND(null_mut()), screen_dc);
            }
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "CreateCompatibleDC failed"
            )));
        }

        Ok(Self {
            screen_dc,
            mem_dc,
            bitmap: None,
            old_bitmap: None,
            bits: null_mut(),
            stride: 0,
        })
    }

    fn create_surface(&mut self, width: i32, height: i32) -> CaptureResult<()> {
        let mut info = BITMAPINFO::default();
        info.bmiHeader.biSize = size_of::<BITMAPINFOHEADER>() as u32;
        info.bmiHeader.biWidth = width;
        // Negative height: rows are top-down.
        info.bmiHeader.biHeight = -height;
        info.bmiHeader.biPlanes = 1;
        info.bmiHeader.biBitCount = 32;
        info.bmiHeader.biCompression = BI_RGB.0;

        let mut bits: *mut c_void = null_mut();
        let bitmap = unsafe {
            CreateDIBSection(
                self.mem_dc,
                &info,
                DIB_RGB_COLORS,
                &mut bits,
                HANDLE::default(),
                0,
            )
        }
        .context("CreateDIBSection failed")
        .map_err(CaptureError::Platform)?;

        let selected = unsafe { SelectObject(self.mem_dc, bitmap) };
        if selected.0.is_null() {
            unsafe {
                let _ = DeleteObject(bitmap);
            }
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "SelectObject failed for legacy capture bitmap"
            )));
        }

        self.bitmap = Some(bitmap);
        self.old_bitmap = Some(selected);
        self.bits = bits.cast();
        self.stride = usize::try_from(width)
            .ok()
            .and_then(|w| w.checked_mul(4))
            .ok_or(CaptureError::BufferOverflow)?;
        Ok(())
    }

    fn copy(&mut self, bounds: MonitorBounds) -> CaptureResult<Frame> {
        self.create_surface(bounds.width, bounds.height)?;

        unsafe {
            BitBlt(
                self.mem_dc,
                0,
                0,
                bounds.width,
                bounds.height,
                self.screen_dc,
                bounds.left,
                bounds.top,
                SRCCOPY,
            )
        }
        .context("BitBlt failed during legacy screen copy")
        .map_err(CaptureError::Platform)?;

        if self.bits.is_null() {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "CreateDIBSection returned no pixel buffer"
            )));
        }
        let width = bounds.width as u32;
        let height = bounds.height as u32;
        let len = self
            .stride
            .checked_mul(height as usize)
            .ok_or(CaptureError::BufferOverflow)?;
        // SAFETY: the DIB section holds `stride * height` bytes and stays
        // selected until `release_bitmap`.
        let src = unsafe { std::slice::from_raw_parts(self.bits.cast_const(), len) };
        Frame::from_bgra_surface(width, height, self.stride, src)
    }

    fn release_bitmap(&mut self) {
        if let Some(old_bitmap) = self.old_bitmap.take() {
            unsafe {
                let _ = SelectObject(self.mem_dc, old_bitmap);
            }
        }
        if let Some(bitmap) = self.bitmap.take() {
            unsafe {
                let _ = DeleteObject(bitmap);
            }
        }
        self.bits = null_mut();
        self.stride = 0;
    }
}

impl Drop for GdiResources {
    fn drop(&mut self) {
        self.release_bitmap();

        if !self.mem_dc.0.is_null() {
            unsafe {
                let _ = DeleteDC(self.mem_dc);
            }
        }
        if !self.screen_dc.0.is_null() {
            unsafe {
                let _ = ReleaseDC(HWND(null_mut()), self.screen_dc);
            }
        }
    }
}

/// Block-transfer a rectangle of the desktop, in virtual-screen
/// coordinates, into a CPU frame.
pub(crate) fn copy_screen_bounds(bounds: MonitorBounds) -> CaptureResult<Frame> {
    if bounds.is_empty() {
        return Err(CaptureError::Platform(anyhow::anyhow!(
            "invalid legacy capture bounds {}x{}",
            bounds.width,
            bounds.height
        )));
    }
    GdiResources::new()?.copy(bounds)
}

pub(crate) fn virtual_screen_bounds() -> MonitorBounds {
    unsafe {
        MonitorBounds::new(
            GetSystemMetrics(SM_XVIRTUALSCREEN),
            GetSystemMetrics(SM_YVIRTUALSCREEN),
            GetSystemMetrics(SM_CXVIRTUALSCREEN),
            GetSystemMetrics(SM_CYVIRTUALSCREEN),
        )
    }
}
