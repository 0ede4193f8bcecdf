use std::ffi::c_void;
use std::ptr;

use anyhow::Context;
use windows::Graphics::Capture::GraphicsCaptureItem;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::core::{GUID, HRESULT, Interface};

use crate::CaptureTarget;
use crate::backend::CaptureItem;
use crate::error::{CaptureError, CaptureResult};
use crate::item::RawItemResult;

use super::monitor::{to_hmonitor, to_hwnd};

/// An owned `GraphicsCaptureItem`. Dropping it releases the reference the
/// interop call handed out.
pub struct WgcItem {
    item: GraphicsCaptureItem,
}

// SAFETY: GraphicsCaptureItem is an agile WinRT object.
unsafe impl Send for WgcItem {}

impl WgcItem {
    pub(crate) fn as_inner(&self) -> &GraphicsCaptureItem {
        &self.item
    }
}

impl CaptureItem for WgcItem {
    fn size(&self) -> CaptureResult<(i32, i32)> {
        let size = self
            .item
            .Size()
            .context("GraphicsCaptureItem::Size failed")
            .map_err(CaptureError::Platform)?;
        Ok((size.Width, size.Height))
    }
}

pub(crate) fn item_interface_id() -> String {
    format_guid(&<GraphicsCaptureItem as Interface>::IID)
}

fn format_guid(guid: &GUID) -> String {
    let d = guid.data4;
    format!(
        "{{{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}}}",
        guid.data1, guid.data2, guid.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
    )
}

/// Call the interop factory directly through its vtable so the raw status
/// and result pointer survive for diagnostics, including the success-with-
/// null case the projected wrapper would turn into an error.
pub(crate) fn create_item(target: CaptureTarget) -> CaptureResult<RawItemResult<WgcItem>> {
    let interop = windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()
        .context("failed to get IGraphicsCaptureItemInterop factory")
        .map_err(CaptureError::Platform)?;
    let iid = <GraphicsCaptureItem as Interface>::IID;
    let mut raw: *mut c_void = ptr::null_mut();

    let status: HRESULT = unsafe {
        let vtable = Interface::vtable(&interop);
        match target {
            CaptureTarget::Monitor(monitor) => (vtable.CreateForMonitor)(
                Interface::as_raw(&interop),
                to_hmonitor(monitor),
                &iid,
                &mut raw,
            ),
            CaptureTarget::Window(window) => (vtable.CreateForWindow)(
                Interface::as_raw(&interop),
                to_hwnd(window),
                &iid,
                &mut raw,
            ),
        }
    };

    let pointer = raw as usize;
    // SAFETY: a non-null out pointer is an owned GraphicsCaptureItem
    // reference for the requested IID.
    let item = (!raw.is_null()).then(|| WgcItem {
        item: unsafe { GraphicsCaptureItem::from_raw(raw) },
    });
    Ok(RawItemResult {
        status: status.0,
        pointer,
        item: if status.is_ok() { item } else { None },
    })
}
