use std::ffi::c_void;
use std::mem;

use anyhow::anyhow;
use tracing::warn;
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITOR_DEFAULTTONEAREST, MONITORINFO,
    MONITORINFOEXW, MONITORINFOF_PRIMARY, MonitorFromPoint, MonitorFromWindow,
};
use windows::Win32::UI::WindowsAndMessaging::GetForegroundWindow;

use crate::error::{CaptureError, CaptureResult};
use crate::monitor::{MonitorBounds, MonitorHandle, MonitorInfo};
use crate::window::WindowHandle;

pub(crate) fn to_hmonitor(handle: MonitorHandle) -> HMONITOR {
    HMONITOR(handle.raw_handle() as *mut c_void)
}

pub(crate) fn to_hwnd(window: WindowHandle) -> HWND {
    HWND(window.raw_handle() as *mut c_void)
}

fn from_hmonitor(handle: HMONITOR) -> MonitorHandle {
    MonitorHandle::from_raw_handle(handle.0 as isize)
}

pub(crate) fn enumerate_monitors() -> CaptureResult<Vec<MonitorInfo>> {
    let mut handles: Vec<HMONITOR> = Vec::new();
    let ok = unsafe {
        EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(collect_monitor),
            LPARAM(&mut handles as *mut Vec<HMONITOR> as isize),
        )
    };
    if !ok.as_bool() {
        return Err(CaptureError::Platform(anyhow!("EnumDisplayMonitors failed")));
    }

    let mut monitors = Vec::with_capacity(handles.len());
    for handle in handles {
        match monitor_info(handle) {
            Some(info) => monitors.push(info),
            None => warn!(hmonitor = %from_hmonitor(handle), "GetMonitorInfoW failed; skipping"),
        }
    }
    Ok(monitors)
}

unsafe extern "system" fn collect_monitor(
    monitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    state: LPARAM,
) -> BOOL {
    // SAFETY: `state` is the `&mut Vec<HMONITOR>` passed by
    // `enumerate_monitors`, alive for the whole enumeration.
    let handles = unsafe { &mut *(state.0 as *mut Vec<HMONITOR>) };
    handles.push(monitor);
    true.into()
}

fn monitor_info(handle: HMONITOR) -> Option<MonitorInfo> {
    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;
    let ok = unsafe {
        GetMonitorInfoW(handle, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO)
    };
    if !ok.as_bool() {
        return None;
    }

    let name_len = info
        .szDevice
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(info.szDevice.len());
    let rect = info.monitorInfo.rcMonitor;
    Some(MonitorInfo {
        handle: from_hmonitor(handle),
        device_name: String::from_utf16_lossy(&info.szDevice[..name_len]),
        bounds: MonitorBounds::new(
            rect.left,
            rect.top,
            rect.right - rect.left,
            rect.bottom - rect.top,
        ),
        is_primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
    })
}

pub(crate) fn monitor_from_point(x: i32, y: i32) -> MonitorHandle {
    from_hmonitor(unsafe { MonitorFromPoint(POINT { x, y }, MONITOR_DEFAULTTONEAREST) })
}

pub(crate) fn foreground_window() -> Option<WindowHandle> {
    let hwnd = unsafe { GetForegroundWindow() };
    let window = WindowHandle::from_raw_handle(hwnd.0 as isize);
    (!window.is_null()).then_some(window)
}

pub(crate) fn monitor_from_window(window: WindowHandle) -> MonitorHandle {
    from_hmonitor(unsafe { MonitorFromWindow(to_hwnd(window), MONITOR_DEFAULTTONEAREST) })
}
