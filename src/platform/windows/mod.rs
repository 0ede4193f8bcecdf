pub(crate) mod com;
pub(crate) mod d3d11;
pub(crate) mod gdi;
pub(crate) mod interop;
pub(crate) mod monitor;
pub(crate) mod surface;
pub(crate) mod wgc;

use std::sync::Arc;

use crate::CaptureTarget;
use crate::access::{AccessStatus, PlatformCapabilities};
use crate::backend::{CaptureBackend, DisplayPlatform};
use crate::error::CaptureResult;
use crate::frame::Frame;
use crate::item::RawItemResult;
use crate::monitor::{MonitorBounds, MonitorHandle, MonitorInfo};
use crate::window::WindowHandle;

pub use com::ApartmentGuard;
pub use d3d11::GpuDevice;
pub use interop::WgcItem;
pub use wgc::WgcSession;

/// Windows.Graphics.Capture on a hardware D3D11 device, with a GDI
/// desktop copy as the legacy path.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DisplayPlatform for WindowsBackend {
    fn enumerate_monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        monitor::enumerate_monitors()
    }

    fn monitor_from_point(&self, x: i32, y: i32) -> MonitorHandle {
        monitor::monitor_from_point(x, y)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        monitor::foreground_window()
    }

    fn monitor_from_window(&self, window: WindowHandle) -> MonitorHandle {
        monitor::monitor_from_window(window)
    }
}

impl CaptureBackend for WindowsBackend {
    type Apartment = ApartmentGuard;
    type Device = GpuDevice;
    type Item = WgcItem;
    type Session = WgcSession;

    fn enter_apartment(&self) -> CaptureResult<ApartmentGuard> {
        ApartmentGuard::enter_multithreaded()
    }

    fn is_supported(&self) -> CaptureResult<bool> {
        wgc::is_supported()
    }

    fn probe_capabilities(&self) -> PlatformCapabilities {
        wgc::probe_capabilities()
    }

    fn create_device(&self) -> CaptureResult<GpuDevice> {
        GpuDevice::create()
    }

    fn item_interface_id(&self) -> String {
        interop::item_interface_id()
    }

    fn create_item(&self, target: CaptureTarget) -> CaptureResult<RawItemResult<WgcItem>> {
        interop::create_item(target)
    }

    fn request_access(&self) -> CaptureResult<AccessStatus> {
        // The gate may run before the attempt's apartment is entered.
        let _apartment = self.enter_apartment()?;
        wgc::request_programmatic_access()
    }

    fn bind_session(&self, device: &Arc<GpuDevice>, item: &WgcItem) -> CaptureResult<WgcSession> {
        WgcSession::bind(device, item)
    }

    fn copy_desktop(&self, bounds: MonitorBounds) -> CaptureResult<Frame> {
        gdi::copy_screen_bounds(bounds)
    }

    fn virtual_desktop_bounds(&self) -> MonitorBounds {
        gdi::virtual_screen_bounds()
    }
}
