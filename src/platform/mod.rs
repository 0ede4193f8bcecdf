#[cfg(target_os = "windows")]
pub(crate) mod windows;

/// The backend `CaptureEngine` uses unless another is supplied.
#[cfg(target_os = "windows")]
pub type PlatformBackend = windows::WindowsBackend;

#[cfg(not(target_os = "windows"))]
pub type PlatformBackend = unsupported::UnsupportedBackend;

#[cfg(not(target_os = "windows"))]
mod unsupported {
    use std::sync::Arc;

    use crate::CaptureTarget;
    use crate::access::{AccessStatus, PlatformCapabilities};
    use crate::backend::{BoundSession, CaptureBackend, CaptureItem, DisplayPlatform, FrameHandler};
    use crate::error::{CaptureError, CaptureResult};
    use crate::frame::Frame;
    use crate::item::RawItemResult;
    use crate::monitor::{MonitorBounds, MonitorHandle, MonitorInfo};
    use crate::window::WindowHandle;

    fn unsupported_error() -> CaptureError {
        CaptureError::Unsupported("screen capture is only supported on Windows".to_string())
    }

    /// Reports the capture API as unavailable so every attempt fails fast.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct UnsupportedBackend;

    impl UnsupportedBackend {
        pub fn new() -> Self {
            Self
        }
    }

    /// Never constructed.
    pub enum NoItem {}

    impl CaptureItem for NoItem {
        fn size(&self) -> CaptureResult<(i32, i32)> {
            match *self {}
        }
    }

    /// Never constructed.
    pub enum NoSession {}

    impl BoundSession for NoSession {
        fn set_frame_handler(&mut self, _handler: FrameHandler) -> CaptureResult<()> {
            match *self {}
        }

        fn suppress_border(&self) -> CaptureResult<()> {
            match *self {}
        }

        fn start(&self) -> CaptureResult<()> {
            match *self {}
        }

        fn close(self) {
            match self {}
        }
    }

    impl DisplayPlatform for UnsupportedBackend {
        fn enumerate_monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
            Err(unsupported_error())
        }

        fn monitor_from_point(&self, _x: i32, _y: i32) -> MonitorHandle {
            MonitorHandle::NULL
        }

        fn foreground_window(&self) -> Option<WindowHandle> {
            None
        }

        fn monitor_from_window(&self, _window: WindowHandle) -> MonitorHandle {
            MonitorHandle::NULL
        }
    }

    impl CaptureBackend for UnsupportedBackend {
        type Apartment = ();
        type Device = ();
        type Item = NoItem;
        type Session = NoSession;

        fn enter_apartment(&self) -> CaptureResult<()> {
            Ok(())
        }

        fn is_supported(&self) -> CaptureResult<bool> {
            Ok(false)
        }

        fn probe_capabilities(&self) -> PlatformCapabilities {
            PlatformCapabilities::default()
        }

        fn create_device(&self) -> CaptureResult<()> {
            Err(unsupported_error())
        }

        fn item_interface_id(&self) -> String {
            String::new()
        }

        fn create_item(&self, _target: CaptureTarget) -> CaptureResult<RawItemResult<NoItem>> {
            Err(unsupported_error())
        }

        fn request_access(&self) -> CaptureResult<AccessStatus> {
            Err(unsupported_error())
        }

        fn bind_session(&self, _device: &Arc<()>, item: &NoItem) -> CaptureResult<NoSession> {
            match *item {}
        }

        fn copy_desktop(&self, _bounds: MonitorBounds) -> CaptureResult<Frame> {
            Err(unsupported_error())
        }

        fn virtual_desktop_bounds(&self) -> MonitorBounds {
            MonitorBounds::new(0, 0, 0, 0)
        }
    }
}
