use std::sync::Arc;

use crate::CaptureTarget;
use crate::access::{AccessStatus, PlatformCapabilities};
use crate::error::CaptureResult;
use crate::frame::Frame;
use crate::item::RawItemResult;
use crate::monitor::{MonitorBounds, MonitorHandle, MonitorInfo};
use crate::window::WindowHandle;

/// Display topology queries: monitor enumeration and point/window lookups.
pub trait DisplayPlatform: Send + Sync {
    fn enumerate_monitors(&self) -> CaptureResult<Vec<MonitorInfo>>;

    /// Monitor containing the point, or the null handle.
    fn monitor_from_point(&self, x: i32, y: i32) -> MonitorHandle;

    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Monitor nearest to the window, or the null handle.
    fn monitor_from_window(&self, window: WindowHandle) -> MonitorHandle;
}

/// A capturable surface granted by the platform. Dropping it releases the
/// platform reference.
pub trait CaptureItem: Send {
    fn size(&self) -> CaptureResult<(i32, i32)>;
}

/// A frame popped from the session's frame pool.
pub trait CapturedFrame {
    fn content_size(&self) -> (u32, u32);

    /// Copy the frame's pixels to CPU memory.
    fn read_pixels(&self) -> CaptureResult<Frame>;
}

/// Handed to the frame handler on every arrival notification.
pub trait FrameSource {
    /// Pop the next buffered frame. `None` when the notification raced
    /// ahead of the frame or the pool is already closed.
    fn try_next_frame(&self) -> Option<Box<dyn CapturedFrame + '_>>;
}

/// Called on a platform thread once per frame arrival notification.
pub type FrameHandler = Arc<dyn Fn(&dyn FrameSource) + Send + Sync>;

/// A frame pool and capture session bound to one item.
pub trait BoundSession: Send + 'static {
    fn set_frame_handler(&mut self, handler: FrameHandler) -> CaptureResult<()>;

    /// Ask the platform not to draw the capture border. Best effort.
    fn suppress_border(&self) -> CaptureResult<()>;

    fn start(&self) -> CaptureResult<()>;

    /// Deregister the frame handler and close the session and frame pool.
    fn close(self)
    where
        Self: Sized;
}

/// Everything the fallback chain needs from the platform.
pub trait CaptureBackend: DisplayPlatform {
    /// Per-thread runtime initialization, torn down on drop.
    type Apartment;
    type Device: Send + Sync + 'static;
    type Item: CaptureItem;
    type Session: BoundSession;

    fn enter_apartment(&self) -> CaptureResult<Self::Apartment>;

    fn is_supported(&self) -> CaptureResult<bool>;

    fn probe_capabilities(&self) -> PlatformCapabilities;

    fn create_device(&self) -> CaptureResult<Self::Device>;

    /// Interface identifier requested from the item interop factory, as it
    /// appears in diagnostics.
    fn item_interface_id(&self) -> String;

    /// Call the interop factory for `target`. `Err` means the factory
    /// itself could not be obtained; a failing creation call is reported
    /// through the raw status.
    fn create_item(&self, target: CaptureTarget) -> CaptureResult<RawItemResult<Self::Item>>;

    fn request_access(&self) -> CaptureResult<AccessStatus>;

    /// The session may keep `device` alive for its frame handler.
    fn bind_session(
        &self,
        device: &Arc<Self::Device>,
        item: &Self::Item,
    ) -> CaptureResult<Self::Session>;

    /// Legacy screen copy of a rectangle in virtual-desktop coordinates.
    fn copy_desktop(&self, bounds: MonitorBounds) -> CaptureResult<Frame>;

    fn virtual_desktop_bounds(&self) -> MonitorBounds;
}
