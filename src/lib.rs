pub mod access;
pub mod backend;
pub mod capture_session;
pub mod config;
pub mod convert;
pub mod device;
pub mod diagnostics;
pub mod encode;
pub mod engine;
pub(crate) mod env_config;
pub mod error;
pub mod fallback;
pub mod frame;
pub mod item;
pub mod monitor;
mod platform;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

use error::CaptureResult;

/// A native surface the interop factory can turn into a capture item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureTarget {
    Monitor(monitor::MonitorHandle),

    Window(window::WindowHandle),
}

/// Which monitor a capture attempt should aim for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TargetSelector {
    /// The monitor under the current foreground window.
    #[default]
    ActiveWindow,

    /// A monitor by device name such as `\\.\DISPLAY1`, matched
    /// case-insensitively. Falls back to the active window's monitor when
    /// nothing matches.
    DeviceName(String),
}

impl TargetSelector {
    /// Blank or missing names select the active window's monitor.
    pub fn from_device_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(name) if !name.is_empty() => Self::DeviceName(name.to_owned()),
            _ => Self::ActiveWindow,
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        match self {
            Self::ActiveWindow => None,
            Self::DeviceName(name) => Some(name),
        }
    }
}

pub use access::{AccessStatus, PlatformCapabilities};
pub use config::CaptureConfig;
pub use diagnostics::{CaptureReport, CaptureTier};
pub use encode::{EncodedImage, ImageEncoder};
pub use engine::{CaptureEngine, CaptureEngineBuilder};
pub use error::CaptureError;
pub use frame::Frame;
pub use monitor::{MonitorBounds, MonitorHandle, MonitorInfo};
pub use platform::PlatformBackend;
pub use window::WindowHandle;

/// Capture with the shared engine and its configured timeout.
pub fn capture_once(selector: &TargetSelector) -> CaptureResult<Option<EncodedImage>> {
    CaptureEngine::shared().capture(selector)
}

/// Diagnostic capture with the shared engine.
pub fn capture_with_diagnostics(
    selector: &TargetSelector,
    timeout: std::time::Duration,
) -> CaptureReport {
    CaptureEngine::shared().capture_with_diagnostics(selector, timeout)
}
