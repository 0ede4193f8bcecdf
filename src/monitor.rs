use std::fmt;

use tracing::debug;

use crate::backend::DisplayPlatform;
use crate::error::{CaptureError, CaptureResult};
use crate::window::WindowHandle;

/// Native monitor handle. Zero is the "not found" sentinel and must be
/// checked before the handle is used for anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MonitorHandle {
    handle: isize,
}

impl MonitorHandle {
    pub const NULL: Self = Self { handle: 0 };

    pub const fn from_raw_handle(raw_handle: isize) -> Self {
        Self { handle: raw_handle }
    }

    pub const fn raw_handle(&self) -> isize {
        self.handle
    }

    pub const fn is_null(&self) -> bool {
        self.handle == 0
    }
}

impl fmt::Display for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.handle as usize)
    }
}

/// Monitor rectangle in virtual-desktop coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorBounds {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl MonitorBounds {
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// A point strictly inside the rectangle, at most one pixel from the
    /// top-left corner, so that monitors sharing an edge resolve
    /// unambiguously.
    pub fn interior_point(&self) -> (i32, i32) {
        let dx = (self.width - 1).clamp(0, 1);
        let dy = (self.height - 1).clamp(0, 1);
        (self.left + dx, self.top + dy)
    }
}

impl fmt::Display for MonitorBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{} {}x{}",
            self.left, self.top, self.width, self.height
        )
    }
}

/// One entry of the system monitor list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorInfo {
    pub handle: MonitorHandle,
    /// Device name such as `\\.\DISPLAY1`.
    pub device_name: String,
    pub bounds: MonitorBounds,
    pub is_primary: bool,
}

impl MonitorInfo {
    /// Human-readable entry for a monitor picker, numbered from one.
    pub fn label(&self, index: usize) -> String {
        let primary = if self.is_primary { " (primary)" } else { "" };
        format!(
            "{}: {}{}  [{}]",
            index + 1,
            self.device_name,
            primary,
            self.bounds
        )
    }
}

/// Outcome of a by-name lookup. `handle` is the null sentinel when no
/// enumerated monitor matched or the point query failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedMonitor {
    pub handle: MonitorHandle,
    pub info: Option<MonitorInfo>,
}

/// Monitor under the current foreground window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveWindowMonitor {
    pub window: WindowHandle,
    pub handle: MonitorHandle,
}

pub struct MonitorResolver<'a, P: ?Sized> {
    platform: &'a P,
}

impl<'a, P: DisplayPlatform + ?Sized> MonitorResolver<'a, P> {
    pub fn new(platform: &'a P) -> Self {
        Self { platform }
    }

    pub fn find_by_name(&self, device_name: &str) -> CaptureResult<Option<MonitorInfo>> {
        Ok(self
            .platform
            .enumerate_monitors()?
            .into_iter()
            .find(|monitor| monitor.device_name.eq_ignore_ascii_case(device_name)))
    }

    /// Resolve a device name to a monitor handle through an interior point.
    /// A missing monitor is not an error: the result carries the null handle.
    pub fn resolve_by_name(&self, device_name: &str) -> CaptureResult<ResolvedMonitor> {
        let Some(info) = self.find_by_name(device_name)? else {
            debug!(device_name, "no enumerated monitor matches device name");
            return Ok(ResolvedMonitor {
                handle: MonitorHandle::NULL,
                info: None,
            });
        };

        let (x, y) = info.bounds.interior_point();
        let handle = self.platform.monitor_from_point(x, y);
        debug!(
            device_name,
            hmonitor = %handle,
            bounds = %info.bounds,
            "resolved monitor by interior point"
        );
        Ok(ResolvedMonitor {
            handle,
            info: Some(info),
        })
    }

    pub fn resolve_for_active_window(&self) -> CaptureResult<ActiveWindowMonitor> {
        let window = self
            .platform
            .foreground_window()
            .filter(|window| !window.is_null())
            .ok_or(CaptureError::NoForegroundWindow)?;
        let handle = self.platform.monitor_from_window(window);
        debug!(hwnd = %window, hmonitor = %handle, "resolved monitor for foreground window");
        Ok(ActiveWindowMonitor { window, handle })
    }

    /// Pick the monitor a settings surface should preselect: the saved
    /// device name if it still exists, else the primary, else the first.
    pub fn default_selection(&self, saved: Option<&str>) -> CaptureResult<Option<MonitorInfo>> {
        let monitors = self.platform.enumerate_monitors()?;
        if let Some(saved) = saved
            && let Some(found) = monitors
                .iter()
                .find(|monitor| monitor.device_name.eq_ignore_ascii_case(saved))
        {
            return Ok(Some(found.clone()));
        }
        Ok(monitors
            .iter()
            .find(|monitor| monitor.is_primary)
            .or_else(|| monitors.first())
            .cloned())
    }
}

pub fn enumerate_monitors() -> CaptureResult<Vec<MonitorInfo>> {
    crate::engine::CaptureEngine::shared().monitors()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    #[test]
    fn interior_point_stays_inside_degenerate_bounds() {
        assert_eq!(MonitorBounds::new(0, 0, 1920, 1080).interior_point(), (1, 1));
        assert_eq!(MonitorBounds::new(-1280, 200, 1, 1).interior_point(), (-1280, 200));
        assert_eq!(MonitorBounds::new(1920, 0, 0, 0).interior_point(), (1920, 0));
    }

    #[test]
    fn resolves_every_enumerated_name_case_insensitively() {
        let backend = MockBackend::dual_monitor();
        let resolver = MonitorResolver::new(&backend);

        for name in [r"\\.\DISPLAY1", r"\\.\display2"] {
            let resolved = resolver.resolve_by_name(name).unwrap();
            assert!(!resolved.handle.is_null(), "{name} should resolve");
            assert!(resolved.info.is_some());
        }
        assert_eq!(
            resolver.resolve_by_name(r"\\.\DISPLAY1").unwrap().handle,
            MockBackend::PRIMARY
        );
        assert_eq!(
            resolver.resolve_by_name(r"\\.\DISPLAY2").unwrap().handle,
            MockBackend::SECONDARY
        );
    }

    #[test]
    fn unknown_name_yields_null_sentinel() {
        let backend = MockBackend::dual_monitor();
        let resolver = MonitorResolver::new(&backend);
        let resolved = resolver.resolve_by_name(r"\\.\DISPLAY9").unwrap();
        assert!(resolved.handle.is_null());
        assert!(resolved.info.is_none());
    }

    #[test]
    fn active_window_requires_foreground_window() {
        let backend = MockBackend::dual_monitor().without_foreground_window();
        let resolver = MonitorResolver::new(&backend);
        assert!(matches!(
            resolver.resolve_for_active_window(),
            Err(CaptureError::NoForegroundWindow)
        ));

        let backend = MockBackend::dual_monitor();
        let resolver = MonitorResolver::new(&backend);
        let active = resolver.resolve_for_active_window().unwrap();
        assert_eq!(active.window, MockBackend::FOREGROUND);
        assert_eq!(active.handle, MockBackend::PRIMARY);
    }

    #[test]
    fn default_selection_prefers_saved_then_primary() {
        let backend = MockBackend::dual_monitor();
        let resolver = MonitorResolver::new(&backend);

        let saved = resolver.default_selection(Some(r"\\.\display2")).unwrap();
        assert_eq!(saved.unwrap().device_name, r"\\.\DISPLAY2");

        let fallback = resolver.default_selection(Some("gone")).unwrap();
        assert!(fallback.unwrap().is_primary);
    }

    #[test]
    fn label_marks_primary_monitor() {
        let info = MonitorInfo {
            handle: MonitorHandle::from_raw_handle(0x10001),
            device_name: r"\\.\DISPLAY1".into(),
            bounds: MonitorBounds::new(0, 0, 1920, 1080),
            is_primary: true,
        };
        assert_eq!(info.label(0), r"1: \\.\DISPLAY1 (primary)  [0,0 1920x1080]");
        assert_eq!(info.handle.to_string(), "0x10001");
    }
}
