//! Scripted in-process backend for exercising the capture pipeline without
//! a display.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::CaptureTarget;
use crate::access::{AccessStatus, PlatformCapabilities};
use crate::backend::{
    BoundSession, CaptureBackend, CaptureItem, CapturedFrame, DisplayPlatform, FrameHandler,
    FrameSource,
};
use crate::error::{CaptureError, CaptureResult};
use crate::frame::Frame;
use crate::item::RawItemResult;
use crate::monitor::{MonitorBounds, MonitorHandle, MonitorInfo};
use crate::window::WindowHandle;

/// How the mock interop factory answers a creation call.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ItemScript {
    Item,
    NullPointer,
    Status(i32),
    FactoryError,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum ArrivalKind {
    Empty,
    Frame { width: u32, height: u32 },
    Corrupt,
}

/// One scripted frame arrival notification, `after` the previous one.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Arrival {
    after: Duration,
    kind: ArrivalKind,
}

impl Arrival {
    pub(crate) fn frame_after(after: Duration, width: u32, height: u32) -> Self {
        Self {
            after,
            kind: ArrivalKind::Frame { width, height },
        }
    }

    pub(crate) fn empty_after(after: Duration) -> Self {
        Self {
            after,
            kind: ArrivalKind::Empty,
        }
    }

    pub(crate) fn corrupt_after(after: Duration) -> Self {
        Self {
            after,
            kind: ArrivalKind::Corrupt,
        }
    }
}

#[derive(Default)]
pub(crate) struct MockCounters {
    support_probes: AtomicUsize,
    capability_probes: AtomicUsize,
    device_creations: AtomicUsize,
    monitor_items: AtomicUsize,
    window_items: AtomicUsize,
    items_released: AtomicUsize,
    access_requests: AtomicUsize,
    sessions_bound: AtomicUsize,
    sessions_closed: AtomicUsize,
    borders_suppressed: AtomicUsize,
    arrivals_delivered: AtomicUsize,
    frames_read: AtomicUsize,
    legacy_bounds: Mutex<Vec<MonitorBounds>>,
}

macro_rules! counter_getters {
    ($($name:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self) -> usize {
                self.$name.load(Ordering::SeqCst)
            }
        )*
    };
}

impl MockCounters {
    counter_getters!(
        support_probes,
        capability_probes,
        device_creations,
        monitor_items,
        window_items,
        items_released,
        access_requests,
        sessions_bound,
        sessions_closed,
        borders_suppressed,
        arrivals_delivered,
        frames_read,
    );

    pub(crate) fn items_created(&self) -> usize {
        self.monitor_items() + self.window_items()
    }

    pub(crate) fn legacy_bounds(&self) -> Vec<MonitorBounds> {
        self.legacy_bounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn bump(counter: &AtomicUsize) -> usize {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Clone)]
pub(crate) struct MockBackend {
    monitors: Vec<MonitorInfo>,
    foreground: Option<WindowHandle>,
    window_monitor: MonitorHandle,
    point_lookup_fails: bool,
    supported: bool,
    capabilities: PlatformCapabilities,
    access: Result<AccessStatus, String>,
    device_fails: bool,
    monitor_item: ItemScript,
    window_item: ItemScript,
    arrivals: Vec<Arrival>,
    bind_fails: bool,
    start_fails: bool,
    legacy_fails: bool,
    apartment_fails: bool,
    counters: Arc<MockCounters>,
}

impl MockBackend {
    pub(crate) const PRIMARY: MonitorHandle = MonitorHandle::from_raw_handle(0x10001);
    pub(crate) const SECONDARY: MonitorHandle = MonitorHandle::from_raw_handle(0x20002);
    pub(crate) const FOREGROUND: WindowHandle = WindowHandle::from_raw_handle(0x3F0);

    /// `\\.\DISPLAY1` (primary, 1920x1080 at the origin) and `\\.\DISPLAY2`
    /// (1280x1024 to its right). The foreground window sits on the primary.
    pub(crate) fn dual_monitor() -> Self {
        Self {
            monitors: vec![
                MonitorInfo {
                    handle: Self::PRIMARY,
                    device_name: r"\\.\DISPLAY1".into(),
                    bounds: MonitorBounds::new(0, 0, 1920, 1080),
                    is_primary: true,
                },
                MonitorInfo {
                    handle: Self::SECONDARY,
                    device_name: r"\\.\DISPLAY2".into(),
                    bounds: MonitorBounds::new(1920, 0, 1280, 1024),
                    is_primary: false,
                },
            ],
            foreground: Some(Self::FOREGROUND),
            window_monitor: Self::PRIMARY,
            point_lookup_fails: false,
            supported: true,
            capabilities: PlatformCapabilities {
                access_api: true,
                border_property: true,
            },
            access: Ok(AccessStatus::Allowed),
            device_fails: false,
            monitor_item: ItemScript::Item,
            window_item: ItemScript::Item,
            arrivals: vec![Arrival::frame_after(Duration::from_millis(5), 64, 36)],
            bind_fails: false,
            start_fails: false,
            legacy_fails: false,
            apartment_fails: false,
            counters: Arc::new(MockCounters::default()),
        }
    }

    pub(crate) fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }

    pub(crate) fn without_foreground_window(mut self) -> Self {
        self.foreground = None;
        self
    }

    pub(crate) fn with_window_monitor(mut self, handle: MonitorHandle) -> Self {
        self.window_monitor = handle;
        self
    }

    pub(crate) fn with_point_lookup_failure(mut self) -> Self {
        self.point_lookup_fails = true;
        self
    }

    pub(crate) fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    pub(crate) fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub(crate) fn with_access(mut self, access: Result<AccessStatus, String>) -> Self {
        self.access = access;
        self
    }

    pub(crate) fn with_failing_device(mut self) -> Self {
        self.device_fails = true;
        self
    }

    pub(crate) fn with_monitor_item(mut self, script: ItemScript) -> Self {
        self.monitor_item = script;
        self
    }

    pub(crate) fn with_window_item(mut self, script: ItemScript) -> Self {
        self.window_item = script;
        self
    }

    pub(crate) fn with_arrivals(mut self, arrivals: Vec<Arrival>) -> Self {
        self.arrivals = arrivals;
        self
    }

    pub(crate) fn with_failing_bind(mut self) -> Self {
        self.bind_fails = true;
        self
    }

    pub(crate) fn with_failing_start(mut self) -> Self {
        self.start_fails = true;
        self
    }

    pub(crate) fn with_legacy_failure(mut self) -> Self {
        self.legacy_fails = true;
        self
    }

    pub(crate) fn with_apartment_failure(mut self) -> Self {
        self.apartment_fails = true;
        self
    }

    pub(crate) fn monitor_item(&self) -> CaptureResult<MockItem> {
        self.create_item(CaptureTarget::Monitor(Self::PRIMARY))?
            .item
            .ok_or_else(|| CaptureError::NullItem("mock".into()))
    }

    fn item_size(&self, target: CaptureTarget) -> (i32, i32) {
        match target {
            CaptureTarget::Monitor(handle) => self
                .monitors
                .iter()
                .find(|monitor| monitor.handle == handle)
                .map(|monitor| (monitor.bounds.width, monitor.bounds.height))
                .unwrap_or((1920, 1080)),
            CaptureTarget::Window(_) => (800, 600),
        }
    }
}

pub(crate) struct MockDevice;

pub(crate) struct MockItem {
    size: (i32, i32),
    counters: Arc<MockCounters>,
}

impl CaptureItem for MockItem {
    fn size(&self) -> CaptureResult<(i32, i32)> {
        Ok(self.size)
    }
}

impl Drop for MockItem {
    fn drop(&mut self) {
        MockCounters::bump(&self.counters.items_released);
    }
}

pub(crate) struct MockSession {
    arrivals: Vec<Arrival>,
    start_fails: bool,
    handler: Option<FrameHandler>,
    counters: Arc<MockCounters>,
}

impl BoundSession for MockSession {
    fn set_frame_handler(&mut self, handler: FrameHandler) -> CaptureResult<()> {
        self.handler = Some(handler);
        Ok(())
    }

    fn suppress_border(&self) -> CaptureResult<()> {
        MockCounters::bump(&self.counters.borders_suppressed);
        Ok(())
    }

    fn start(&self) -> CaptureResult<()> {
        if self.start_fails {
            return Err(CaptureError::Platform(anyhow::anyhow!("StartCapture failed")));
        }
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| CaptureError::Platform(anyhow::anyhow!("no frame handler")))?;
        let arrivals = self.arrivals.clone();
        let counters = Arc::clone(&self.counters);
        // Keeps delivering after close, like a pool with notifications
        // already in flight.
        thread::spawn(move || {
            for arrival in arrivals {
                thread::sleep(arrival.after);
                MockCounters::bump(&counters.arrivals_delivered);
                let source = MockSource {
                    kind: arrival.kind,
                    counters: Arc::clone(&counters),
                };
                (*handler)(&source);
            }
        });
        Ok(())
    }

    fn close(self) {
        MockCounters::bump(&self.counters.sessions_closed);
    }
}

struct MockSource {
    kind: ArrivalKind,
    counters: Arc<MockCounters>,
}

impl FrameSource for MockSource {
    fn try_next_frame(&self) -> Option<Box<dyn CapturedFrame + '_>> {
        match self.kind {
            ArrivalKind::Empty => None,
            ArrivalKind::Frame { width, height } => Some(Box::new(MockFrame {
                width,
                height,
                corrupt: false,
                counters: &self.counters,
            })),
            ArrivalKind::Corrupt => Some(Box::new(MockFrame {
                width: 64,
                height: 36,
                corrupt: true,
                counters: &self.counters,
            })),
        }
    }
}

struct MockFrame<'a> {
    width: u32,
    height: u32,
    corrupt: bool,
    counters: &'a MockCounters,
}

impl CapturedFrame for MockFrame<'_> {
    fn content_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_pixels(&self) -> CaptureResult<Frame> {
        MockCounters::bump(&self.counters.frames_read);
        if self.corrupt {
            return Err(CaptureError::Platform(anyhow::anyhow!("surface copy failed")));
        }
        solid_frame(self.width, self.height)
    }
}

fn solid_frame(width: u32, height: u32) -> CaptureResult<Frame> {
    let pixels = (width as usize) * (height as usize);
    Frame::from_rgba8(width, height, [40u8, 90, 160, 255].repeat(pixels))
}

impl DisplayPlatform for MockBackend {
    fn enumerate_monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        Ok(self.monitors.clone())
    }

    fn monitor_from_point(&self, x: i32, y: i32) -> MonitorHandle {
        if self.point_lookup_fails {
            return MonitorHandle::NULL;
        }
        self.monitors
            .iter()
            .find(|monitor| {
                let b = monitor.bounds;
                x >= b.left && x < b.left + b.width && y >= b.top && y < b.top + b.height
            })
            .map(|monitor| monitor.handle)
            .unwrap_or(MonitorHandle::NULL)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.foreground
    }

    fn monitor_from_window(&self, _window: WindowHandle) -> MonitorHandle {
        self.window_monitor
    }
}

impl CaptureBackend for MockBackend {
    type Apartment = ();
    type Device = MockDevice;
    type Item = MockItem;
    type Session = MockSession;

    fn enter_apartment(&self) -> CaptureResult<()> {
        if self.apartment_fails {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "CoInitializeEx(COINIT_MULTITHREADED) failed"
            )));
        }
        Ok(())
    }

    fn is_supported(&self) -> CaptureResult<bool> {
        MockCounters::bump(&self.counters.support_probes);
        Ok(self.supported)
    }

    fn probe_capabilities(&self) -> PlatformCapabilities {
        MockCounters::bump(&self.counters.capability_probes);
        self.capabilities
    }

    fn create_device(&self) -> CaptureResult<MockDevice> {
        MockCounters::bump(&self.counters.device_creations);
        if self.device_fails {
            return Err(CaptureError::Platform(anyhow::anyhow!("no hardware adapter")));
        }
        Ok(MockDevice)
    }

    fn item_interface_id(&self) -> String {
        "{79c3f95b-31f7-4ec2-a464-632ef5d30760}".into()
    }

    fn create_item(&self, target: CaptureTarget) -> CaptureResult<RawItemResult<MockItem>> {
        let (script, created) = match target {
            CaptureTarget::Monitor(_) => (
                self.monitor_item,
                MockCounters::bump(&self.counters.monitor_items),
            ),
            CaptureTarget::Window(_) => (
                self.window_item,
                MockCounters::bump(&self.counters.window_items),
            ),
        };
        match script {
            ItemScript::Item => Ok(RawItemResult::created(
                0x5000 + created,
                MockItem {
                    size: self.item_size(target),
                    counters: Arc::clone(&self.counters),
                },
            )),
            ItemScript::NullPointer => Ok(RawItemResult {
                status: 0,
                pointer: 0,
                item: None,
            }),
            ItemScript::Status(status) => Ok(RawItemResult::failed(status)),
            ItemScript::FactoryError => Err(CaptureError::Platform(anyhow::anyhow!(
                "activation factory unavailable"
            ))),
        }
    }

    fn request_access(&self) -> CaptureResult<AccessStatus> {
        MockCounters::bump(&self.counters.access_requests);
        self.access
            .clone()
            .map_err(|message| CaptureError::Platform(anyhow::anyhow!(message)))
    }

    fn bind_session(
        &self,
        _device: &Arc<MockDevice>,
        _item: &MockItem,
    ) -> CaptureResult<MockSession> {
        MockCounters::bump(&self.counters.sessions_bound);
        if self.bind_fails {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "CreateFreeThreaded failed"
            )));
        }
        Ok(MockSession {
            arrivals: self.arrivals.clone(),
            start_fails: self.start_fails,
            handler: None,
            counters: Arc::clone(&self.counters),
        })
    }

    fn copy_desktop(&self, bounds: MonitorBounds) -> CaptureResult<Frame> {
        self.counters
            .legacy_bounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bounds);
        if self.legacy_fails {
            return Err(CaptureError::Platform(anyhow::anyhow!("BitBlt failed")));
        }
        if bounds.is_empty() {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "empty desktop bounds {bounds}"
            )));
        }
        // Scaled down so tests don't pay for full-size encodes.
        let width = (bounds.width as u32 / 20).max(1);
        let height = (bounds.height as u32 / 20).max(1);
        solid_frame(width, height)
    }

    fn virtual_desktop_bounds(&self) -> MonitorBounds {
        let left = self.monitors.iter().map(|m| m.bounds.left).min().unwrap_or(0);
        let top = self.monitors.iter().map(|m| m.bounds.top).min().unwrap_or(0);
        let right = self
            .monitors
            .iter()
            .map(|m| m.bounds.left + m.bounds.width)
            .max()
            .unwrap_or(0);
        let bottom = self
            .monitors
            .iter()
            .map(|m| m.bounds.top + m.bounds.height)
            .max()
            .unwrap_or(0);
        MonitorBounds::new(left, top, right - left, bottom - top)
    }
}
