use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::TargetSelector;
use crate::access::{AccessGate, PlatformCapabilities};
use crate::backend::{CaptureBackend, CaptureItem};
use crate::capture_session::{CaptureSession, SessionOutcome};
use crate::config::CaptureConfig;
use crate::device::DeviceManager;
use crate::diagnostics::{CaptureReport, CaptureTier, Diagnostics};
use crate::encode::{EncodedImage, ImageEncoder};
use crate::error::{CaptureError, CaptureResult};
use crate::item::CaptureItemFactory;
use crate::monitor::{MonitorBounds, MonitorHandle, MonitorResolver};

enum NativeOutcome {
    Captured(EncodedImage, CaptureTier),
    TimedOut,
    /// Neither tier produced an item without raising.
    NoItem,
    Failed(CaptureError),
}

/// Where the legacy copy should look if the native tiers come up empty.
#[derive(Clone, Copy, Debug)]
enum LegacyTarget {
    Monitor(MonitorBounds),
    VirtualDesktop,
}

/// Ordered capture tiers for one attempt: monitor item, then foreground
/// window item, then a legacy copy of the screen.
///
/// A timeout ends the attempt without a legacy copy, since the native
/// pipeline was working and a legacy copy would only mask that.
pub struct FallbackChain<'a, B: CaptureBackend> {
    backend: &'a B,
    devices: &'a DeviceManager<B::Device>,
    capabilities: PlatformCapabilities,
    config: &'a CaptureConfig,
    encoder: ImageEncoder,
}

impl<'a, B: CaptureBackend> FallbackChain<'a, B> {
    pub fn new(
        backend: &'a B,
        devices: &'a DeviceManager<B::Device>,
        capabilities: PlatformCapabilities,
        config: &'a CaptureConfig,
        encoder: ImageEncoder,
    ) -> Self {
        Self {
            backend,
            devices,
            capabilities,
            config,
            encoder,
        }
    }

    pub fn run(&self, selector: &TargetSelector, timeout: Duration) -> CaptureReport {
        let mut diagnostics = Diagnostics::new();
        let resolver = MonitorResolver::new(self.backend);
        let mut legacy = LegacyTarget::VirtualDesktop;

        let mut monitor = None;
        if let Some(name) = selector.device_name() {
            diagnostics.line(format_args!("RequestedMonitorDevice: {name}"));
            match resolver.resolve_by_name(name) {
                Ok(resolved) => match resolved.info {
                    Some(info) => {
                        diagnostics.line(format_args!("ResolvedScreen: {}", info.device_name));
                        diagnostics.line(format_args!("MonitorFromPoint(HMONITOR): {}", resolved.handle));
                        legacy = LegacyTarget::Monitor(info.bounds);
                        monitor = Some(resolved.handle);
                    }
                    None => diagnostics.line("ResolvedScreen: NULL"),
                },
                Err(err) => {
                    warn!(error = %err, "monitor enumeration failed");
                    diagnostics.line(format_args!("ResolvedScreen: NULL ({err})"));
                }
            }
        }

        let monitor = match monitor {
            Some(handle) => handle,
            None => match resolver.resolve_for_active_window() {
                Ok(active) => {
                    diagnostics.line(format_args!("MonitorFromWindow(HMONITOR): {}", active.handle));
                    active.handle
                }
                Err(CaptureError::NoForegroundWindow) => {
                    diagnostics.line("GetForegroundWindow returned NULL");
                    return CaptureReport::failed(diagnostics);
                }
                Err(err) => {
                    diagnostics.line(format_args!("Exception: {err}"));
                    return CaptureReport::failed(diagnostics);
                }
            },
        };
        if monitor.is_null() {
            diagnostics.line("HMONITOR is null");
            return CaptureReport::failed(diagnostics);
        }

        let device = match self.device(&mut diagnostics) {
            Ok(device) => device,
            Err(err) => {
                diagnostics.line("Result: EXCEPTION");
                diagnostics.line(format_args!("Exception: {err}"));
                return CaptureReport::failed(diagnostics);
            }
        };

        match self.native_tiers(monitor, &device, timeout, &mut diagnostics) {
            NativeOutcome::Captured(image, tier) => {
                info!(tier = tier.as_str(), bytes = image.len(), "capture succeeded");
                CaptureReport::captured(image, tier, diagnostics)
            }
            NativeOutcome::TimedOut => CaptureReport::failed(diagnostics),
            NativeOutcome::NoItem | NativeOutcome::Failed(_) => self.legacy(legacy, diagnostics),
        }
    }

    /// Monitor-tier only: the named monitor first, then the monitor under
    /// the foreground window. Tier failures are logged and yield `None`.
    pub fn capture(
        &self,
        selector: &TargetSelector,
        timeout: Duration,
    ) -> CaptureResult<Option<EncodedImage>> {
        let resolver = MonitorResolver::new(self.backend);
        let device = self.devices.get_or_create(|| self.backend.create_device())?;

        if let Some(name) = selector.device_name() {
            match resolver.resolve_by_name(name) {
                Ok(resolved) if !resolved.handle.is_null() => {
                    if let Some(image) = self.monitor_only(resolved.handle, &device, timeout)? {
                        return Ok(Some(image));
                    }
                }
                Ok(_) => debug!(device_name = name, "named monitor not resolved"),
                Err(err) => warn!(error = %err, "monitor enumeration failed"),
            }
        }

        match resolver.resolve_for_active_window() {
            Ok(active) if !active.handle.is_null() => {
                self.monitor_only(active.handle, &device, timeout)
            }
            Ok(_) => Ok(None),
            Err(err) => {
                debug!(error = %err, "no active-window monitor to capture");
                Ok(None)
            }
        }
    }

    fn device(&self, diagnostics: &mut Diagnostics) -> CaptureResult<Arc<B::Device>> {
        match self.devices.get_or_create(|| self.backend.create_device()) {
            Ok(device) => {
                diagnostics.line("WinRTDevice: OK");
                Ok(device)
            }
            Err(err) => {
                diagnostics.line(format_args!("WinRTDevice: NULL ({err})"));
                Err(err)
            }
        }
    }

    fn native_tiers(
        &self,
        monitor: MonitorHandle,
        device: &Arc<B::Device>,
        timeout: Duration,
        diagnostics: &mut Diagnostics,
    ) -> NativeOutcome {
        let factory = CaptureItemFactory::new(self.backend);
        match factory.create_for_monitor(monitor, diagnostics) {
            Ok(Some(item)) => {
                return self.run_session(item, CaptureTier::Monitor, device, timeout, diagnostics);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(hmonitor = %monitor, error = %err, "monitor item creation failed");
                diagnostics.line(format_args!("Exception: {err}"));
                return NativeOutcome::Failed(err);
            }
        }

        let Some(window) = self
            .backend
            .foreground_window()
            .filter(|window| !window.is_null())
        else {
            diagnostics.line("GetForegroundWindow returned NULL");
            return NativeOutcome::NoItem;
        };
        match factory.create_for_window(window, diagnostics) {
            Ok(item) => self.run_session(item, CaptureTier::Window, device, timeout, diagnostics),
            Err(err) => {
                warn!(hwnd = %window, error = %err, "window item creation failed");
                diagnostics.line(format_args!("Exception: {err}"));
                NativeOutcome::Failed(err)
            }
        }
    }

    fn monitor_only(
        &self,
        monitor: MonitorHandle,
        device: &Arc<B::Device>,
        timeout: Duration,
    ) -> CaptureResult<Option<EncodedImage>> {
        let mut scratch = Diagnostics::new();
        let factory = CaptureItemFactory::new(self.backend);
        let outcome = match factory.create_for_monitor(monitor, &mut scratch) {
            Ok(Some(item)) => {
                self.run_session(item, CaptureTier::Monitor, device, timeout, &mut scratch)
            }
            Ok(None) => NativeOutcome::NoItem,
            Err(err) => NativeOutcome::Failed(err),
        };
        match outcome {
            NativeOutcome::Captured(image, _) => Ok(Some(image)),
            NativeOutcome::Failed(err) if err.is_fatal_for_engine() => Err(err),
            NativeOutcome::Failed(err) => {
                warn!(hmonitor = %monitor, error = %err, "monitor capture failed");
                Ok(None)
            }
            NativeOutcome::TimedOut | NativeOutcome::NoItem => Ok(None),
        }
    }

    fn run_session(
        &self,
        item: B::Item,
        tier: CaptureTier,
        device: &Arc<B::Device>,
        timeout: Duration,
        diagnostics: &mut Diagnostics,
    ) -> NativeOutcome {
        diagnostics.line("IsSupported: true");
        match item.size() {
            Ok((width, height)) => diagnostics.line(format_args!("Item.Size: {width}x{height}")),
            Err(err) => diagnostics.line(format_args!("Item.Size: unavailable ({err})")),
        }

        if self.config.request_access {
            match AccessGate::new(self.backend, self.capabilities).check() {
                Ok(decision) => diagnostics.line(format_args!("AccessStatus: {decision}")),
                Err(err) => {
                    diagnostics.line(format_args!("AccessStatus: {err}"));
                    return exception(err, diagnostics);
                }
            }
        } else {
            diagnostics.line("AccessStatus: not requested");
        }
        diagnostics.line(format_args!("TimeoutMs: {}", timeout.as_millis()));

        let mut session = match CaptureSession::bind(self.backend, device, &item, self.encoder) {
            Ok(session) => session,
            Err(err) => return exception(err, diagnostics),
        };
        let suppress_border = self.config.suppress_border && self.capabilities.border_property;
        let outcome = session
            .start(suppress_border)
            .and_then(|()| session.wait(timeout));
        let stats = session.stats();
        drop(session);
        drop(item);

        diagnostics.line(format_args!("FrameArrivedCount: {}", stats.arrivals));
        diagnostics.line(format_args!("GotFrame: {}", stats.got_frame));
        if let (Some(elapsed), Some((width, height))) = (stats.first_frame_after, stats.content_size)
        {
            diagnostics.line(format_args!(
                "FirstFrame at {}ms; ContentSize={width}x{height}",
                elapsed.as_millis()
            ));
        }

        match outcome {
            Ok(SessionOutcome::Completed(image)) => {
                diagnostics.line(format_args!("Result: OK (bytes={})", image.len()));
                NativeOutcome::Captured(image, tier)
            }
            Ok(SessionOutcome::TimedOut) => {
                diagnostics.line("Result: TIMEOUT (no completed frame)");
                NativeOutcome::TimedOut
            }
            Err(err) => exception(err, diagnostics),
        }
    }

    fn legacy(&self, target: LegacyTarget, mut diagnostics: Diagnostics) -> CaptureReport {
        let (tier, bounds, label) = match target {
            LegacyTarget::Monitor(bounds) => {
                (CaptureTier::LegacyMonitor, bounds, "selected monitor")
            }
            LegacyTarget::VirtualDesktop => (
                CaptureTier::LegacyDesktop,
                self.backend.virtual_desktop_bounds(),
                "virtual desktop",
            ),
        };
        debug!(tier = tier.as_str(), %bounds, "falling back to legacy screen copy");

        let copied = self
            .backend
            .copy_desktop(bounds)
            .and_then(|frame| self.encoder.encode(frame));
        match copied {
            Ok(image) => {
                diagnostics.line(format_args!("Fallback: legacy copy of {label}"));
                info!(tier = tier.as_str(), bytes = image.len(), "legacy capture succeeded");
                CaptureReport::captured(image, tier, diagnostics)
            }
            Err(err) => {
                warn!(error = %err, "legacy capture failed");
                diagnostics.line(format_args!("Legacy fallback failed: {err}"));
                CaptureReport::failed(diagnostics)
            }
        }
    }
}

fn exception(err: CaptureError, diagnostics: &mut Diagnostics) -> NativeOutcome {
    diagnostics.line("Result: EXCEPTION");
    diagnostics.line(format_args!("Exception: {err}"));
    NativeOutcome::Failed(err)
}
