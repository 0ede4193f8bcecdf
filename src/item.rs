use tracing::{debug, warn};

use crate::CaptureTarget;
use crate::backend::CaptureBackend;
use crate::diagnostics::Diagnostics;
use crate::error::{CaptureError, CaptureResult};
use crate::monitor::MonitorHandle;
use crate::window::WindowHandle;

/// What the interop creation call handed back, before interpretation.
///
/// `pointer` is the raw item address as returned, kept only for
/// diagnostics; `item` owns the reference when the pointer was non-null.
pub struct RawItemResult<I> {
    pub status: i32,
    pub pointer: usize,
    pub item: Option<I>,
}

impl<I> RawItemResult<I> {
    pub fn failed(status: i32) -> Self {
        Self {
            status,
            pointer: 0,
            item: None,
        }
    }

    pub fn created(pointer: usize, item: I) -> Self {
        Self {
            status: 0,
            pointer,
            item: Some(item),
        }
    }

    fn write_diagnostics(&self, diagnostics: &mut Diagnostics) {
        diagnostics.line(format_args!("HRESULT: 0x{:08X}", self.status as u32));
        diagnostics.line(format_args!("ResultPtr: 0x{:X}", self.pointer));
    }
}

/// Produces capture items for monitors and windows through the platform's
/// interop factory, recording each call's raw outcome.
pub struct CaptureItemFactory<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: CaptureBackend + ?Sized> CaptureItemFactory<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// A successful call that returns a null item is `Ok(None)`: the caller
    /// moves on to the window tier instead of treating it as a failure.
    pub fn create_for_monitor(
        &self,
        monitor: MonitorHandle,
        diagnostics: &mut Diagnostics,
    ) -> CaptureResult<Option<B::Item>> {
        diagnostics.line("CreateItemForMonitor diagnostics:");
        diagnostics.line(format_args!("HMONITOR: {monitor}"));
        diagnostics.line(format_args!(
            "RequestedIID: {}",
            self.backend.item_interface_id()
        ));
        if monitor.is_null() {
            return Err(CaptureError::NullMonitorHandle);
        }

        let raw = self.backend.create_item(CaptureTarget::Monitor(monitor))?;
        raw.write_diagnostics(diagnostics);
        match interpret(raw, "CreateForMonitor")? {
            Some(item) => {
                debug!(hmonitor = %monitor, "created monitor capture item");
                Ok(Some(item))
            }
            None => {
                warn!(hmonitor = %monitor, "CreateForMonitor returned a null item");
                Ok(None)
            }
        }
    }

    /// Unlike the monitor path, a null item here is an error.
    pub fn create_for_window(
        &self,
        window: WindowHandle,
        diagnostics: &mut Diagnostics,
    ) -> CaptureResult<B::Item> {
        diagnostics.line("CreateItemForWindow diagnostics:");
        diagnostics.line(format_args!("HWND: {window}"));
        if window.is_null() {
            return Err(CaptureError::NoForegroundWindow);
        }

        let raw = self.backend.create_item(CaptureTarget::Window(window))?;
        raw.write_diagnostics(diagnostics);
        let item = interpret(raw, "CreateForWindow")?
            .ok_or_else(|| CaptureError::NullItem("CreateForWindow".into()))?;
        debug!(hwnd = %window, "created window capture item");
        Ok(item)
    }
}

fn interpret<I>(raw: RawItemResult<I>, context: &'static str) -> CaptureResult<Option<I>> {
    if raw.status != 0 {
        return Err(CaptureError::Interop {
            context,
            status: raw.status,
        });
    }
    Ok(raw.item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ItemScript, MockBackend};

    #[test]
    fn monitor_item_records_raw_outcome() {
        let backend = MockBackend::dual_monitor();
        let factory = CaptureItemFactory::new(&backend);
        let mut diagnostics = Diagnostics::new();

        let item = factory
            .create_for_monitor(MockBackend::PRIMARY, &mut diagnostics)
            .unwrap();
        assert!(item.is_some());
        assert!(diagnostics.contains("CreateItemForMonitor diagnostics:"));
        assert!(diagnostics.contains("HMONITOR: 0x10001"));
        assert!(diagnostics.contains("RequestedIID: {79c3f95b-31f7-4ec2-a464-632ef5d30760}"));
        assert!(diagnostics.contains("HRESULT: 0x00000000"));
    }

    #[test]
    fn failing_status_becomes_interop_error() {
        let backend = MockBackend::dual_monitor()
            .with_monitor_item(ItemScript::Status(0x8007_0057_u32 as i32));
        let factory = CaptureItemFactory::new(&backend);
        let mut diagnostics = Diagnostics::new();

        let err = factory
            .create_for_monitor(MockBackend::PRIMARY, &mut diagnostics)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            CaptureError::Interop {
                context: "CreateForMonitor",
                ..
            }
        ));
        assert!(diagnostics.contains("HRESULT: 0x80070057"));
        assert!(diagnostics.contains("ResultPtr: 0x0"));
    }

    #[test]
    fn null_monitor_item_is_not_an_error_but_null_window_item_is() {
        let backend = MockBackend::dual_monitor()
            .with_monitor_item(ItemScript::NullPointer)
            .with_window_item(ItemScript::NullPointer);
        let factory = CaptureItemFactory::new(&backend);
        let mut diagnostics = Diagnostics::new();

        let monitor_item = factory
            .create_for_monitor(MockBackend::PRIMARY, &mut diagnostics)
            .unwrap();
        assert!(monitor_item.is_none());

        let window_item = factory.create_for_window(MockBackend::FOREGROUND, &mut diagnostics);
        assert!(matches!(window_item, Err(CaptureError::NullItem(_))));
        assert!(diagnostics.contains("CreateItemForWindow diagnostics:"));
        assert!(diagnostics.contains("HWND: 0x3F0"));
    }

    #[test]
    fn null_monitor_handle_never_reaches_the_factory() {
        let backend = MockBackend::dual_monitor();
        let counters = backend.counters();
        let factory = CaptureItemFactory::new(&backend);
        let mut diagnostics = Diagnostics::new();

        let result = factory.create_for_monitor(MonitorHandle::NULL, &mut diagnostics);
        assert!(matches!(result, Err(CaptureError::NullMonitorHandle)));
        assert_eq!(counters.items_created(), 0);
    }

    #[test]
    fn dropped_items_release_their_reference() {
        let backend = MockBackend::dual_monitor();
        let counters = backend.counters();
        let factory = CaptureItemFactory::new(&backend);
        let mut diagnostics = Diagnostics::new();

        let item = factory
            .create_for_window(MockBackend::FOREGROUND, &mut diagnostics)
            .unwrap();
        assert_eq!(counters.items_released(), 0);
        drop(item);
        assert_eq!(counters.items_released(), 1);
    }
}
