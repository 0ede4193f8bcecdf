use anyhow::Context;
use tracing::debug;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize};

use crate::error::{CaptureError, CaptureResult};

/// Joins the calling thread to the multithreaded apartment for the length
/// of one capture attempt.
pub struct ApartmentGuard {
    should_uninit: bool,
}

impl ApartmentGuard {
    pub(crate) fn enter_multithreaded() -> CaptureResult<Self> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            // The host already owns this thread's apartment; WinRT calls
            // still work from an STA.
            debug!("thread already initialized in another apartment");
            return Ok(Self {
                should_uninit: false,
            });
        }

        hr.ok()
            .context("CoInitializeEx(COINIT_MULTITHREADED) failed")
            .map_err(CaptureError::Platform)?;
        Ok(Self {
            should_uninit: true,
        })
    }
}

impl Drop for ApartmentGuard {
    fn drop(&mut self) {
        if self.should_uninit {
            unsafe {
                CoUninitialize();
            }
        }
    }
}
