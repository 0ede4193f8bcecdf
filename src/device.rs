use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::error::{CaptureError, CaptureResult};

enum DeviceSlot<D> {
    Empty,
    Ready(Arc<D>),
    /// Creation failed once; the failure is replayed to every later caller.
    Failed(CaptureError),
}

/// Lazily creates the GPU device once and hands out shared references for
/// the rest of the owner's lifetime.
///
/// There is no invalidation path: a created device is never recreated, and
/// a failed creation is never retried. The mutex serializes first-time
/// creation because platform device creation is not guaranteed re-entrant.
pub struct DeviceManager<D> {
    slot: Mutex<DeviceSlot<D>>,
}

impl<D> Default for DeviceManager<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> DeviceManager<D> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(DeviceSlot::Empty),
        }
    }

    pub fn get_or_create(
        &self,
        create: impl FnOnce() -> CaptureResult<D>,
    ) -> CaptureResult<Arc<D>> {
        let mut slot = self.slot.lock().map_err(|_| poisoned_lock_error())?;
        match &*slot {
            DeviceSlot::Ready(device) => return Ok(Arc::clone(device)),
            DeviceSlot::Failed(err) => return Err(err.to_sendable()),
            DeviceSlot::Empty => {}
        }

        match create() {
            Ok(device) => {
                let device = Arc::new(device);
                info!("GPU capture device created");
                *slot = DeviceSlot::Ready(Arc::clone(&device));
                Ok(device)
            }
            Err(err) => {
                let err = match err {
                    CaptureError::DeviceCreationFailed(_) => err,
                    other => CaptureError::DeviceCreationFailed(other.to_string()),
                };
                warn!(error = %err, "GPU device creation failed; GPU capture is disabled from now on");
                *slot = DeviceSlot::Failed(err.to_sendable());
                Err(err)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| !matches!(*slot, DeviceSlot::Empty))
            .unwrap_or(false)
    }
}

fn poisoned_lock_error() -> CaptureError {
    CaptureError::Platform(anyhow::anyhow!("GPU device mutex was poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn creates_once_and_reuses() {
        let manager = DeviceManager::new();
        let calls = AtomicUsize::new(0);
        let first = manager
            .get_or_create(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .unwrap();
        let second = manager
            .get_or_create(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(8u32)
            })
            .unwrap();
        assert_eq!(*first, 7);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_cached_and_never_retried() {
        let manager: DeviceManager<u32> = DeviceManager::new();
        let first = manager.get_or_create(|| {
            Err(CaptureError::Platform(anyhow::anyhow!("no hardware adapter")))
        });
        assert!(matches!(first, Err(CaptureError::DeviceCreationFailed(_))));

        let second = manager.get_or_create(|| Ok(1));
        match second {
            Err(CaptureError::DeviceCreationFailed(message)) => {
                assert!(message.contains("no hardware adapter"));
            }
            other => panic!("expected cached failure, got {other:?}"),
        }
        assert!(manager.is_initialized());
    }

    #[test]
    fn concurrent_first_use_creates_one_device() {
        let manager = Arc::new(DeviceManager::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    manager
                        .get_or_create(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(5));
                            Ok(())
                        })
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
