use std::sync::Arc;

use anyhow::Context;
use tracing::debug;
use windows::Foundation::Metadata::ApiInformation;
use windows::Foundation::{EventRegistrationToken, TypedEventHandler};
use windows::Graphics::Capture::{
    Direct3D11CaptureFrame, Direct3D11CaptureFramePool, GraphicsCaptureAccess,
    GraphicsCaptureAccessKind, GraphicsCaptureSession,
};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Security::Authorization::AppCapabilityAccess::AppCapabilityAccessStatus;
use windows::core::{IInspectable, h};

use crate::access::{AccessStatus, PlatformCapabilities};
use crate::backend::{BoundSession, CapturedFrame, FrameHandler, FrameSource};
use crate::error::{CaptureError, CaptureResult};
use crate::frame::Frame;

use super::d3d11::GpuDevice;
use super::interop::WgcItem;
use super::surface;

/// One buffer is enough: only the first frame is ever consumed.
const FRAME_POOL_BUFFERS: i32 = 1;

pub(crate) fn is_supported() -> CaptureResult<bool> {
    GraphicsCaptureSession::IsSupported()
        .context("GraphicsCaptureSession::IsSupported failed")
        .map_err(CaptureError::Platform)
}

pub(crate) fn probe_capabilities() -> PlatformCapabilities {
    let access_api =
        ApiInformation::IsTypePresent(h!("Windows.Graphics.Capture.GraphicsCaptureAccess"))
            .unwrap_or(false);
    let border_property = ApiInformation::IsPropertyPresent(
        h!("Windows.Graphics.Capture.GraphicsCaptureSession"),
        h!("IsBorderRequired"),
    )
    .unwrap_or(false);
    debug!(access_api, border_property, "probed graphics capture capabilities");
    PlatformCapabilities {
        access_api,
        border_property,
    }
}

pub(crate) fn request_programmatic_access() -> CaptureResult<AccessStatus> {
    let status = GraphicsCaptureAccess::RequestAccessAsync(GraphicsCaptureAccessKind::Programmatic)
        .and_then(|operation| operation.get())
        .context("GraphicsCaptureAccess::RequestAccessAsync failed")
        .map_err(CaptureError::Platform)?;
    Ok(match status {
        AppCapabilityAccessStatus::Allowed => AccessStatus::Allowed,
        AppCapabilityAccessStatus::DeniedByUser => AccessStatus::DeniedByUser,
        AppCapabilityAccessStatus::DeniedBySystem => AccessStatus::DeniedBySystem,
        _ => AccessStatus::Unspecified,
    })
}

/// A free-threaded frame pool and its capture session. Torn down on drop.
pub struct WgcSession {
    gpu: Arc<GpuDevice>,
    frame_pool: Direct3D11CaptureFramePool,
    session: GraphicsCaptureSession,
    frame_arrived: Option<EventRegistrationToken>,
}

// SAFETY: the frame pool is free-threaded and the session is agile; every
// call on them goes through the owning lifetime's mutex or Drop.
unsafe impl Send for WgcSession {}

impl WgcSession {
    pub(crate) fn bind(gpu: &Arc<GpuDevice>, item: &WgcItem) -> CaptureResult<Self> {
        let size = item
            .as_inner()
            .Size()
            .context("GraphicsCaptureItem::Size failed")
            .map_err(CaptureError::Platform)?;
        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            gpu.winrt(),
            DirectXPixelFormat::B8G8R8A8UIntNormalized,
            FRAME_POOL_BUFFERS,
            size,
        )
        .context("Direct3D11CaptureFramePool::CreateFreeThreaded failed")
        .map_err(CaptureError::Platform)?;
        let session = match frame_pool.CreateCaptureSession(item.as_inner()) {
            Ok(session) => session,
            Err(err) => {
                let _ = frame_pool.Close();
                return Err(CaptureError::Platform(
                    anyhow::Error::from(err)
                        .context("Direct3D11CaptureFramePool::CreateCaptureSession failed"),
                ));
            }
        };
        Ok(Self {
            gpu: Arc::clone(gpu),
            frame_pool,
            session,
            frame_arrived: None,
        })
    }
}

impl BoundSession for WgcSession {
    fn set_frame_handler(&mut self, handler: FrameHandler) -> CaptureResult<()> {
        let gpu = Arc::clone(&self.gpu);
        let token = self
            .frame_pool
            .FrameArrived(
                &TypedEventHandler::<Direct3D11CaptureFramePool, IInspectable>::new(
                    move |sender, _| {
                        if let Some(pool) = sender {
                            let source = PoolSource { pool, gpu: &gpu };
                            (*handler)(&source);
                        }
                        Ok(())
                    },
                ),
            )
            .context("Direct3D11CaptureFramePool::FrameArrived registration failed")
            .map_err(CaptureError::Platform)?;
        if let Some(previous) = self.frame_arrived.replace(token) {
            let _ = self.frame_pool.RemoveFrameArrived(previous);
        }
        Ok(())
    }

    fn suppress_border(&self) -> CaptureResult<()> {
        self.session
            .SetIsBorderRequired(false)
            .context("GraphicsCaptureSession::SetIsBorderRequired failed")
            .map_err(CaptureError::Platform)
    }

    fn start(&self) -> CaptureResult<()> {
        self.session
            .StartCapture()
            .context("GraphicsCaptureSession::StartCapture failed")
            .map_err(CaptureError::Platform)
    }

    fn close(self) {
        drop(self);
    }
}

impl Drop for WgcSession {
    fn drop(&mut self) {
        if let Some(token) = self.frame_arrived.take() {
            let _ = self.frame_pool.RemoveFrameArrived(token);
        }
        let _ = self.session.Close();
        let _ = self.frame_pool.Close();
    }
}

struct PoolSource<'a> {
    pool: &'a Direct3D11CaptureFramePool,
    gpu: &'a GpuDevice,
}

impl FrameSource for PoolSource<'_> {
    fn try_next_frame(&self) -> Option<Box<dyn CapturedFrame + '_>> {
        let frame = self.pool.TryGetNextFrame().ok()?;
        Some(Box::new(WgcFrame {
            frame,
            gpu: self.gpu,
        }))
    }
}

struct WgcFrame<'a> {
    frame: Direct3D11CaptureFrame,
    gpu: &'a GpuDevice,
}

impl CapturedFrame for WgcFrame<'_> {
    fn content_size(&self) -> (u32, u32) {
        self.frame
            .ContentSize()
            .map(|size| (size.Width.max(0) as u32, size.Height.max(0) as u32))
            .unwrap_or_default()
    }

    fn read_pixels(&self) -> CaptureResult<Frame> {
        let surface = self
            .frame
            .Surface()
            .context("Direct3D11CaptureFrame::Surface failed")
            .map_err(CaptureError::Platform)?;
        surface::read_surface(self.gpu, &surface)
    }
}

impl Drop for WgcFrame<'_> {
    fn drop(&mut self) {
        let _ = self.frame.Close();
    }
}
