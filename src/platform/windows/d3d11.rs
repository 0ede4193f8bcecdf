use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_10_1,
    D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_11_1,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_SDK_VERSION, D3D11CreateDevice, ID3D11Device,
    ID3D11DeviceContext,
};
use windows::Win32::Graphics::Dxgi::IDXGIDevice;
use windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice;
use windows::core::Interface;

use crate::error::{CaptureError, CaptureResult};

/// Hardware D3D11 device plus its WinRT projection, shared by every
/// capture session of an engine.
pub struct GpuDevice {
    device: ID3D11Device,
    context: Mutex<ID3D11DeviceContext>,
    winrt: IDirect3DDevice,
}

// SAFETY: the device is created without D3D11_CREATE_DEVICE_SINGLETHREADED,
// so ID3D11Device and its WinRT wrapper are free-threaded. The immediate
// context is not, and is only reachable through the mutex.
unsafe impl Send for GpuDevice {}
unsafe impl Sync for GpuDevice {}

impl GpuDevice {
    pub(crate) fn create() -> CaptureResult<Self> {
        let (device, context) = create_hardware_device()
            .map_err(|err| CaptureError::DeviceCreationFailed(format!("{err:#}")))?;
        let winrt = create_winrt_device(&device)
            .map_err(|err| CaptureError::DeviceCreationFailed(format!("{err:#}")))?;
        Ok(Self {
            device,
            context: Mutex::new(context),
            winrt,
        })
    }

    pub(crate) fn device(&self) -> &ID3D11Device {
        &self.device
    }

    pub(crate) fn winrt(&self) -> &IDirect3DDevice {
        &self.winrt
    }

    pub(crate) fn immediate_context(&self) -> MutexGuard<'_, ID3D11DeviceContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// BGRA support is required for the capture frame pool's surface format.
fn create_hardware_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let feature_levels = [
        D3D_FEATURE_LEVEL_11_1,
        D3D_FEATURE_LEVEL_11_0,
        D3D_FEATURE_LEVEL_10_1,
        D3D_FEATURE_LEVEL_10_0,
    ];

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
    }
    .context("D3D11CreateDevice failed")?;

    let device = device.context("D3D11CreateDevice did not return a device")?;
    let context = context.context("D3D11CreateDevice did not return a device context")?;
    Ok((device, context))
}

fn create_winrt_device(device: &ID3D11Device) -> Result<IDirect3DDevice> {
    let dxgi_device: IDXGIDevice = device
        .cast()
        .context("failed to cast ID3D11Device to IDXGIDevice")?;
    let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device) }
        .context("CreateDirect3D11DeviceFromDXGIDevice failed")?;
    inspectable
        .cast()
        .context("failed to cast IInspectable to IDirect3DDevice")
}
