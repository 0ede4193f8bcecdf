use anyhow::Context;
use windows::Graphics::DirectX::Direct3D11::IDirect3DSurface;
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_STAGING, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_B8G8R8A8_UNORM_SRGB, DXGI_SAMPLE_DESC,
};
use windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess;
use windows::core::Interface;

use crate::error::{CaptureError, CaptureResult};
use crate::frame::Frame;

use super::d3d11::GpuDevice;

/// Copy a captured GPU surface into CPU memory through a staging texture.
pub(crate) fn read_surface(gpu: &GpuDevice, surface: &IDirect3DSurface) -> CaptureResult<Frame> {
    let access: IDirect3DDxgiInterfaceAccess = surface
        .cast()
        .context("failed to cast frame surface to IDirect3DDxgiInterfaceAccess")
        .map_err(CaptureError::Platform)?;
    let texture: ID3D11Texture2D = unsafe { access.GetInterface() }
        .context("IDirect3DDxgiInterfaceAccess::GetInterface failed")
        .map_err(CaptureError::Platform)?;

    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut desc) };
    if desc.Format != DXGI_FORMAT_B8G8R8A8_UNORM && desc.Format != DXGI_FORMAT_B8G8R8A8_UNORM_SRGB
    {
        return Err(CaptureError::Platform(anyhow::anyhow!(
            "unexpected capture surface format {:?}",
            desc.Format
        )));
    }

    let staging = create_staging_texture(gpu.device(), &desc)?;
    let context = gpu.immediate_context();
    unsafe { context.CopyResource(&staging, &texture) };
    map_staging_to_frame(&context, &staging, &desc)
}

fn create_staging_texture(
    device: &ID3D11Device,
    src: &D3D11_TEXTURE2D_DESC,
) -> CaptureResult<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: src.Width,
        Height: src.Height,
        MipLevels: 1,
        ArraySize: 1,
        Format: src.Format,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_STAGING,
        BindFlags: Default::default(),
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: Default::default(),
    };

    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
        .context("failed to create staging texture")
        .map_err(CaptureError::Platform)?;
    texture.ok_or_else(|| {
        CaptureError::Platform(anyhow::anyhow!("CreateTexture2D returned no texture"))
    })
}

fn map_staging_to_frame(
    context: &ID3D11DeviceContext,
    staging: &ID3D11Texture2D,
    desc: &D3D11_TEXTURE2D_DESC,
) -> CaptureResult<Frame> {
    let resource: ID3D11Resource = staging
        .cast()
        .context("failed to cast staging texture to ID3D11Resource")
        .map_err(CaptureError::Platform)?;

    let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
    unsafe { context.Map(&resource, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
        .context("failed to map staging texture")
        .map_err(CaptureError::Platform)?;

    let result = copy_mapped(desc, &mapped);
    unsafe {
        context.Unmap(&resource, 0);
    }
    result
}

fn copy_mapped(
    desc: &D3D11_TEXTURE2D_DESC,
    mapped: &D3D11_MAPPED_SUBRESOURCE,
) -> CaptureResult<Frame> {
    if mapped.pData.is_null() {
        return Err(CaptureError::Platform(anyhow::anyhow!(
            "mapped staging texture has no data pointer"
        )));
    }
    let width = usize::try_from(desc.Width).map_err(|_| CaptureError::BufferOverflow)?;
    let height = usize::try_from(desc.Height).map_err(|_| CaptureError::BufferOverflow)?;
    let pitch = mapped.RowPitch as usize;
    let len = pitch
        .checked_mul(height.saturating_sub(1))
        .and_then(|base| base.checked_add(width.checked_mul(4)?))
        .ok_or(CaptureError::BufferOverflow)?;

    // SAFETY: the mapping covers `RowPitch` bytes for each of the texture's
    // rows, and stays valid until Unmap.
    let src = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };
    Frame::from_bgra_surface(desc.Width, desc.Height, pitch, src)
}
