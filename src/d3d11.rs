// D3D11 device creation and management, shared by CaptureSession, OverlayView,
// PreviewView, and EncoderFanout (§3 "Ownership summary").

pub mod texture;

use anyhow::Context;
use log::debug;
use windows::core::Interface;
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice;

/// D3D11 device + context, plus the WinRT interop handle the compositor needs.
#[derive(Clone)]
pub struct D3D11Context {
    pub device: ID3D11Device,
    pub context: ID3D11DeviceContext,
    pub dxgi_device: IDXGIDevice,
    pub direct3d_device: IDirect3DDevice,
}

impl D3D11Context {
    /// Enable D3D11 multithread protection on the shared device.
    ///
    /// Required before EncoderFanout's worker and the capture callback thread
    /// issue commands on the same device concurrently (§4.5, §5).
    pub fn enable_multithread_protection(&self) -> anyhow::Result<()> {
        let multithread: ID3D11Multithread = self
            .device
            .cast()
            .context("device does not expose ID3D11Multithread")?;
        unsafe {
            multithread.SetMultithreadProtected(true);
        }
        Ok(())
    }
}

/// Create a D3D11 device bound to the primary hardware adapter.
///
/// Used for the overlay/preview render device as well as any consumer that
/// needs a device backing a visible swap chain.
pub fn create_d3d11_device() -> anyhow::Result<D3D11Context> {
    create_device(D3D11_CREATE_DEVICE_BGRA_SUPPORT)
}

/// Create a headless D3D11 device (no swap-chain-capable flag needed) for use
/// by a background consumer such as VideoRecorder or ReplayBuffer that never
/// presents to the screen (§4.7 "Create a headless D3D device").
pub fn create_headless_d3d11_device() -> anyhow::Result<D3D11Context> {
    create_device(D3D11_CREATE_DEVICE_BGRA_SUPPORT | D3D11_CREATE_DEVICE_VIDEO_SUPPORT)
}

fn create_device(flags: D3D11_CREATE_DEVICE_FLAG) -> anyhow::Result<D3D11Context> {
    let (device, context) = unsafe {
        let mut device = None;
        let mut context = None;

        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            flags,
            Some(&[D3D_FEATURE_LEVEL_11_0]),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
        .context("D3D11CreateDevice failed")?;

        (device.unwrap(), context.unwrap())
    };

    let dxgi_device: IDXGIDevice = device.cast().context("device does not expose IDXGIDevice")?;

    let direct3d_device: IDirect3DDevice = unsafe {
        CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device)
            .context("CreateDirect3D11DeviceFromDXGIDevice failed")?
            .cast()
            .context("WinRT device does not expose IDirect3DDevice")?
    };

    log_device_info(&dxgi_device);

    Ok(D3D11Context {
        device,
        context,
        dxgi_device,
        direct3d_device,
    })
}

fn log_device_info(dxgi_device: &IDXGIDevice) {
    let info = (|| -> anyhow::Result<(String, u64)> {
        unsafe {
            let adapter = dxgi_device.GetAdapter()?;
            let desc = adapter.GetDesc()?;
            let name = String::from_utf16_lossy(&desc.Description)
                .trim_end_matches('\0')
                .to_string();
            Ok((name, desc.DedicatedVideoMemory as u64))
        }
    })();

    match info {
        Ok((name, vram)) => debug!("D3D11 device created on {} ({} MB VRAM)", name, vram / 1024 / 1024),
        Err(e) => debug!("D3D11 device created (adapter info unavailable: {})", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // requires a live GPU/Windows session
    fn test_device_creation() {
        let _ctx = create_d3d11_device().expect("device creation failed");
    }

    #[test]
    #[ignore]
    fn test_headless_device_creation() {
        let _ctx = create_headless_d3d11_device().expect("headless device creation failed");
    }

    #[test]
    #[ignore]
    fn test_dxgi_adapter() {
        let ctx = create_d3d11_device().unwrap();
        unsafe {
            let adapter = ctx.dxgi_device.GetAdapter();
            assert!(adapter.is_ok());
            assert!(adapter.unwrap().GetDesc().is_ok());
        }
    }
}
