// Windows Graphics Capture session for a single target window (§4.2
// CaptureSession). Captures BGRA8 only; frame delivery is driven by the
// FrameArrived event + a kernel event for zero-CPU blocking waits.
//
// Adapted from a monitor-or-window WGC wrapper: monitor capture is dropped
// (window capture only), the HDR/SDR pixel-format branch is dropped (always
// BGRA8), and three capability-discovery flags are added to surface what
// this session can and can't control rather than silently no-oping
// unsupported calls.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use windows::core::Interface;
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{
    Direct3D11CaptureFrame, Direct3D11CaptureFramePool, GraphicsCaptureItem, GraphicsCaptureSession,
};
use windows::Graphics::DirectX::Direct3D11::{IDirect3DDevice, IDirect3DSurface};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, POINT, RECT};
use windows::Win32::Graphics::Direct3D11::{ID3D11Texture2D, D3D11_BOX};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_EXTENDED_FRAME_BOUNDS};
use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForSingleObject};
use windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::Win32::UI::WindowsAndMessaging::{GetClientRect, IsIconic};

use crate::d3d11::D3D11Context;
use crate::error::CoreError;

/// What this session discovered it can do on this machine (§4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureCapabilities {
    pub capture_supported: bool,
    pub cursor_capture_controllable: bool,
    pub border_controllable: bool,
}

/// A live capture of one target window.
pub struct CaptureSession {
    _item: GraphicsCaptureItem,
    frame_pool: Direct3D11CaptureFramePool,
    session: GraphicsCaptureSession,
    frame_arrived_token: i64,
    frame_event: HANDLE,
    shutting_down: Arc<AtomicBool>,
    pool_width: u32,
    capacity: i32,
    pool_height: u32,
    window_handle: HWND,
    direct3d_device: IDirect3DDevice,
    pixel_format: DirectXPixelFormat,
    capabilities: CaptureCapabilities,
}

impl CaptureSession {
    pub fn start(&self) -> Result<()> {
        self.session.StartCapture()?;
        Ok(())
    }

    pub fn capabilities(&self) -> CaptureCapabilities {
        self.capabilities
    }

    pub fn pool_size(&self) -> (u32, u32) {
        (self.pool_width, self.pool_height)
    }

    /// Recreate the frame pool when the target's content size changes.
    pub fn check_resize(&mut self, frame: &Direct3D11CaptureFrame) -> Result<()> {
        let content_size = frame.ContentSize()?;
        let new_w = content_size.Width as u32;
        let new_h = content_size.Height as u32;

        if new_w != self.pool_width || new_h != self.pool_height {
            self.frame_pool
                .Recreate(&self.direct3d_device, self.pixel_format, self.capacity, content_size)?;
            self.pool_width = new_w;
            self.pool_height = new_h;
        }
        Ok(())
    }

    pub fn try_get_next_frame(&self) -> Result<Direct3D11CaptureFrame> {
        Ok(self.frame_pool.TryGetNextFrame()?)
    }

    /// Block until the next frame arrives or `timeout_ms` elapses, with zero
    /// CPU spin (kernel-event wait).
    pub fn wait_for_frame(&self, timeout_ms: u32) -> Result<()> {
        let result = unsafe { WaitForSingleObject(self.frame_event, timeout_ms) };
        if result.0 != 0 {
            bail!(CoreError::TransientIoFailure(format!(
                "no frame within {}ms (WaitForSingleObject 0x{:X})",
                timeout_ms, result.0
            )));
        }
        Ok(())
    }

    /// Toggle cursor capture if this session discovered it's controllable.
    pub fn set_cursor_capture_enabled(&self, enabled: bool) -> Result<()> {
        if !self.capabilities.cursor_capture_controllable {
            bail!(CoreError::FeatureConflict(
                "cursor capture is not controllable on this session".into()
            ));
        }
        self.session.SetIsCursorCaptureEnabled(enabled)?;
        Ok(())
    }

    /// Client-area crop box within the captured texture (§4.2 crop algorithm).
    ///
    /// Uses `DwmGetWindowAttribute(DWMWA_EXTENDED_FRAME_BOUNDS)` for the
    /// window's true on-screen rect (excluding invisible shadow padding),
    /// then `ClientToScreen` to locate the client area offset within it.
    pub fn get_client_box(&self, texture_width: u32, texture_height: u32) -> Option<D3D11_BOX> {
        let hwnd = self.window_handle;

        unsafe {
            if IsIconic(hwnd).as_bool() {
                return None;
            }

            let mut client_rect = RECT::default();
            if GetClientRect(hwnd, &mut client_rect).is_err() {
                return None;
            }
            if client_rect.right <= 0 || client_rect.bottom <= 0 {
                return None;
            }

            let mut window_rect = RECT::default();
            if DwmGetWindowAttribute(
                hwnd,
                DWMWA_EXTENDED_FRAME_BOUNDS,
                &mut window_rect as *mut _ as *mut _,
                std::mem::size_of::<RECT>() as u32,
            )
            .is_err()
            {
                return None;
            }

            let mut upper_left = POINT { x: 0, y: 0 };
            if !windows::Win32::Graphics::Gdi::ClientToScreen(hwnd, &mut upper_left).as_bool() {
                return None;
            }

            let left = if upper_left.x > window_rect.left {
                (upper_left.x - window_rect.left) as u32
            } else {
                0
            };
            let top = if upper_left.y > window_rect.top {
                (upper_left.y - window_rect.top) as u32
            } else {
                0
            };

            let texture_w = if texture_width > left {
                (texture_width - left).min(client_rect.right as u32)
            } else {
                1
            };
            let texture_h = if texture_height > top {
                (texture_height - top).min(client_rect.bottom as u32)
            } else {
                1
            };

            let right = left + texture_w;
            let bottom = top + texture_h;
            if right > texture_width || bottom > texture_height {
                return None;
            }

            Some(D3D11_BOX {
                left,
                top,
                front: 0,
                right,
                bottom,
                back: 1,
            })
        }
    }

    pub fn frame_to_texture(frame: &Direct3D11CaptureFrame) -> Result<ID3D11Texture2D> {
        let surface: IDirect3DSurface = frame.Surface()?;
        let access: IDirect3DDxgiInterfaceAccess = surface.cast()?;
        let texture: ID3D11Texture2D =
            unsafe { access.GetInterface().context("no ID3D11Texture2D interface")? };
        Ok(texture)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        let _ = self.frame_pool.RemoveFrameArrived(self.frame_arrived_token);
        if !self.frame_event.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.frame_event);
            }
        }
    }
}

fn create_capture_item_for_window(hwnd: HWND) -> Result<GraphicsCaptureItem> {
    unsafe {
        let interop: IGraphicsCaptureItemInterop =
            windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()
                .context("no IGraphicsCaptureItemInterop factory")?;
        interop
            .CreateForWindow(hwnd)
            .context("CreateForWindow failed")
    }
}

/// Start a window capture session with the given frame-pool capacity
/// (§3 CaptureConfig invariant: `capacity ∈ [1,3]`). Fails with
/// `PreconditionUnmet` if WGC reports no support (`capture_supported`
/// discovered false is surfaced via the capabilities struct for everything
/// except this outright failure).
pub fn init_capture(d3d_ctx: &D3D11Context, hwnd: HWND, capacity: u32) -> Result<CaptureSession> {
    if !(1..=3).contains(&capacity) {
        bail!(CoreError::InvalidArgument(format!(
            "frame-pool capacity must be in [1,3], got {}",
            capacity
        )));
    }
    if !GraphicsCaptureSession::IsSupported().unwrap_or(false) {
        bail!(CoreError::PreconditionUnmet(
            "Windows Graphics Capture is not supported on this system".into()
        ));
    }

    let item = create_capture_item_for_window(hwnd)?;
    let size = item.Size()?;
    let pixel_format = DirectXPixelFormat::B8G8R8A8UIntNormalized;

    let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
        &d3d_ctx.direct3d_device,
        pixel_format,
        capacity as i32,
        size,
    )?;

    let frame_event =
        unsafe { CreateEventW(None, false, false, None).context("CreateEventW failed")? };

    let shutting_down = Arc::new(AtomicBool::new(false));
    let shutting_down_cb = Arc::clone(&shutting_down);
    let event_ptr = frame_event.0 as usize;
    let frame_arrived_token = frame_pool.FrameArrived(&TypedEventHandler::<
        Direct3D11CaptureFramePool,
        windows::core::IInspectable,
    >::new(move |_, _| {
        if !shutting_down_cb.load(Ordering::Relaxed) {
            unsafe {
                if SetEvent(HANDLE(event_ptr as *mut _)).is_err() {
                    log::warn!("SetEvent failed in FrameArrived callback");
                }
            }
        }
        Ok(())
    }))?;

    let session = frame_pool.CreateCaptureSession(&item)?;

    let border_controllable = session.SetIsBorderRequired(false).is_ok();
    let cursor_capture_controllable = session.SetIsCursorCaptureEnabled(true).is_ok();

    let capabilities = CaptureCapabilities {
        capture_supported: true,
        cursor_capture_controllable,
        border_controllable,
    };

    Ok(CaptureSession {
        _item: item,
        frame_pool,
        session,
        frame_arrived_token,
        frame_event,
        shutting_down,
        pool_width: size.Width as u32,
        capacity: capacity as i32,
        pool_height: size.Height as u32,
        window_handle: hwnd,
        direct3d_device: d3d_ctx.direct3d_device.clone(),
        pixel_format,
        capabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // requires a live desktop session
    fn starting_capture_on_invalid_window_fails() {
        let ctx = crate::d3d11::create_d3d11_device().unwrap();
        let result = init_capture(&ctx, HWND(std::ptr::null_mut()), 2);
        assert!(result.is_err());
    }
}
