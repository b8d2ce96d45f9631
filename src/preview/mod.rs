// PreviewView (§4.4): a small, DPI-aware window showing a live thumbnail of
// the captured frame plus a viewport indicator when the target exceeds
// screen bounds.
//
// Grounded in the original's `preview/preview.cpp` start/stop/cleanup
// lifecycle (including the ~3s deferred cleanup timer) and
// `preview/rendering.cpp`'s two-pass render.

mod geometry;
mod render;
mod window;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use windows::Win32::Foundation::{HINSTANCE, HWND, RECT};
use windows::Win32::UI::WindowsAndMessaging::{GetClientRect, IsIconic, IsWindow};

use crate::capture::{init_capture, CaptureSession};
use crate::d3d11::{create_d3d11_device, D3D11Context};
use crate::error::CoreError;
use geometry::{create_viewport_vertices, game_window_fully_visible};
use render::PreviewRenderer;

const MIN_PREVIEW_WIDTH: i32 = 240;
const MAX_PREVIEW_WIDTH: i32 = 640;
const CLEANUP_DELAY: Duration = Duration::from_millis(3000);

struct PreviewFlags {
    running: AtomicBool,
    shutdown: AtomicBool,
}

impl Default for PreviewFlags {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Small window compositing a live thumbnail plus viewport indicator for a
/// single target window.
pub struct PreviewView {
    hwnd: Option<HWND>,
    instance: HINSTANCE,
    flags: Arc<PreviewFlags>,
    render_thread: Option<JoinHandle<()>>,
    target_window: Option<HWND>,
    cleanup_at: Option<std::time::Instant>,
}

impl PreviewView {
    pub fn new(instance: HINSTANCE) -> Self {
        Self {
            hwnd: None,
            instance,
            flags: Arc::new(PreviewFlags::default()),
            render_thread: None,
            target_window: None,
            cleanup_at: None,
        }
    }

    /// Create the preview window and register its message handler
    /// (idempotent: no-ops if already initialized).
    pub fn initialize(&mut self) -> Result<()> {
        if self.hwnd.is_some() {
            return Ok(());
        }
        window::register_class(self.instance)?;
        let hwnd = window::create_preview_window(self.instance, MIN_PREVIEW_WIDTH, MIN_PREVIEW_WIDTH)?;
        self.hwnd = Some(hwnd);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::Relaxed)
    }

    /// Probe the target's client size, size the preview window to match its
    /// aspect ratio within configured bounds, and start compositing.
    pub fn start(&mut self, target: HWND) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        if unsafe { !IsWindow(Some(target)).as_bool() } {
            bail!(CoreError::PreconditionUnmet("target window is invalid".into()));
        }
        if unsafe { IsIconic(target).as_bool() } {
            bail!(CoreError::PreconditionUnmet("target window is minimized".into()));
        }

        self.initialize()?;
        let hwnd = self.hwnd.context("preview window not initialized")?;

        let mut client_rect = RECT::default();
        unsafe { GetClientRect(target, &mut client_rect)? };
        let target_width = client_rect.right - client_rect.left;
        let target_height = client_rect.bottom - client_rect.top;
        if target_width <= 0 || target_height <= 0 {
            bail!(CoreError::PreconditionUnmet("target client area is empty".into()));
        }

        let title_height = window::title_height(hwnd);
        let (window_width, window_height) =
            preview_window_size(target_width, target_height, title_height);

        unsafe {
            windows::Win32::UI::WindowsAndMessaging::SetWindowPos(
                hwnd,
                None,
                0,
                0,
                window_width,
                window_height,
                windows::Win32::UI::WindowsAndMessaging::SWP_NOMOVE
                    | windows::Win32::UI::WindowsAndMessaging::SWP_NOZORDER
                    | windows::Win32::UI::WindowsAndMessaging::SWP_NOACTIVATE,
            )?;
        }

        self.flags.shutdown.store(false, Ordering::Relaxed);
        self.target_window = Some(target);
        self.cleanup_at = None;

        let d3d_ctx = create_d3d11_device()?;
        d3d_ctx.enable_multithread_protection()?;

        let renderer =
            PreviewRenderer::new(&d3d_ctx, hwnd, window_width as u32, (window_height - title_height) as u32)?;

        let capture = init_capture(&d3d_ctx, target, 2)?;
        capture.start()?;

        window::show(hwnd);

        let flags = Arc::clone(&self.flags);
        self.render_thread = Some(std::thread::spawn(move || {
            render_loop(d3d_ctx, capture, renderer, target, flags);
        }));

        self.flags.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Pause capture, hide the window, and arm a cheap-reopen cleanup timer.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.flags.running.store(false, Ordering::Relaxed);
        self.flags.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.render_thread.take() {
            let _ = handle.join();
        }
        if let Some(hwnd) = self.hwnd {
            window::hide(hwnd);
        }
        self.target_window = None;
        self.cleanup_at = Some(std::time::Instant::now() + CLEANUP_DELAY);
    }

    /// Destroy the window if a prior `stop()`'s cleanup timer has elapsed;
    /// callers poll this from their own timer/event loop since this crate
    /// has no owned message pump.
    pub fn run_deferred_cleanup(&mut self) {
        let Some(at) = self.cleanup_at else { return };
        if std::time::Instant::now() < at {
            return;
        }
        self.cleanup_at = None;
        if let Some(hwnd) = self.hwnd.take() {
            window::destroy(hwnd);
        }
    }

    /// Rescale title bar and preview metrics after a DPI change,
    /// repositioning to preserve the window's current top-left anchor.
    ///
    /// Takes no DPI value: by the time a host forwards `WM_DPICHANGED` here,
    /// Windows has already re-associated the window with its new monitor, so
    /// `GetDpiForWindow` (via `window::title_height`) already reports the
    /// new value. Re-querying rather than trusting a caller-supplied DPI
    /// keeps this in sync even if the caller is late to forward the message.
    pub fn update_dpi(&mut self) -> Result<()> {
        let Some(hwnd) = self.hwnd else { return Ok(()) };
        let Some(target) = self.target_window else { return Ok(()) };

        let mut client_rect = RECT::default();
        unsafe { GetClientRect(target, &mut client_rect)? };
        let target_width = client_rect.right - client_rect.left;
        let target_height = client_rect.bottom - client_rect.top;
        if target_width <= 0 || target_height <= 0 {
            return Ok(());
        }

        let title_height = window::title_height(hwnd);
        let (window_width, window_height) =
            preview_window_size(target_width, target_height, title_height);

        unsafe {
            windows::Win32::UI::WindowsAndMessaging::SetWindowPos(
                hwnd,
                None,
                0,
                0,
                window_width,
                window_height,
                windows::Win32::UI::WindowsAndMessaging::SWP_NOMOVE
                    | windows::Win32::UI::WindowsAndMessaging::SWP_NOZORDER
                    | windows::Win32::UI::WindowsAndMessaging::SWP_NOACTIVATE,
            )?;
        }
        Ok(())
    }
}

impl Drop for PreviewView {
    fn drop(&mut self) {
        self.stop();
        if let Some(hwnd) = self.hwnd.take() {
            window::destroy(hwnd);
        }
    }
}

/// Preview window size preserving the target's aspect ratio, clamped to
/// `[MIN_PREVIEW_WIDTH, MAX_PREVIEW_WIDTH]`, with the title bar added back
/// on top of the render surface height.
fn preview_window_size(target_width: i32, target_height: i32, title_height: i32) -> (i32, i32) {
    let ratio = target_height as f64 / target_width as f64;
    let width = target_width.clamp(MIN_PREVIEW_WIDTH, MAX_PREVIEW_WIDTH);
    let height = (width as f64 * ratio).round() as i32;
    (width, height + title_height)
}

fn render_loop(
    d3d_ctx: D3D11Context,
    capture: CaptureSession,
    mut renderer: PreviewRenderer,
    target: HWND,
    flags: Arc<PreviewFlags>,
) {
    while !flags.shutdown.load(Ordering::Relaxed) {
        if capture.wait_for_frame(1000).is_err() {
            continue;
        }

        let Ok(frame) = capture.try_get_next_frame() else {
            continue;
        };

        let texture = match CaptureSession::frame_to_texture(&frame) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("preview: frame_to_texture failed: {}", e);
                continue;
            }
        };

        if let Err(e) = renderer.ensure_srv(&d3d_ctx.device, &texture) {
            log::debug!("preview: SRV creation failed: {}", e);
            continue;
        }

        let mut game_rect = RECT::default();
        let vertices = if unsafe { GetClientRect(target, &mut game_rect) }.is_ok()
            && !game_window_fully_visible(game_rect)
        {
            create_viewport_vertices(game_rect)
        } else {
            Vec::new()
        };

        if let Err(e) = renderer.render(&d3d_ctx.context, &vertices) {
            log::debug!("preview: render failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_size_preserves_aspect_and_clamps_width() {
        let (w, h) = preview_window_size(3840, 2160, 32);
        assert_eq!(w, MAX_PREVIEW_WIDTH);
        assert_eq!(h, (MAX_PREVIEW_WIDTH as f64 * 2160.0 / 3840.0).round() as i32 + 32);
    }

    #[test]
    fn preview_size_respects_minimum() {
        let (w, _h) = preview_window_size(100, 100, 0);
        assert_eq!(w, MIN_PREVIEW_WIDTH);
    }
}
