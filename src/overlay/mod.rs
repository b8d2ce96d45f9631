// OverlayView (§4.3): full-screen, click-through layered window that
// continuously composites the captured frame, with freeze/letterbox support
// for choreographing around target resizes.
//
// Grounded in the original's `overlay/overlay.cpp` start/stop/freeze
// lifecycle and `overlay/window.cpp` window creation.

mod geometry;
mod render;
mod window;

pub use geometry::{calculate_overlay_dimensions, should_use_overlay};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{bail, Context, Result};
use windows::Win32::Foundation::{HINSTANCE, HWND};
use windows::Win32::UI::WindowsAndMessaging::IsIconic;

use crate::capture::{init_capture, CaptureSession};
use crate::d3d11::{create_d3d11_device, D3D11Context};
use crate::error::CoreError;
use render::OverlayRenderer;

struct OverlayFlags {
    running: AtomicBool,
    freeze_rendering: AtomicBool,
    freeze_after_first_frame: AtomicBool,
    use_letterbox_mode: AtomicBool,
    shutdown: AtomicBool,
}

impl Default for OverlayFlags {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            freeze_rendering: AtomicBool::new(false),
            freeze_after_first_frame: AtomicBool::new(false),
            use_letterbox_mode: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Full-screen compositor overlay for a single target window.
pub struct OverlayView {
    overlay_hwnd: Option<HWND>,
    instance: HINSTANCE,
    flags: Arc<OverlayFlags>,
    render_thread: Option<JoinHandle<()>>,
    target_window: Option<HWND>,
}

impl OverlayView {
    pub fn new(instance: HINSTANCE) -> Self {
        Self {
            overlay_hwnd: None,
            instance,
            flags: Arc::new(OverlayFlags::default()),
            render_thread: None,
            target_window: None,
        }
    }

    /// Create the layered full-screen window and register its class
    /// (idempotent: no-ops if already initialized).
    pub fn initialize_window(&mut self) -> Result<()> {
        if self.overlay_hwnd.is_some() {
            return Ok(());
        }
        window::register_class(self.instance)?;
        let (screen_w, screen_h) = geometry::screen_dimensions();
        let hwnd = window::create_overlay_window(self.instance, screen_w, screen_h)?;
        self.overlay_hwnd = Some(hwnd);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::Relaxed)
    }

    /// Begin compositing the target onto the overlay (§4.3 `start`).
    pub fn start(&mut self, target: HWND, freeze_after_first_frame: bool) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        if unsafe { IsIconic(target).as_bool() } {
            bail!(CoreError::PreconditionUnmet("target window is minimized".into()));
        }

        self.initialize_window()?;
        let overlay_hwnd = self.overlay_hwnd.context("overlay window not initialized")?;

        self.flags.freeze_after_first_frame.store(freeze_after_first_frame, Ordering::Relaxed);
        self.flags.freeze_rendering.store(false, Ordering::Relaxed);
        self.flags.shutdown.store(false, Ordering::Relaxed);
        self.target_window = Some(target);

        let d3d_ctx = create_d3d11_device()?;
        d3d_ctx.enable_multithread_protection()?;

        let (screen_w, screen_h) = geometry::screen_dimensions();
        let mut renderer = OverlayRenderer::new(&d3d_ctx, overlay_hwnd, screen_w as u32, screen_h as u32)?;

        let capture = init_capture(&d3d_ctx, target, 2)?;
        capture.start()?;

        window::show(overlay_hwnd);

        let flags = Arc::clone(&self.flags);
        self.render_thread = Some(std::thread::spawn(move || {
            render_loop(d3d_ctx, capture, &mut renderer, flags);
        }));

        self.flags.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.flags.running.store(false, Ordering::Relaxed);
        self.flags.freeze_rendering.store(false, Ordering::Relaxed);
        self.flags.freeze_after_first_frame.store(false, Ordering::Relaxed);
        self.flags.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.render_thread.take() {
            let _ = handle.join();
        }

        if let Some(target) = self.target_window.take() {
            window::restore_target_window(target);
        }
        if let Some(hwnd) = self.overlay_hwnd {
            window::hide(hwnd);
        }
    }

    pub fn freeze(&self) {
        self.flags.freeze_rendering.store(true, Ordering::Relaxed);
    }

    pub fn unfreeze(&self) {
        self.flags.freeze_rendering.store(false, Ordering::Relaxed);
        self.flags.freeze_after_first_frame.store(false, Ordering::Relaxed);
    }

    pub fn set_letterbox_mode(&self, enabled: bool) {
        self.flags.use_letterbox_mode.store(enabled, Ordering::Relaxed);
    }

    /// Re-push the shell tray window to the bottom of the Z-order after a
    /// transform completes, avoiding the taskbar flicker the original
    /// guards against when the overlay resumes (SPEC_FULL §10).
    pub fn suppress_taskbar_redraw(&self) {
        crate::window::lower_taskbar_z_order();
    }
}

impl Drop for OverlayView {
    fn drop(&mut self) {
        self.stop();
        if let Some(hwnd) = self.overlay_hwnd.take() {
            window::destroy(hwnd);
        }
    }
}

fn render_loop(
    d3d_ctx: D3D11Context,
    capture: CaptureSession,
    renderer: &mut OverlayRenderer,
    flags: Arc<OverlayFlags>,
) {
    let mut first_frame_rendered = false;

    while !flags.shutdown.load(Ordering::Relaxed) {
        renderer.wait_for_frame_latency(1000);

        if capture.wait_for_frame(1000).is_err() {
            continue;
        }

        if flags.freeze_rendering.load(Ordering::Relaxed) {
            continue;
        }

        let Ok(frame) = capture.try_get_next_frame() else {
            continue;
        };

        let texture = match CaptureSession::frame_to_texture(&frame) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("overlay: frame_to_texture failed: {}", e);
                continue;
            }
        };

        if let Err(e) = renderer.ensure_srv(&d3d_ctx.device, &texture) {
            log::debug!("overlay: SRV creation failed: {}", e);
            continue;
        }

        if let Err(e) = renderer.render(&d3d_ctx.context) {
            log::debug!("overlay: render failed: {}", e);
        }

        if !first_frame_rendered {
            first_frame_rendered = true;
            if flags.freeze_after_first_frame.load(Ordering::Relaxed) {
                flags.freeze_rendering.store(true, Ordering::Relaxed);
            }
        }
    }
}
