// Capture engine module: CaptureSession (§4.2), backing WGC plumbing.

pub mod session;

pub use session::{init_capture, CaptureCapabilities, CaptureSession};

use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};

/// Enable per-monitor DPI awareness so capture operates in physical pixels
/// rather than DPI-scaled logical pixels. Idempotent; repeat calls after the
/// first are silently ignored by the OS.
pub fn enable_dpi_awareness() {
    unsafe {
        let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
    }
}
