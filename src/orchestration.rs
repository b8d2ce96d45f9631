// Transform orchestration (§9 "freeze during transform" coupling): a small
// explicit state machine at the boundary between WindowController and
// OverlayView, choreographing a user-initiated ratio/resolution change so
// the overlay hides the target's visual glitches while it resizes.
//
// Grounded in spec.md §9's own strategy for this exact problem ("expose a
// small explicit state machine... states {Idle, PreparingTransform,
// Transforming, PostTransform}") and in the original's
// `window_control.cpp`/`overlay.cpp` freeze/unfreeze pairing around
// `resize_and_center_window`. Per-component state stays independent of this
// machine — it only issues commands to `WindowController` and `OverlayView`.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use crate::config::{Ratio, ResolutionOption, WindowSettings};
use crate::overlay::OverlayView;
use crate::window;

/// Matches spec.md §8 scenario 5's observed wait: after `SetWindowPos`
/// returns, the target's new client rectangle isn't necessarily settled
/// (DWM/compositor catch-up) until this elapses.
const POST_TRANSFORM_SETTLE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPhase {
    Idle,
    PreparingTransform,
    Transforming,
    PostTransform,
}

fn screen_extent() -> (i32, i32) {
    unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
}

/// Drives a target window's geometry transforms and the overlay's
/// freeze/unfreeze/stop choreography around them. Does not own the target,
/// the overlay, or the window settings — those are handed in by the caller
/// on each call, matching spec.md §9's "components only receive commands".
pub struct TransformOrchestrator {
    phase: TransformPhase,
}

impl TransformOrchestrator {
    pub fn new() -> Self {
        Self { phase: TransformPhase::Idle }
    }

    pub fn phase(&self) -> TransformPhase {
        self.phase
    }

    /// Resize `target` to `width`×`height`, freezing `overlay` (if running)
    /// for the duration and deciding afterward whether it's still needed
    /// (§8 scenario 5, §9 freeze-during-transform).
    pub fn apply_transform(&mut self, target: HWND, width: i32, height: i32, overlay: &mut OverlayView, settings: &WindowSettings) -> Result<()> {
        self.phase = TransformPhase::PreparingTransform;
        let overlay_was_running = overlay.is_running();
        if overlay_was_running {
            overlay.freeze();
        }

        self.phase = TransformPhase::Transforming;
        let result = window::apply_transform(target, width, height, false, settings.lower_taskbar_on_resize);

        self.phase = TransformPhase::PostTransform;
        match &result {
            Ok(()) => {
                thread::sleep(POST_TRANSFORM_SETTLE);
                let (screen_w, screen_h) = screen_extent();
                let still_oversized = width >= screen_w || height >= screen_h;

                if overlay_was_running {
                    if still_oversized {
                        overlay.unfreeze();
                        overlay.suppress_taskbar_redraw();
                    } else {
                        overlay.stop();
                    }
                }
            }
            Err(_) => {
                if overlay_was_running {
                    overlay.unfreeze();
                }
            }
        }

        self.phase = TransformPhase::Idle;
        result
    }

    /// `apply_ratio` (§6): resize to `ratio` at the target's current total
    /// pixel count.
    pub fn apply_ratio(&mut self, target: HWND, ratio: Ratio, total_pixels: u64, overlay: &mut OverlayView, settings: &WindowSettings) -> Result<()> {
        let resolution = window::calculate_resolution(ratio.ratio, total_pixels);
        self.apply_transform(target, resolution.width, resolution.height, overlay, settings)
    }

    /// `apply_resolution` (§6): resize to a specific resolution option at
    /// `ratio`.
    pub fn apply_resolution(&mut self, target: HWND, ratio: Ratio, resolution: ResolutionOption, overlay: &mut OverlayView, settings: &WindowSettings) -> Result<()> {
        let computed = window::calculate_resolution(ratio.ratio, resolution.total_pixels);
        self.apply_transform(target, computed.width, computed.height, overlay, settings)
    }
}

impl Default for TransformOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let orchestrator = TransformOrchestrator::new();
        assert_eq!(orchestrator.phase(), TransformPhase::Idle);
    }

    #[test]
    fn settle_delay_matches_spec_scenario() {
        assert_eq!(POST_TRANSFORM_SETTLE, Duration::from_millis(400));
    }
}
