// Overlay presentation geometry (§3 OverlayGeometry, §4.3 show algorithm).

use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

#[derive(Debug, Clone, Copy)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

pub fn screen_dimensions() -> (i32, i32) {
    unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
}

/// An overlay is only needed once the target exceeds the screen on either axis.
pub fn should_use_overlay(game_width: i32, game_height: i32, screen_width: i32, screen_height: i32) -> bool {
    game_width > screen_width || game_height > screen_height
}

/// Minimum centered rectangle containing the (possibly oversized) target,
/// used in non-letterbox presentation.
pub fn calculate_overlay_dimensions(
    game_width: i32,
    game_height: i32,
    screen_width: i32,
    screen_height: i32,
) -> (i32, i32) {
    (game_width.max(screen_width), game_height.max(screen_height))
}

/// Presentation rectangle for the overlay: full screen in letterbox mode,
/// otherwise the minimum centered rectangle containing the target.
pub fn presentation_rect(letterbox: bool, game_width: i32, game_height: i32) -> Rect {
    let (screen_width, screen_height) = screen_dimensions();
    if letterbox {
        Rect {
            left: 0,
            top: 0,
            width: screen_width,
            height: screen_height,
        }
    } else {
        let (width, height) =
            calculate_overlay_dimensions(game_width, game_height, screen_width, screen_height);
        Rect {
            left: (screen_width - width) / 2,
            top: (screen_height - height) / 2,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_not_needed_when_target_fits_screen() {
        assert!(!should_use_overlay(1920, 1080, 1920, 1080));
        assert!(should_use_overlay(5120, 2194, 1920, 1080));
    }

    #[test]
    fn letterbox_always_fills_screen() {
        let r = presentation_rect(true, 5120, 2194);
        let (sw, sh) = screen_dimensions();
        assert_eq!((r.width, r.height), (sw, sh));
    }
}
