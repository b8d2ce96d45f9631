// PreviewView viewport-indicator geometry (§4.4): a small amber rectangle
// drawn inside the preview surface showing which portion of an oversized
// target is currently on-screen.
//
// Grounded in the original's `preview/viewport.cpp`: `check_game_window_visibility`,
// `calculate_viewport_position`, and `create_viewport_vertices`.

use windows::Win32::Foundation::RECT;
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

/// Amber, 80% alpha — the indicator's fixed color.
pub const INDICATOR_COLOR: [f32; 4] = [255.0 / 255.0, 160.0 / 255.0, 80.0 / 255.0, 0.8];

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct LineVertex {
    pub pos: [f32; 2],
    pub color: [f32; 4],
}

/// True iff `game_rect` lies entirely within the primary screen bounds.
pub fn game_window_fully_visible(game_rect: RECT) -> bool {
    let screen_width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
    let screen_height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
    game_rect.left >= 0
        && game_rect.top >= 0
        && game_rect.right <= screen_width
        && game_rect.bottom <= screen_height
}

/// Portion of `game_rect` actually visible on-screen, clamped to the screen
/// bounds on each axis independently.
pub fn visible_game_area(game_rect: RECT) -> RECT {
    let screen_width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
    let screen_height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
    RECT {
        left: game_rect.left.max(0),
        top: game_rect.top.max(0),
        right: game_rect.right.min(screen_width),
        bottom: game_rect.bottom.min(screen_height),
    }
}

/// Normalized `[0,1]^2` rectangle locating the visible area within the full
/// (possibly off-screen) target rect, clamped on each edge.
fn normalized_visible_rect(game_rect: RECT) -> Option<(f32, f32, f32, f32)> {
    let game_width = (game_rect.right - game_rect.left) as f32;
    let game_height = (game_rect.bottom - game_rect.top) as f32;
    if game_width <= 0.0 || game_height <= 0.0 {
        return None;
    }

    let visible = visible_game_area(game_rect);
    let left = ((visible.left - game_rect.left) as f32 / game_width).clamp(0.0, 1.0);
    let top = ((visible.top - game_rect.top) as f32 / game_height).clamp(0.0, 1.0);
    let right = ((visible.right - game_rect.left) as f32 / game_width).clamp(0.0, 1.0);
    let bottom = ((visible.bottom - game_rect.top) as f32 / game_height).clamp(0.0, 1.0);
    Some((left, top, right, bottom))
}

/// Viewport indicator as a preview-surface-relative pixel rect (excludes the
/// title bar strip, which callers add back as a Y offset).
pub fn calculate_viewport_position(
    game_rect: RECT,
    preview_width: i32,
    preview_height: i32,
) -> Option<RECT> {
    if preview_width <= 0 || preview_height <= 0 {
        return None;
    }
    let (left, top, right, bottom) = normalized_visible_rect(game_rect)?;
    Some(RECT {
        left: (left * preview_width as f32) as i32,
        top: (top * preview_height as f32) as i32,
        right: (right * preview_width as f32) as i32,
        bottom: (bottom * preview_height as f32) as i32,
    })
}

/// The indicator's four edges as an 8-vertex line list, in normalized
/// `[0,1]^2` preview-surface coordinates (line-list topology: each edge is
/// its own vertex pair).
pub fn create_viewport_vertices(game_rect: RECT) -> Vec<LineVertex> {
    let Some((left, top, right, bottom)) = normalized_visible_rect(game_rect) else {
        return Vec::new();
    };

    let corner = |x: f32, y: f32| LineVertex {
        pos: [x, y],
        color: INDICATOR_COLOR,
    };

    vec![
        corner(left, top),
        corner(right, top),
        corner(right, top),
        corner(right, bottom),
        corner(right, bottom),
        corner(left, bottom),
        corner(left, bottom),
        corner(left, top),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: i32, top: i32, right: i32, bottom: i32) -> RECT {
        RECT { left, top, right, bottom }
    }

    #[test]
    fn fully_onscreen_rect_has_no_vertices_when_caller_skips_it() {
        // Visibility gating happens one level up; geometry itself still
        // produces a (degenerate, all-zero-area) rect for a fully visible
        // target since it has no opinion on whether to draw it.
        let r = rect(0, 0, 100, 100);
        let v = create_viewport_vertices(r);
        assert_eq!(v.len(), 8);
    }

    #[test]
    fn indicator_matches_off_screen_fraction() {
        // Target spans x in [-100, 100) (width 200), only x in [0,100) is
        // onscreen-representable in this synthetic example -> right half.
        let r = rect(-100, 0, 100, 100);
        let vertices = create_viewport_vertices(r);
        let xs: Vec<f32> = vertices.iter().map(|v| v.pos[0]).collect();
        assert!(xs.iter().any(|&x| (x - 0.5).abs() < 0.001));
        assert!(xs.iter().any(|&x| (x - 1.0).abs() < 0.001));
    }

    #[test]
    fn empty_extent_rect_produces_no_vertices() {
        let r = rect(10, 10, 10, 10);
        assert!(create_viewport_vertices(r).is_empty());
    }
}
