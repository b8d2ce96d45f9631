// Resolution math backing WindowController's ratio/resolution-option pickers
// (§3 `Ratio`, `ResolutionOption`).
//
// Grounded in the original's `calculate_resolution`/`calculate_resolution_by_screen`:
// width/height derived from a target pixel count at a fixed aspect ratio,
// falling back to the screen's own ratio when no explicit ratio is given.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: i32,
    pub height: i32,
}

fn snap_even(v: f64) -> i32 {
    let rounded = v.round() as i32;
    (rounded / 2 * 2).max(2)
}

/// Derive a width/height pair at `ratio` (width/height) covering
/// approximately `total_pixels`, rounded to even dimensions.
pub fn calculate_resolution(ratio: f64, total_pixels: u64) -> Resolution {
    let height = (total_pixels as f64 / ratio).sqrt();
    let width = height * ratio;
    Resolution {
        width: snap_even(width),
        height: snap_even(height),
    }
}

/// Derive a resolution matching the screen's own aspect ratio at a
/// conventional 1080p-equivalent pixel count, used by `reset_to_screen`.
pub fn calculate_resolution_by_screen(screen_ratio: f64) -> Resolution {
    const REFERENCE_PIXELS: u64 = 1920 * 1080;
    calculate_resolution(screen_ratio, REFERENCE_PIXELS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_by_nine_matches_reference_resolution() {
        let res = calculate_resolution_by_screen(16.0 / 9.0);
        assert_eq!(res.width, 1920);
        assert_eq!(res.height, 1080);
    }

    #[test]
    fn dimensions_are_always_even() {
        let res = calculate_resolution(21.0 / 9.0, 2_000_003);
        assert_eq!(res.width % 2, 0);
        assert_eq!(res.height % 2, 0);
    }
}
