// Integration test: ScreenshotEncoder end-to-end against a live target
// window (§4.6).

use spinningmomo_core::screenshot::{take_screenshot, StillFormat};
use spinningmomo_core::window::enumerate_visible_windows;

#[test]
#[ignore] // requires a live desktop session and a real GPU
fn captures_and_saves_a_png_screenshot() {
    let Some(target) = enumerate_visible_windows().into_iter().find(|w| !w.minimized) else {
        println!("SKIPPED: no non-minimized visible window found");
        return;
    };

    let dir = std::env::temp_dir().join("spinningmomo_core_test_screenshots");
    let mut result = None;
    take_screenshot(target.handle, &dir, StillFormat::Png, 1.0, |ok, path| {
        result = Some((ok, path));
    });

    let (ok, path) = result.expect("on_done was not called");
    assert!(ok, "screenshot capture failed");
    let path = path.expect("successful screenshot must return a path");
    assert!(path.exists());
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));

    std::fs::remove_file(&path).ok();
}
