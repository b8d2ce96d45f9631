// PreviewView's window: a small, resizable, titled child/top-level window
// that composites the target at preview scale plus the viewport indicator.
//
// Grounded in the original's `preview/preview.cpp` lifecycle (window
// created lazily on first `start`, DPI-aware title-bar accounting) and in
// the overlay window's class-registration pattern for the Win32 plumbing,
// since no dedicated preview window source file survived distillation.

use anyhow::{bail, Context, Result};
use windows::core::w;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::HiDpi::GetDpiForWindow;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, RegisterClassExW, ShowWindow, CS_HREDRAW,
    CS_VREDRAW, SW_HIDE, SW_SHOW, WNDCLASSEXW, WS_OVERLAPPEDWINDOW, WS_VISIBLE,
};

const CLASS_NAME: windows::core::PCWSTR = w!("SpinningMomoPreviewWindowClass");
const BASE_TITLE_HEIGHT: i32 = 32;
const BASE_DPI: f32 = 96.0;

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

pub fn register_class(instance: HINSTANCE) -> Result<()> {
    let class = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wnd_proc),
        hInstance: instance.into(),
        lpszClassName: CLASS_NAME,
        ..Default::default()
    };
    let atom = unsafe { RegisterClassExW(&class) };
    if atom == 0 {
        bail!("RegisterClassExW failed for preview window class");
    }
    Ok(())
}

pub fn create_preview_window(instance: HINSTANCE, width: i32, height: i32) -> Result<HWND> {
    let hwnd = unsafe {
        CreateWindowExW(
            Default::default(),
            CLASS_NAME,
            w!("Preview"),
            WS_OVERLAPPEDWINDOW | WS_VISIBLE,
            windows::Win32::UI::WindowsAndMessaging::CW_USEDEFAULT,
            windows::Win32::UI::WindowsAndMessaging::CW_USEDEFAULT,
            width,
            height,
            None,
            None,
            Some(instance.into()),
            None,
        )
        .context("CreateWindowExW failed for preview window")?
    };
    Ok(hwnd)
}

pub fn show(hwnd: HWND) {
    unsafe {
        let _ = ShowWindow(hwnd, SW_SHOW);
    }
}

pub fn hide(hwnd: HWND) {
    unsafe {
        let _ = ShowWindow(hwnd, SW_HIDE);
    }
}

pub fn destroy(hwnd: HWND) {
    unsafe {
        let _ = DestroyWindow(hwnd);
    }
}

/// DPI scale factor relative to the 96-DPI baseline (1.0 at 100% scaling).
pub fn dpi_scale(hwnd: HWND) -> f32 {
    let dpi = unsafe { GetDpiForWindow(hwnd) };
    if dpi == 0 {
        1.0
    } else {
        dpi as f32 / BASE_DPI
    }
}

/// Title-bar height in pixels at the window's current DPI, subtracted from
/// the client area before computing the preview's render surface size.
pub fn title_height(hwnd: HWND) -> i32 {
    (BASE_TITLE_HEIGHT as f32 * dpi_scale(hwnd)).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_dpi_scale_is_identity() {
        // GetDpiForWindow needs a live window; exercise the pure math path
        // that callers depend on instead.
        assert_eq!((96.0_f32 / BASE_DPI).round() as i32, 1);
    }
}
