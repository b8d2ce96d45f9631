// WindowController (§4.1): discover target windows and apply geometry
// transforms, including transforms that exceed physical screen bounds.
//
// Grounded in the capture module's enumeration/DPI pattern and in
// `window_control.cpp`'s resize/centering math.

mod enumerate;
mod geometry;

pub use enumerate::{enumerate_visible_windows, find_by_title, VisibleWindow};
pub use geometry::{calculate_resolution, calculate_resolution_by_screen, Resolution};

use anyhow::{bail, Context, Result};
use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::UI::WindowsAndMessaging::{
    AdjustWindowRectEx, FindWindowW, GetWindowLongW, IsWindow, SetWindowLongW, SetWindowPos,
    GWL_EXSTYLE, GWL_STYLE, HWND_BOTTOM, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE,
    SWP_NOSIZE, SWP_NOZORDER, WS_OVERLAPPEDWINDOW, WS_POPUP,
};

use crate::error::CoreError;

/// A resolved target window: opaque handle plus last-observed title.
///
/// The core never owns the window's lifetime, only its transform (§3).
#[derive(Debug, Clone, Copy)]
pub struct TargetWindow {
    pub handle: HWND,
}

fn screen_extent() -> (i32, i32) {
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};
    unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
}

/// Round a dimension down to the nearest even value (never below 2).
fn snap_even(v: i32) -> i32 {
    (v / 2 * 2).max(2)
}

/// Validate an HWND is still a live window.
fn validate(handle: HWND) -> Result<()> {
    if unsafe { IsWindow(Some(handle)).as_bool() } {
        Ok(())
    } else {
        bail!(CoreError::PreconditionUnmet(
            "invalid or destroyed window handle".into()
        ))
    }
}

/// `apply_transform` (§4.1): resize + reposition + (optionally) strip/restore
/// the frame + (optionally) lower the taskbar.
///
/// Sequence mirrors the original's `resize_and_center_window`: read style,
/// flip frame/popup as needed, compute the outer rectangle via
/// `AdjustWindowRectEx` (this is what correctly accounts for invisible
/// border offsets on borderless styles — §4.1 key algorithm), then center.
pub fn apply_transform(
    handle: HWND,
    target_width: i32,
    target_height: i32,
    activate: bool,
    lower_taskbar: bool,
) -> Result<()> {
    validate(handle)?;

    let width = snap_even(target_width);
    let height = snap_even(target_height);

    let mut style = unsafe { GetWindowLongW(handle, GWL_STYLE) } as u32;
    if style == 0 {
        bail!(CoreError::ResourceCreationFailed(
            "GetWindowLongW(GWL_STYLE) failed".into()
        ));
    }
    let ex_style = unsafe { GetWindowLongW(handle, GWL_EXSTYLE) } as u32;

    let (screen_w, screen_h) = screen_extent();
    let oversized = width >= screen_w || height >= screen_h;

    if (style & WS_OVERLAPPEDWINDOW.0) != 0 && oversized {
        style &= !WS_OVERLAPPEDWINDOW.0;
        style |= WS_POPUP.0;
        set_style(handle, style)?;
    } else if (style & WS_POPUP.0) != 0 && !oversized {
        style &= !WS_POPUP.0;
        style |= WS_OVERLAPPEDWINDOW.0;
        set_style(handle, style)?;
    }

    let mut rect = RECT {
        left: 0,
        top: 0,
        right: width,
        bottom: height,
    };
    unsafe {
        AdjustWindowRectEx(&mut rect, windows::Win32::UI::WindowsAndMessaging::WINDOW_STYLE(style), false, windows::Win32::UI::WindowsAndMessaging::WINDOW_EX_STYLE(ex_style))
            .context("AdjustWindowRectEx failed")?;
    }

    let total_width = rect.right - rect.left;
    let total_height = rect.bottom - rect.top;
    let border_offset_x = rect.left; // negative for popup/no-border styles
    let border_offset_y = rect.top;

    let new_left = (screen_w - width) / 2 + border_offset_x;
    let new_top = (screen_h - height) / 2 + border_offset_y;

    let mut flags = SWP_NOZORDER;
    if !activate {
        flags |= SWP_NOACTIVATE;
    }

    unsafe {
        SetWindowPos(handle, None, new_left, new_top, total_width, total_height, flags)
            .context("SetWindowPos failed")?;
    }

    if lower_taskbar {
        lower_taskbar_z_order();
    }

    Ok(())
}

fn set_style(handle: HWND, style: u32) -> Result<()> {
    let prev = unsafe { SetWindowLongW(handle, GWL_STYLE, style as i32) };
    if prev == 0 {
        bail!(CoreError::ResourceCreationFailed(
            "SetWindowLongW(GWL_STYLE) failed".into()
        ));
    }
    Ok(())
}

/// Push the shell tray window to the bottom of the Z-order.
///
/// Called unconditionally by the original on every successful resize; the
/// spec makes this conditional on `lower_taskbar` (SPEC_FULL §10).
pub fn lower_taskbar_z_order() {
    unsafe {
        if let Ok(taskbar) = FindWindowW(windows::core::w!("Shell_TrayWnd"), None) {
            let _ = SetWindowPos(
                taskbar,
                Some(HWND_BOTTOM),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            );
        }
    }
}

/// `reset_to_screen` (§4.1): fit the primary monitor at its native aspect
/// ratio and apply.
pub fn reset_to_screen(handle: HWND, activate: bool, lower_taskbar: bool) -> Result<()> {
    validate(handle)?;
    let (screen_w, screen_h) = screen_extent();
    let screen_ratio = screen_w as f64 / screen_h as f64;
    let resolution = calculate_resolution_by_screen(screen_ratio);
    apply_transform(handle, resolution.width, resolution.height, activate, lower_taskbar)
}

/// `toggle_borderless` (§4.1): flip frame <-> popup style and force a redraw.
pub fn toggle_borderless(handle: HWND) -> Result<bool> {
    validate(handle)?;

    let mut style = unsafe { GetWindowLongW(handle, GWL_STYLE) } as u32;
    if style == 0 {
        bail!(CoreError::ResourceCreationFailed(
            "GetWindowLongW(GWL_STYLE) failed".into()
        ));
    }

    let has_border = (style & WS_OVERLAPPEDWINDOW.0) != 0;
    if has_border {
        style &= !WS_OVERLAPPEDWINDOW.0;
        style |= WS_POPUP.0;
    } else {
        style &= !WS_POPUP.0;
        style |= WS_OVERLAPPEDWINDOW.0;
    }
    set_style(handle, style)?;

    unsafe {
        SetWindowPos(
            handle,
            None,
            0,
            0,
            0,
            0,
            SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_FRAMECHANGED,
        )
        .context("SetWindowPos (frame-changed) failed")?;
    }

    Ok(!has_border)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_even_rounds_down_and_floors_at_two() {
        assert_eq!(snap_even(1921), 1920);
        assert_eq!(snap_even(1920), 1920);
        assert_eq!(snap_even(1), 2);
        assert_eq!(snap_even(0), 2);
    }
}
