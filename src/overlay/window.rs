// Overlay window class/instance management (§4.3 `initialize_window`).
//
// Grounded in the original's `overlay/window.cpp`: a click-through, layered,
// full-screen popup window with no redirection bitmap (so DWM doesn't
// allocate a backing surface we'll never present through GDI).

use anyhow::{bail, Context, Result};
use windows::core::w;
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{RedrawWindow, RDW_ALLCHILDREN, RDW_ERASE, RDW_FRAME, RDW_INVALIDATE};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, GetWindowLongW, RegisterClassExW,
    SetLayeredWindowAttributes, SetWindowLongW, ShowWindow, CS_HREDRAW, CS_VREDRAW, GWL_EXSTYLE,
    LWA_ALPHA, SW_HIDE, SW_SHOW, WNDCLASSEXW, WS_EX_LAYERED, WS_EX_NOACTIVATE,
    WS_EX_NOREDIRECTIONBITMAP, WS_EX_TOOLWINDOW, WS_EX_TRANSPARENT, WS_POPUP,
};

const CLASS_NAME: windows::core::PCWSTR = w!("SpinningMomoOverlayWindowClass");

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

pub fn register_class(instance: windows::Win32::Foundation::HINSTANCE) -> Result<()> {
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
        bail!("RegisterClassExW failed for overlay window class");
    }
    Ok(())
}

/// Create the full-screen, click-through layered overlay window.
pub fn create_overlay_window(
    instance: windows::Win32::Foundation::HINSTANCE,
    screen_width: i32,
    screen_height: i32,
) -> Result<HWND> {
    let hwnd = unsafe {
        CreateWindowExW(
            WS_EX_TRANSPARENT
                | WS_EX_TOOLWINDOW
                | WS_EX_NOACTIVATE
                | WS_EX_LAYERED
                | WS_EX_NOREDIRECTIONBITMAP,
            CLASS_NAME,
            w!("Overlay Window"),
            WS_POPUP,
            0,
            0,
            screen_width,
            screen_height,
            None,
            None,
            Some(instance.into()),
            None,
        )
        .context("CreateWindowExW failed for overlay window")?
    };

    unsafe {
        SetLayeredWindowAttributes(hwnd, windows::Win32::Foundation::COLORREF(0), 255, LWA_ALPHA)
            .context("SetLayeredWindowAttributes failed")?;
    }

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

/// Strip the layered style from the (now user-visible again) target window
/// and force a full repaint.
pub fn restore_target_window(target: HWND) {
    unsafe {
        let ex_style = GetWindowLongW(target, GWL_EXSTYLE) as u32;
        SetWindowLongW(target, GWL_EXSTYLE, (ex_style & !WS_EX_LAYERED.0) as i32);
        let _ = RedrawWindow(
            Some(target),
            None,
            None,
            RDW_ERASE | RDW_INVALIDATE | RDW_FRAME | RDW_ALLCHILDREN,
        );
    }
}

/// Apply the layered style with full alpha to the target so it keeps
/// rendering/receiving input while visually hidden behind the overlay.
pub fn hide_target_behind_overlay(target: HWND) -> Result<()> {
    unsafe {
        let ex_style = GetWindowLongW(target, GWL_EXSTYLE) as u32;
        SetWindowLongW(target, GWL_EXSTYLE, (ex_style | WS_EX_LAYERED.0) as i32);
        SetLayeredWindowAttributes(target, windows::Win32::Foundation::COLORREF(0), 255, LWA_ALPHA)
            .context("SetLayeredWindowAttributes on target failed")?;
    }
    Ok(())
}
