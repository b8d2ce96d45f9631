// ScreenshotEncoder (§4.6): a one-shot throw-away capture that crops the
// target's client area and saves it as PNG or JPEG.
//
// Grounded in the original's `screenshot/usecase.cpp` orchestration
// (capture → crop → encode → notify) and in `CaptureSession::get_client_box`
// (already shared with the crop math OverlayView/PreviewView don't need but
// this module does). `screenshot/folder.cpp`'s Unreal-Engine-specific
// `discover_game_path` heuristic is deliberately not ported: it is
// game-integration logic outside this module's contract, which only cares
// about a configured (or default) screenshots directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_B8G8R8A8_UNORM;
use windows::Win32::UI::WindowsAndMessaging::IsIconic;

use crate::capture::init_capture;
use crate::d3d11::texture::TextureReader;
use crate::d3d11::{create_d3d11_device, D3D11Context};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StillFormat {
    Png,
    /// Quality in (0, 1], mapped to the `image` crate's 1-100 JPEG scale.
    Jpeg,
}

impl StillFormat {
    fn extension(self) -> &'static str {
        match self {
            StillFormat::Png => "png",
            StillFormat::Jpeg => "jpg",
        }
    }
}

/// Crop `source` (full capture texture) to `box_` on the GPU, returning a
/// tightly-sized, non-bindable default-usage copy — grounded in the
/// original's two-step capture-then-crop path so the CPU readback below
/// only ever touches client-area pixels.
fn crop_to_default_texture(
    ctx: &D3D11Context,
    source: &ID3D11Texture2D,
    box_: &D3D11_BOX,
) -> Result<ID3D11Texture2D> {
    let width = box_.right - box_.left;
    let height = box_.bottom - box_.top;

    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: 0,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    };

    unsafe {
        let mut cropped = None;
        ctx.device
            .CreateTexture2D(&desc, None, Some(&mut cropped))
            .context("CreateTexture2D (crop target) failed")?;
        let cropped = cropped.unwrap();

        ctx.context.CopySubresourceRegion(&cropped, 0, 0, 0, 0, source, 0, Some(box_));
        Ok(cropped)
    }
}

/// Take a single screenshot of `target`'s client area and write it to
/// `directory` with a `YYYYMMDD_HHMMSS.{png|jpg}` name, invoking `on_done`
/// with success and the written path (or `None` on failure) once the
/// throw-away capture session has been fully torn down.
pub fn take_screenshot(
    target: HWND,
    directory: &Path,
    format: StillFormat,
    quality: f32,
    on_done: impl FnOnce(bool, Option<PathBuf>),
) {
    match take_screenshot_inner(target, directory, format, quality) {
        Ok(path) => on_done(true, Some(path)),
        Err(e) => {
            log::warn!("screenshot failed: {:#}", e);
            on_done(false, None);
        }
    }
}

fn take_screenshot_inner(target: HWND, directory: &Path, format: StillFormat, quality: f32) -> Result<PathBuf> {
    if unsafe { IsIconic(target).as_bool() } {
        bail!(CoreError::PreconditionUnmet("target window is minimized".into()));
    }
    if matches!(format, StillFormat::Jpeg) && !(0.0..=1.0).contains(&quality) {
        bail!(CoreError::InvalidArgument(format!(
            "JPEG quality must be in (0,1], got {}",
            quality
        )));
    }

    let ctx = create_d3d11_device()?;
    let capture = init_capture(&ctx, target, 1)?;
    capture.start()?;
    capture.wait_for_frame(2000)?;
    let frame = capture.try_get_next_frame()?;
    let texture = crate::capture::CaptureSession::frame_to_texture(&frame)?;

    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut desc) };

    let crop_box = capture
        .get_client_box(desc.Width, desc.Height)
        .context(CoreError::PreconditionUnmet(
            "target client area unavailable for cropping".into(),
        ))?;

    let cropped = crop_to_default_texture(&ctx, &texture, &crop_box)?;
    let mut reader = TextureReader::new(ctx.device.clone(), ctx.context.clone());
    let bgra = reader.read_texture(&cropped)?;

    let width = crop_box.right - crop_box.left;
    let height = crop_box.bottom - crop_box.top;

    std::fs::create_dir_all(directory).context("creating screenshots directory")?;
    let filename = format!("{}.{}", Local::now().format("%Y%m%d_%H%M%S"), format.extension());
    let path = directory.join(filename);

    let jpeg_quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    crate::image::basic::save(&path, &bgra, width, height, jpeg_quality)?;
    Ok(path)
}

/// Default screenshots directory when none is configured: a `Screenshots`
/// folder next to the running executable.
pub fn default_screenshots_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("current_exe failed")?;
    let dir = exe
        .parent()
        .context("executable has no parent directory")?
        .join("Screenshots");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_match_format() {
        assert_eq!(StillFormat::Png.extension(), "png");
        assert_eq!(StillFormat::Jpeg.extension(), "jpg");
    }
}
