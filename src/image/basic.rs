// Still-image encoding via the `image` crate, backing ScreenshotEncoder
// (§4.6): PNG (lossless) and JPEG (lossy), both driven off a BGRA8 buffer.

use std::path::Path;

use anyhow::{bail, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};

enum StillFormat {
    Png,
    Jpeg,
}

/// Save a BGRA8 frame using the `image` crate. Target format is inferred
/// from `path`'s extension; `jpeg_quality` (1-100) is only consulted for
/// `.jpg`/`.jpeg` targets.
pub fn save(path: &Path, data: &[u8], width: u32, height: u32, jpeg_quality: u8) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let format = match ext.as_str() {
        "png" => StillFormat::Png,
        "jpg" | "jpeg" => StillFormat::Jpeg,
        _ => bail!("basic: unsupported screenshot extension '.{}'", ext),
    };

    let expected_len = width as usize * height as usize * 4;
    if data.len() != expected_len {
        bail!(
            "basic: buffer length {} does not match {}x{} BGRA8 ({})",
            data.len(),
            width,
            height,
            expected_len
        );
    }

    // BGRA -> RGBA
    let mut rgba = data.to_vec();
    for pixel in rgba.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }

    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    match format {
        StillFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(writer, CompressionType::Fast, FilterType::Sub);
            encoder.write_image(&rgba, width, height, ExtendedColorType::Rgba8)?;
        }
        StillFormat::Jpeg => {
            // JPEG has no alpha channel; strip it.
            let rgb: Vec<u8> = rgba
                .chunks_exact(4)
                .flat_map(|px| &px[..3])
                .copied()
                .collect();
            let encoder = JpegEncoder::new_with_quality(&mut writer, jpeg_quality.clamp(1, 100));
            encoder.write_image(&rgb, width, height, ExtendedColorType::Rgb8)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_mismatched_buffer_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.png");
        let err = save(&path, &[0u8; 3], 2, 2, 90).unwrap_err();
        assert!(err.to_string().contains("buffer length"));
    }

    #[test]
    fn rejects_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bmp");
        let err = save(&path, &[0u8; 16], 2, 2, 90).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }

    #[test]
    fn writes_a_valid_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.png");
        let data = vec![0u8; 2 * 2 * 4];
        save(&path, &data, 2, 2, 90).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
