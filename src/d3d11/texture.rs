// Texture creation and readback utility functions.

use anyhow::{Context, Result};
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;

const BYTES_PER_PIXEL: usize = 4; // BGRA8 throughout; no color-managed pipeline here

/// Texture reader: responsible for reading GPU texture data back to CPU.
///
/// Staging texture is created on demand and cached for reuse, automatically
/// rebuilt when size changes. The returned buffer has RowPitch padding
/// stripped and can be indexed directly by `width * 4`.
pub struct TextureReader {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    staging_texture: Option<ID3D11Texture2D>,
    buffer: Vec<u8>,
    width: u32,
    height: u32,
}

impl TextureReader {
    pub fn new(device: ID3D11Device, context: ID3D11DeviceContext) -> Self {
        Self {
            device,
            context,
            staging_texture: None,
            buffer: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    /// Ensure a staging texture exists matching `width` x `height`.
    pub fn ensure_staging_texture(&mut self, width: u32, height: u32) -> Result<()> {
        if self.staging_texture.is_some() && self.width == width && self.height == height {
            return Ok(());
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        // SAFETY: `desc` is fully initialized and `self.device` is a live D3D11 device;
        // CreateTexture2D writes to local `texture` only and returns a COM-owned object on success.
        unsafe {
            let mut texture = None;
            self.device
                .CreateTexture2D(&desc, None, Some(&mut texture))
                .context("Failed to create staging texture")?;

            self.staging_texture = Some(texture.unwrap());
            self.width = width;
            self.height = height;
        }

        let required = width as usize * height as usize * BYTES_PER_PIXEL;
        if self.buffer.len() < required {
            self.buffer.resize(required, 0);
        }

        Ok(())
    }

    /// Read data from a GPU BGRA8 texture to CPU.
    ///
    /// Returns an owned `Vec<u8>` with RowPitch padding stripped, each row
    /// exactly `width * 4` bytes.
    pub fn read_texture(&mut self, source_texture: &ID3D11Texture2D) -> Result<Vec<u8>> {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe {
            source_texture.GetDesc(&mut desc);
        }

        self.ensure_staging_texture(desc.Width, desc.Height)?;
        let staging = self.staging_texture.as_ref().unwrap();

        unsafe {
            self.context.CopyResource(staging, source_texture);

            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            self.context
                .Map(staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .context("Failed to map staging texture")?;

            let row_pitch = mapped.RowPitch as usize;
            let row_bytes = desc.Width as usize * BYTES_PER_PIXEL;
            let height = desc.Height as usize;

            let src = mapped.pData as *const u8;
            for y in 0..height {
                // SAFETY: src points to mapped GPU memory, row_pitch * y + row_bytes is within
                // mapped range; self.buffer was pre-allocated in ensure_staging_texture.
                std::ptr::copy_nonoverlapping(
                    src.add(y * row_pitch),
                    self.buffer.as_mut_ptr().add(y * row_bytes),
                    row_bytes,
                );
            }

            self.context.Unmap(staging, 0);

            Ok(self.buffer[..row_bytes * height].to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d3d11::create_d3d11_device;

    #[test]
    #[ignore] // requires a live GPU/Windows session
    fn test_texture_readback_row_stripped() {
        let d3d_ctx = create_d3d11_device().unwrap();
        let mut reader = TextureReader::new(d3d_ctx.device.clone(), d3d_ctx.context.clone());

        // 2x2 BGRA8, all opaque red pixels (B=0, G=0, R=255, A=255)
        let pixel_red: [u8; 4] = [0, 0, 255, 255];
        let mut init_bytes = Vec::new();
        for _ in 0..4 {
            init_bytes.extend_from_slice(&pixel_red);
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: 2,
            Height: 2,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: 0,
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };

        let subresource_data = D3D11_SUBRESOURCE_DATA {
            pSysMem: init_bytes.as_ptr() as *const _,
            SysMemPitch: 8, // 2 pixels × 4 bytes
            SysMemSlicePitch: 0,
        };

        unsafe {
            let mut texture = None;
            d3d_ctx
                .device
                .CreateTexture2D(&desc, Some(&subresource_data), Some(&mut texture))
                .unwrap();
            let texture = texture.unwrap();

            let data = reader.read_texture(&texture).unwrap();

            assert_eq!(data.len(), 16, "Stripped buffer should be exactly 16 bytes");
            assert_eq!(&data[0..4], &pixel_red);
            assert_eq!(&data[8..12], &pixel_red); // first pixel of second row
        }
    }
}
