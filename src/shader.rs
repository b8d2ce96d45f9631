// Vertex/pixel shader compilation for OverlayView and PreviewView.
//
// Generalizes the `D3DCompile` pattern used by the capture pipeline's
// compute shaders to the graphics pipeline: a fullscreen-quad pass that
// samples the capture SRV, and a line-list pass that draws the preview's
// viewport indicator (§4.4).

use anyhow::{bail, Context, Result};
use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D::Fxc::{D3DCompile, D3DCOMPILE_OPTIMIZATION_LEVEL3};
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D11::*;

/// Fullscreen triangle-strip quad, UV in `[0,1]^2`, sampling `t0`/`s0`.
pub const QUAD_HLSL: &str = r#"
struct VSOut {
    float4 pos : SV_POSITION;
    float2 uv : TEXCOORD0;
};

VSOut vs_main(uint id : SV_VertexID) {
    VSOut o;
    float2 uv = float2((id << 1) & 2, id & 2);
    o.uv = uv;
    o.pos = float4(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    return o;
}

Texture2D CaptureTexture : register(t0);
SamplerState PointSampler : register(s0);

float4 ps_main(VSOut i) : SV_TARGET {
    return CaptureTexture.Sample(PointSampler, i.uv);
}
"#;

/// Line-list pass for the preview viewport indicator: per-vertex position +
/// color, no texture sampling (§4.4 rendering algorithm, pass 2).
pub const LINE_HLSL: &str = r#"
struct VSIn {
    float2 pos : POSITION;
    float4 color : COLOR;
};

struct VSOut {
    float4 pos : SV_POSITION;
    float4 color : COLOR;
};

VSOut vs_main(VSIn i) {
    VSOut o;
    o.pos = float4(i.pos.x * 2.0 - 1.0, 1.0 - i.pos.y * 2.0, 0.0, 1.0);
    o.color = i.color;
    return o;
}

float4 ps_main(VSOut i) : SV_TARGET {
    return i.color;
}
"#;

/// A compiled vertex + pixel shader pair plus the input layout matching the
/// caller-supplied vertex format.
pub struct ShaderKit {
    pub vertex_shader: ID3D11VertexShader,
    pub pixel_shader: ID3D11PixelShader,
    pub input_layout: ID3D11InputLayout,
}

impl ShaderKit {
    /// Compile `hlsl` (containing `vs_main`/`ps_main` entry points) into a
    /// vertex/pixel shader pair and build an input layout from `elements`.
    pub fn compile(
        device: &ID3D11Device,
        hlsl: &str,
        elements: &[D3D11_INPUT_ELEMENT_DESC],
    ) -> Result<Self> {
        let vs_blob = compile_stage(hlsl, "vs_main", "vs_5_0")?;
        let ps_blob = compile_stage(hlsl, "ps_main", "ps_5_0")?;

        // SAFETY: blobs hold valid compiled bytecode from D3DCompile above.
        let (vertex_shader, input_layout) = unsafe {
            let bytecode = blob_bytes(&vs_blob);
            let mut vs = None;
            device
                .CreateVertexShader(bytecode, None, Some(&mut vs))
                .context("CreateVertexShader failed")?;

            let mut layout = None;
            device
                .CreateInputLayout(elements, bytecode, Some(&mut layout))
                .context("CreateInputLayout failed")?;

            (vs.unwrap(), layout.unwrap())
        };

        // SAFETY: ps_blob holds valid compiled bytecode from D3DCompile above.
        let pixel_shader = unsafe {
            let mut ps = None;
            device
                .CreatePixelShader(blob_bytes(&ps_blob), None, Some(&mut ps))
                .context("CreatePixelShader failed")?;
            ps.unwrap()
        };

        Ok(Self {
            vertex_shader,
            pixel_shader,
            input_layout,
        })
    }
}

fn compile_stage(hlsl: &str, entry_point: &str, target: &str) -> Result<ID3DBlob> {
    let mut blob: Option<ID3DBlob> = None;
    let mut error_blob: Option<ID3DBlob> = None;

    let entry = format!("{}\0", entry_point);
    let target = format!("{}\0", target);

    // SAFETY: D3DCompile reads from hlsl/entry/target and writes to the COM blobs;
    // all pointers are valid for the duration of the call.
    let hr = unsafe {
        D3DCompile(
            hlsl.as_ptr() as *const _,
            hlsl.len(),
            None,
            None,
            None,
            PCSTR(entry.as_ptr()),
            PCSTR(target.as_ptr()),
            D3DCOMPILE_OPTIMIZATION_LEVEL3,
            0,
            &mut blob,
            Some(&mut error_blob),
        )
    };

    if hr.is_err() {
        let msg = error_blob
            .as_ref()
            .map(|b| unsafe {
                let ptr = b.GetBufferPointer() as *const u8;
                let len = b.GetBufferSize();
                String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).to_string()
            })
            .unwrap_or_else(|| format!("D3DCompile failed: {:?}", hr));
        bail!("shader compilation failed ({}): {}", entry_point, msg.trim_end_matches('\0'));
    }

    blob.context("D3DCompile succeeded but returned no bytecode")
}

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    // SAFETY: blob is a live ID3DBlob returned by a successful D3DCompile call.
    unsafe {
        let ptr = blob.GetBufferPointer() as *const u8;
        let len = blob.GetBufferSize();
        std::slice::from_raw_parts(ptr, len)
    }
}
