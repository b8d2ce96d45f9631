// PreviewView D3D rendering: a swap chain bound to the preview window, two
// passes — a fullscreen quad sampling the capture SRV, then a line-list
// viewport indicator on top (§4.4 rendering algorithm).
//
// Grounded in the original's `preview/rendering.cpp` (`render_basic_quad`,
// `render_viewport_frame`, `render_frame`) and in `OverlayRenderer` for the
// swap-chain/resize machinery shared with the overlay.

use anyhow::{Context, Result};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::D3D11_PRIMITIVE_TOPOLOGY_LINELIST;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::d3d11::D3D11Context;
use crate::preview::geometry::LineVertex;
use crate::shader::{ShaderKit, LINE_HLSL, QUAD_HLSL};

const MAX_VIEWPORT_VERTICES: u32 = 8;

pub struct PreviewRenderer {
    pub swap_chain: IDXGISwapChain1,
    pub render_target: Option<ID3D11RenderTargetView>,
    pub quad_shaders: ShaderKit,
    pub line_shaders: ShaderKit,
    pub sampler: ID3D11SamplerState,
    pub blend_state: ID3D11BlendState,
    pub viewport_vertex_buffer: ID3D11Buffer,
    pub srv: Option<ID3D11ShaderResourceView>,
    pub create_new_srv: bool,
    width: u32,
    height: u32,
}

impl PreviewRenderer {
    pub fn new(ctx: &D3D11Context, hwnd: HWND, width: u32, height: u32) -> Result<Self> {
        let dxgi_factory: IDXGIFactory2 = unsafe {
            ctx.dxgi_device
                .GetAdapter()?
                .GetParent()
                .context("IDXGIFactory2 from adapter failed")?
        };

        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: 2,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_SEQUENTIAL,
            AlphaMode: DXGI_ALPHA_MODE_IGNORE,
            ..Default::default()
        };

        let swap_chain = unsafe {
            dxgi_factory
                .CreateSwapChainForHwnd(&ctx.device, hwnd, &desc, None, None)
                .context("CreateSwapChainForHwnd failed")?
        };

        let render_target = Self::make_render_target(&ctx.device, &swap_chain)?;

        let quad_elements = [D3D11_INPUT_ELEMENT_DESC {
            SemanticName: windows::core::PCSTR(b"UNUSED\0".as_ptr()),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_UNKNOWN,
            InputSlot: 0,
            AlignedByteOffset: 0,
            InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        }];
        let quad_shaders = ShaderKit::compile(&ctx.device, QUAD_HLSL, &quad_elements[..0])?;

        let line_elements = [
            D3D11_INPUT_ELEMENT_DESC {
                SemanticName: windows::core::PCSTR(b"POSITION\0".as_ptr()),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R32G32_FLOAT,
                InputSlot: 0,
                AlignedByteOffset: 0,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
            D3D11_INPUT_ELEMENT_DESC {
                SemanticName: windows::core::PCSTR(b"COLOR\0".as_ptr()),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R32G32B32A32_FLOAT,
                InputSlot: 0,
                AlignedByteOffset: 8,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
        ];
        let line_shaders = ShaderKit::compile(&ctx.device, LINE_HLSL, &line_elements)?;

        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_POINT,
            AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
            ComparisonFunc: D3D11_COMPARISON_NEVER,
            MaxLOD: f32::MAX,
            ..Default::default()
        };
        let mut sampler = None;
        unsafe {
            ctx.device
                .CreateSamplerState(&sampler_desc, Some(&mut sampler))
                .context("CreateSamplerState failed")?;
        }

        let mut blend_desc = D3D11_BLEND_DESC::default();
        blend_desc.RenderTarget[0] = D3D11_RENDER_TARGET_BLEND_DESC {
            BlendEnable: true.into(),
            SrcBlend: D3D11_BLEND_SRC_ALPHA,
            DestBlend: D3D11_BLEND_INV_SRC_ALPHA,
            BlendOp: D3D11_BLEND_OP_ADD,
            SrcBlendAlpha: D3D11_BLEND_ONE,
            DestBlendAlpha: D3D11_BLEND_INV_SRC_ALPHA,
            BlendOpAlpha: D3D11_BLEND_OP_ADD,
            RenderTargetWriteMask: D3D11_COLOR_WRITE_ENABLE_ALL.0 as u8,
        };
        let mut blend_state = None;
        unsafe {
            ctx.device
                .CreateBlendState(&blend_desc, Some(&mut blend_state))
                .context("CreateBlendState failed")?;
        }

        let viewport_vertex_buffer = Self::create_dynamic_vertex_buffer(&ctx.device)?;

        Ok(Self {
            swap_chain,
            render_target,
            quad_shaders,
            line_shaders,
            sampler: sampler.unwrap(),
            blend_state: blend_state.unwrap(),
            viewport_vertex_buffer,
            srv: None,
            create_new_srv: true,
            width,
            height,
        })
    }

    fn create_dynamic_vertex_buffer(device: &ID3D11Device) -> Result<ID3D11Buffer> {
        let byte_size = MAX_VIEWPORT_VERTICES as usize * std::mem::size_of::<LineVertex>();
        let desc = D3D11_BUFFER_DESC {
            ByteWidth: byte_size as u32,
            Usage: D3D11_USAGE_DYNAMIC,
            BindFlags: D3D11_BIND_VERTEX_BUFFER.0 as u32,
            CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
            ..Default::default()
        };
        let mut buffer = None;
        unsafe {
            device
                .CreateBuffer(&desc, None, Some(&mut buffer))
                .context("CreateBuffer (viewport vertex buffer) failed")?;
        }
        Ok(buffer.unwrap())
    }

    fn make_render_target(
        device: &ID3D11Device,
        swap_chain: &IDXGISwapChain1,
    ) -> Result<Option<ID3D11RenderTargetView>> {
        unsafe {
            let backbuffer: ID3D11Texture2D = swap_chain.GetBuffer(0)?;
            let mut rtv = None;
            device.CreateRenderTargetView(&backbuffer, None, Some(&mut rtv))?;
            Ok(rtv)
        }
    }

    pub fn resize(&mut self, device: &ID3D11Device, context: &ID3D11DeviceContext, width: u32, height: u32) -> Result<()> {
        unsafe {
            context.OMSetRenderTargets(None, None);
        }
        self.render_target = None;
        unsafe {
            self.swap_chain
                .ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, 0)
                .context("ResizeBuffers failed")?;
        }
        self.render_target = Self::make_render_target(device, &self.swap_chain)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn ensure_srv(&mut self, device: &ID3D11Device, texture: &ID3D11Texture2D) -> Result<()> {
        if self.srv.is_some() && !self.create_new_srv {
            return Ok(());
        }
        let mut srv = None;
        unsafe {
            device.CreateShaderResourceView(texture, None, Some(&mut srv))?;
        }
        self.srv = srv;
        self.create_new_srv = false;
        Ok(())
    }

    fn upload_viewport_vertices(&self, context: &ID3D11DeviceContext, vertices: &[LineVertex]) -> Result<()> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            context.Map(&self.viewport_vertex_buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))?;
            let dst = mapped.pData as *mut LineVertex;
            let count = vertices.len().min(MAX_VIEWPORT_VERTICES as usize);
            std::ptr::copy_nonoverlapping(vertices.as_ptr(), dst, count);
            context.Unmap(&self.viewport_vertex_buffer, 0);
        }
        Ok(())
    }

    fn render_quad(&self, context: &ID3D11DeviceContext, render_target: &ID3D11RenderTargetView) {
        let Some(srv) = self.srv.as_ref() else { return };
        unsafe {
            context.IASetPrimitiveTopology(windows::Win32::Graphics::Direct3D::D3D11_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP);
            context.IASetInputLayout(&self.quad_shaders.input_layout);
            context.VSSetShader(&self.quad_shaders.vertex_shader, None);
            context.PSSetShader(&self.quad_shaders.pixel_shader, None);
            context.PSSetShaderResources(0, Some(&[Some(srv.clone())]));
            context.PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));
            context.OMSetBlendState(&self.blend_state, None, 0xffffffff);
            context.OMSetRenderTargets(Some(&[Some(render_target.clone())]), None);
            context.Draw(4, 0);
        }
    }

    fn render_viewport_indicator(&self, context: &ID3D11DeviceContext, vertices: &[LineVertex]) -> Result<()> {
        if vertices.is_empty() {
            return Ok(());
        }
        self.upload_viewport_vertices(context, vertices)?;
        let stride = std::mem::size_of::<LineVertex>() as u32;
        unsafe {
            context.IASetVertexBuffers(0, 1, Some(&Some(self.viewport_vertex_buffer.clone())), Some(&stride), Some(&0));
            context.IASetPrimitiveTopology(D3D11_PRIMITIVE_TOPOLOGY_LINELIST);
            context.IASetInputLayout(&self.line_shaders.input_layout);
            context.VSSetShader(&self.line_shaders.vertex_shader, None);
            context.PSSetShader(&self.line_shaders.pixel_shader, None);
            context.Draw(vertices.len() as u32, 0);
        }
        Ok(())
    }

    /// Clear, draw the captured frame, then overlay the viewport indicator
    /// (empty `viewport_vertices` draws nothing for the second pass) and
    /// present with vsync (preview is not latency-critical).
    pub fn render(&self, context: &ID3D11DeviceContext, viewport_vertices: &[LineVertex]) -> Result<()> {
        let Some(render_target) = self.render_target.as_ref() else {
            return Ok(());
        };

        unsafe {
            context.ClearRenderTargetView(render_target, &[0.0, 0.0, 0.0, 0.0]);

            let viewport = D3D11_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: self.width as f32,
                Height: self.height as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            };
            context.RSSetViewports(Some(&[viewport]));
        }

        self.render_quad(context, render_target);
        self.render_viewport_indicator(context, viewport_vertices)?;

        unsafe {
            self.swap_chain.Present(1, DXGI_PRESENT(0)).ok()?;
        }
        Ok(())
    }
}
