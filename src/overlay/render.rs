// Overlay D3D rendering: swap chain bound to the layered window, fullscreen
// quad sampling the capture SRV (§4.3 rendering algorithm).

use anyhow::{Context, Result};
use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::WaitForSingleObject;

use crate::d3d11::D3D11Context;
use crate::shader::{ShaderKit, QUAD_HLSL};

pub struct OverlayRenderer {
    pub swap_chain: IDXGISwapChain1,
    pub render_target: Option<ID3D11RenderTargetView>,
    pub shader_kit: ShaderKit,
    pub sampler: ID3D11SamplerState,
    pub blend_state: ID3D11BlendState,
    pub frame_latency_waitable: windows::Win32::Foundation::HANDLE,
    pub srv: Option<ID3D11ShaderResourceView>,
    pub create_new_srv: bool,
    width: u32,
    height: u32,
}

impl OverlayRenderer {
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
            Flags: DXGI_SWAP_CHAIN_FLAG_FRAME_LATENCY_WAITABLE_OBJECT.0 as u32,
            AlphaMode: DXGI_ALPHA_MODE_PREMULTIPLIED,
            ..Default::default()
        };

        let swap_chain = unsafe {
            dxgi_factory
                .CreateSwapChainForComposition(&ctx.device, &desc, None)
                .or_else(|_| dxgi_factory.CreateSwapChainForHwnd(&ctx.device, hwnd, &desc, None, None))
                .context("CreateSwapChain failed")?
        };

        let swap_chain2: IDXGISwapChain2 = swap_chain.cast().context("swap chain missing waitable object support")?;
        let frame_latency_waitable = unsafe { swap_chain2.GetFrameLatencyWaitableObject() };

        let render_target = Self::make_render_target(&ctx.device, &swap_chain)?;

        let elements = [D3D11_INPUT_ELEMENT_DESC {
            SemanticName: windows::core::PCSTR(b"UNUSED\0".as_ptr()),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_UNKNOWN,
            InputSlot: 0,
            AlignedByteOffset: 0,
            InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        }];
        // The quad shader reads SV_VertexID only; no real input elements needed,
        // but CreateInputLayout requires a non-empty byte-code-matching array
        // for some drivers, so an empty slice is passed instead.
        let shader_kit = ShaderKit::compile(&ctx.device, QUAD_HLSL, &elements[..0])?;

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

        Ok(Self {
            swap_chain,
            render_target,
            shader_kit,
            sampler: sampler.unwrap(),
            blend_state: blend_state.unwrap(),
            frame_latency_waitable,
            srv: None,
            create_new_srv: true,
            width,
            height,
        })
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
        // Drop all outstanding references to the backbuffer before resizing,
        // as DXGI requires (the bound render target view included).
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

    /// Wait (bounded) for the swap chain to free a present slot.
    pub fn wait_for_frame_latency(&self, timeout_ms: u32) {
        unsafe {
            let _ = WaitForSingleObject(self.frame_latency_waitable, timeout_ms);
        }
    }

    /// Create (or reuse) an SRV over `texture`, bound to consumer's own copy.
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

    /// Clear to transparent black and draw the fullscreen quad, then present
    /// with sync-interval 0 (§4.3 rendering algorithm).
    pub fn render(&self, context: &ID3D11DeviceContext) -> Result<()> {
        let Some(srv) = self.srv.as_ref() else {
            return Ok(());
        };
        let Some(render_target) = self.render_target.as_ref() else {
            return Ok(());
        };

        unsafe {
            context.OMSetRenderTargets(Some(&[Some(render_target.clone())]), None);
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

            context.IASetPrimitiveTopology(
                windows::Win32::Graphics::Direct3D::D3D11_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
            );
            context.IASetInputLayout(&self.shader_kit.input_layout);
            context.VSSetShader(&self.shader_kit.vertex_shader, None);
            context.PSSetShader(&self.shader_kit.pixel_shader, None);
            context.PSSetShaderResources(0, Some(&[Some(srv.clone())]));
            context.PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));
            context.OMSetBlendState(&self.blend_state, None, 0xffffffff);

            context.Draw(4, 0);

            self.swap_chain.Present(0, DXGI_PRESENT(0)).ok()?;
        }
        Ok(())
    }
}
