//! 2D canvas overlay.
//!
//! Canvas items are drawn last as instanced quads over the LDR world target,
//! back to front by layer. Items sharing a layer keep their proxy order.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use super::{EngineShaders, NO_GPU_INDEX, PassCommandBuffers, PassContext, RenderPass, SlotBuffers};
use crate::config::RendererConfig;
use crate::error::BackendResult;
use crate::events::NO_INDEX;
use crate::gfx::{
    BindPoint, BufferUsage, ColorAttachment, CommandBufferId, GfxBackend, PipelineId, QueueType,
    RenderPassDesc, ResourceState, TextureId, Viewport,
};
use crate::proxy::{CanvasItemProxy, ProxyManager};

/// Quad record read by the canvas shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CanvasQuad {
    /// x, y, width, height in pixels.
    pub rect: Vec4,
    pub color: Vec4,
    /// Bindless texture index or `NO_GPU_INDEX` for a flat color.
    pub texture: u32,
    pub layer: i32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CanvasConstants {
    quads: u32,
    _pad: u32,
    screen_size: [f32; 2],
}

pub struct CanvasPass {
    pipeline: PipelineId,
    quads: SlotBuffers,
    max_items: usize,
    quad_count: u32,
    command_buffers: PassCommandBuffers,
}

impl CanvasPass {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let max_items = config.capacities.canvas_items;
        let quads = SlotBuffers::new(
            backend,
            "canvas quads",
            (max_items * std::mem::size_of::<CanvasQuad>()) as u64,
            BufferUsage::STORAGE,
        )?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "canvas")
            .inspect_err(|_| quads.destroy(backend))?;
        Ok(Self {
            pipeline: shaders.canvas,
            quads,
            max_items,
            quad_count: 0,
            command_buffers,
        })
    }

    pub fn quad_count(&self) -> u32 {
        self.quad_count
    }

    pub fn prepare(&mut self, backend: &dyn GfxBackend, proxies: &ProxyManager, frame_index: usize) {
        crate::profile_scope!("canvas::prepare");
        let quads = sorted_quads(proxies);
        assert!(
            quads.len() <= self.max_items,
            "{} canvas items exceed the quad buffer capacity {}",
            quads.len(),
            self.max_items
        );
        self.quads
            .write(backend, frame_index, bytemuck::cast_slice(&quads));
        self.quad_count = quads.len() as u32;
    }

    /// Draw the quads over the world target.
    pub fn render(
        &self,
        ctx: &mut PassContext<'_>,
        world: TextureId,
        extent: (u32, u32),
    ) -> CommandBufferId {
        crate::profile_scope!("canvas::render");
        let backend = ctx.backend;
        let frame_index = ctx.frame_index;
        let cb = self.command_buffers.begin(backend, frame_index);
        if self.quad_count == 0 {
            backend.end_commands(cb);
            return cb;
        }

        ctx.tracker.texture(world, ResourceState::RenderTarget);
        ctx.flush_barriers(cb);
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "canvas",
                color: vec![ColorAttachment::load(world)],
                depth: None,
            },
        );
        backend.cmd_set_viewport(cb, &Viewport::from_dimensions(extent.0, extent.1));
        ctx.bind_globals(cb, BindPoint::Graphics);
        backend.cmd_bind_pipeline(cb, self.pipeline);
        let constants = CanvasConstants {
            quads: self.quads.gpu_index(frame_index),
            _pad: 0,
            screen_size: [extent.0 as f32, extent.1 as f32],
        };
        backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
        backend.cmd_draw(cb, 6, self.quad_count, 0, 0);
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(world);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

/// Active canvas items as quads, stable sorted by layer.
fn sorted_quads(proxies: &ProxyManager) -> Vec<CanvasQuad> {
    let mut items: Vec<&CanvasItemProxy> = proxies
        .canvas_items()
        .iter_active()
        .map(|(_, item)| item)
        .collect();
    items.sort_by_key(|item| item.layer);
    items
        .into_iter()
        .map(|item| CanvasQuad {
            rect: item.rect,
            color: item.color,
            texture: texture_index(proxies, item.texture),
            layer: item.layer,
            _pad: [0; 2],
        })
        .collect()
}

fn texture_index(proxies: &ProxyManager, texture: u32) -> u32 {
    if texture != NO_INDEX && proxies.textures().is_active(texture) {
        proxies.get_texture(texture).gpu_index
    } else {
        NO_GPU_INDEX
    }
}

impl RenderPass for CanvasPass {
    fn name(&self) -> &'static str {
        "canvas"
    }

    fn textures(&self) -> Vec<TextureId> {
        Vec::new()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![("canvas_quads", self.quads.gpu_index(frame_index))]
    }

    fn on_resize(&mut self, _backend: &dyn GfxBackend, _width: u32, _height: u32) -> BackendResult<()> {
        Ok(())
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.quads.destroy(backend);
    }
}
