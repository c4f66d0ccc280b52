//! Tonemapping and bloom composite into the LDR world target.

use bytemuck::{Pod, Zeroable};

use super::{
    EngineShaders, PassCommandBuffers, PassContext, RenderPass, SlotTargets, TargetSpec,
};
use crate::config::{RendererConfig, formats};
use crate::error::BackendResult;
use crate::gfx::{
    BindPoint, ColorAttachment, CommandBufferId, GfxBackend, LoadOp, PipelineId, QueueType,
    RenderPassDesc, ResourceState, StoreOp, TextureId, TextureUsage, Viewport,
};

const WORLD: TargetSpec = TargetSpec::new(
    "world",
    formats::LDR,
    TextureUsage::RENDER_TARGET.union(TextureUsage::SAMPLED),
);

/// Exposure applied before tonemapping.
const EXPOSURE: f32 = 1.0;
/// Weight of the bloom chain in the composite.
const BLOOM_STRENGTH: f32 = 0.04;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PostConstants {
    hdr: u32,
    bloom: u32,
    exposure: f32,
    bloom_strength: f32,
}

pub struct PostCombinePass {
    pipeline: PipelineId,
    world: SlotTargets,
    command_buffers: PassCommandBuffers,
}

impl PostCombinePass {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let world = SlotTargets::new(backend, WORLD, width, height)?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "post_combine")
            .inspect_err(|_| world.destroy(backend))?;
        Ok(Self {
            pipeline: shaders.post_combine,
            world,
            command_buffers,
        })
    }

    pub fn world(&self, frame_index: usize) -> TextureId {
        self.world.get(frame_index).texture
    }

    pub fn world_index(&self, frame_index: usize) -> u32 {
        self.world.get(frame_index).gpu_index
    }

    pub fn world_extent(&self) -> (u32, u32) {
        self.world.extent()
    }

    /// Composite the HDR target and bloom chain, given as bindless indices.
    pub fn render(&self, ctx: &mut PassContext<'_>, hdr: u32, bloom: u32) -> CommandBufferId {
        crate::profile_scope!("post_combine::render");
        let backend = ctx.backend;
        let frame_index = ctx.frame_index;
        let cb = self.command_buffers.begin(backend, frame_index);
        let world = self.world(frame_index);

        ctx.tracker.texture(world, ResourceState::RenderTarget);
        ctx.flush_barriers(cb);
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "post_combine",
                color: vec![ColorAttachment {
                    texture: world,
                    load: LoadOp::DontCare,
                    store: StoreOp::Store,
                }],
                depth: None,
            },
        );
        let (width, height) = self.world.extent();
        backend.cmd_set_viewport(cb, &Viewport::from_dimensions(width, height));
        ctx.bind_globals(cb, BindPoint::Graphics);
        backend.cmd_bind_pipeline(cb, self.pipeline);
        let constants = PostConstants {
            hdr,
            bloom,
            exposure: EXPOSURE,
            bloom_strength: BLOOM_STRENGTH,
        };
        backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
        backend.cmd_draw(cb, 3, 1, 0, 0);
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(world);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for PostCombinePass {
    fn name(&self) -> &'static str {
        "post_combine"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.world.textures().collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![("world", self.world_index(frame_index))]
    }

    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        self.world.resize(backend, width, height)
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.world.destroy(backend);
    }
}
