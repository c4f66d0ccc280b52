//! Depth pre-pass.
//!
//! Fills the slot's depth buffer with every visible opaque renderable so the
//! opaque pass can shade with an `Equal` depth test and later passes can read
//! depth without writing it.

use super::{DrawList, PassCommandBuffers, PassContext, RenderPass, SlotTargets, TargetSpec};
use crate::config::{RendererConfig, formats};
use crate::error::BackendResult;
use crate::gfx::{
    BindPoint, CommandBufferId, DepthAttachment, GfxBackend, QueueType, RenderPassDesc,
    ResourceState, TextureId, TextureUsage, Viewport,
};
use crate::proxy::{ProxyManager, ShaderFlags};
use crate::scene::{CollectStats, DrawFilter, View};

const DEPTH: TargetSpec = TargetSpec::new(
    "depth",
    formats::DEPTH,
    TextureUsage::DEPTH_STENCIL.union(TextureUsage::SAMPLED),
);

pub struct PreDepthPass {
    depth: SlotTargets,
    draws: DrawList,
    command_buffers: PassCommandBuffers,
}

impl PreDepthPass {
    pub fn new(backend: &dyn GfxBackend, config: &RendererConfig) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let depth = SlotTargets::new(backend, DEPTH, width, height)?;
        let draws = DrawList::new(
            backend,
            "pre_depth instances",
            DrawFilter::Opaque,
            ShaderFlags::DEPTH_ONLY,
            config.max_draws_per_pass,
            config.frame_arena_size,
        )
        .inspect_err(|_| depth.destroy(backend))?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "pre_depth")
            .inspect_err(|_| {
                draws.destroy(backend);
                depth.destroy(backend);
            })?;
        Ok(Self {
            depth,
            draws,
            command_buffers,
        })
    }

    /// Depth target of `frame_index`.
    pub fn depth(&self, frame_index: usize) -> TextureId {
        self.depth.get(frame_index).texture
    }

    pub fn depth_index(&self, frame_index: usize) -> u32 {
        self.depth.get(frame_index).gpu_index
    }

    pub fn prepare(
        &mut self,
        backend: &dyn GfxBackend,
        proxies: &ProxyManager,
        view: &View,
        frame_index: usize,
    ) -> CollectStats {
        crate::profile_scope!("pre_depth::prepare");
        self.draws.prepare(backend, proxies, view, frame_index)
    }

    pub fn render(&self, ctx: &mut PassContext<'_>) -> CommandBufferId {
        crate::profile_scope!("pre_depth::render");
        let backend = ctx.backend;
        let cb = self.command_buffers.begin(backend, ctx.frame_index);
        let depth = self.depth(ctx.frame_index);

        ctx.tracker.texture(depth, ResourceState::DepthWrite);
        ctx.flush_barriers(cb);
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "pre_depth",
                color: vec![],
                depth: Some(DepthAttachment::clear(depth)),
            },
        );
        let (width, height) = self.depth.extent();
        backend.cmd_set_viewport(cb, &Viewport::from_dimensions(width, height));
        if !self.draws.is_empty() {
            ctx.bind_globals(cb, BindPoint::Graphics);
            self.draws.record(backend, cb, ctx.frame_index, 0);
        }
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(depth);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for PreDepthPass {
    fn name(&self) -> &'static str {
        "pre_depth"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.depth.textures().collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![("depth", self.depth_index(frame_index))]
    }

    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        self.depth.resize(backend, width, height)
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.draws.destroy(backend);
        self.depth.destroy(backend);
    }
}
