//! Transparent geometry over the lit HDR target.

use super::{DrawList, PassCommandBuffers, PassContext, RenderPass};
use crate::config::RendererConfig;
use crate::error::BackendResult;
use crate::gfx::{
    BindPoint, ColorAttachment, CommandBufferId, DepthAttachment, GfxBackend, QueueType,
    RenderPassDesc, ResourceState, TextureId, Viewport,
};
use crate::proxy::{ProxyManager, ShaderFlags};
use crate::scene::{CollectStats, DrawFilter, View};

pub struct ForwardPass {
    draws: DrawList,
    command_buffers: PassCommandBuffers,
}

impl ForwardPass {
    pub fn new(backend: &dyn GfxBackend, config: &RendererConfig) -> BackendResult<Self> {
        let draws = DrawList::new(
            backend,
            "forward instances",
            DrawFilter::Transparent,
            ShaderFlags::TRANSPARENT,
            config.max_draws_per_pass,
            config.frame_arena_size,
        )?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "forward")
            .inspect_err(|_| draws.destroy(backend))?;
        Ok(Self {
            draws,
            command_buffers,
        })
    }

    pub fn prepare(
        &mut self,
        backend: &dyn GfxBackend,
        proxies: &ProxyManager,
        view: &View,
        frame_index: usize,
    ) -> CollectStats {
        crate::profile_scope!("forward::prepare");
        self.draws.prepare(backend, proxies, view, frame_index)
    }

    /// Record transparent draws over `hdr`. With `clear_hdr` the target is
    /// cleared first because the lighting pass did not write it this frame.
    pub fn render(
        &self,
        ctx: &mut PassContext<'_>,
        hdr: TextureId,
        depth: TextureId,
        extent: (u32, u32),
        clear_hdr: bool,
    ) -> CommandBufferId {
        crate::profile_scope!("forward::render");
        let backend = ctx.backend;
        let cb = self.command_buffers.begin(backend, ctx.frame_index);

        ctx.tracker
            .texture(hdr, ResourceState::RenderTarget)
            .texture(depth, ResourceState::DepthRead);
        ctx.flush_barriers(cb);
        let color = if clear_hdr {
            ColorAttachment::clear(hdr, [0.0, 0.0, 0.0, 1.0])
        } else {
            ColorAttachment::load(hdr)
        };
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "forward",
                color: vec![color],
                depth: Some(DepthAttachment::read_only(depth)),
            },
        );
        backend.cmd_set_viewport(cb, &Viewport::from_dimensions(extent.0, extent.1));
        if !self.draws.is_empty() {
            ctx.bind_globals(cb, BindPoint::Graphics);
            self.draws.record(backend, cb, ctx.frame_index, 0);
        }
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(hdr).rest_texture(depth);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for ForwardPass {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn textures(&self) -> Vec<TextureId> {
        Vec::new()
    }

    fn targets(&self, _frame_index: usize) -> Vec<(&'static str, u32)> {
        Vec::new()
    }

    fn on_resize(&mut self, _backend: &dyn GfxBackend, _width: u32, _height: u32) -> BackendResult<()> {
        Ok(())
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.draws.destroy(backend);
    }
}
