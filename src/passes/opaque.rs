//! GBuffer fill.
//!
//! Shades every opaque renderable into four GBuffer targets, testing against
//! the pre-pass depth with `Equal` and never writing it.

use super::{DrawList, PassCommandBuffers, PassContext, RenderPass, SlotTargets, TargetSpec};
use crate::config::{RendererConfig, formats};
use crate::error::BackendResult;
use crate::gfx::{
    BindPoint, ColorAttachment, CommandBufferId, DepthAttachment, GfxBackend, QueueType,
    RenderPassDesc, ResourceState, TextureId, TextureUsage, Viewport,
};
use crate::proxy::{ProxyManager, ShaderFlags};
use crate::scene::{CollectStats, DrawFilter, View};

const GBUFFER_LABELS: [&str; 4] = ["gbuffer_albedo", "gbuffer_normal", "gbuffer_orm", "gbuffer_emissive"];

const GBUFFER_USAGE: TextureUsage = TextureUsage::RENDER_TARGET.union(TextureUsage::SAMPLED);

pub struct OpaquePass {
    gbuffer: Vec<SlotTargets>,
    draws: DrawList,
    command_buffers: PassCommandBuffers,
}

impl OpaquePass {
    pub fn new(backend: &dyn GfxBackend, config: &RendererConfig) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let mut gbuffer: Vec<SlotTargets> = Vec::with_capacity(GBUFFER_LABELS.len());
        let cleanup = |gbuffer: &[SlotTargets]| gbuffer.iter().for_each(|t| t.destroy(backend));
        for (label, format) in GBUFFER_LABELS.into_iter().zip(formats::GBUFFER) {
            let targets = SlotTargets::new(backend, TargetSpec::new(label, format, GBUFFER_USAGE), width, height)
                .inspect_err(|_| cleanup(&gbuffer))?;
            gbuffer.push(targets);
        }
        let draws = DrawList::new(
            backend,
            "opaque instances",
            DrawFilter::Opaque,
            ShaderFlags::empty(),
            config.max_draws_per_pass,
            config.frame_arena_size,
        )
        .inspect_err(|_| cleanup(&gbuffer))?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "opaque")
            .inspect_err(|_| {
                draws.destroy(backend);
                cleanup(&gbuffer);
            })?;
        Ok(Self {
            gbuffer,
            draws,
            command_buffers,
        })
    }

    /// GBuffer textures of `frame_index` in albedo, normal, ORM, emissive order.
    pub fn gbuffer(&self, frame_index: usize) -> [TextureId; 4] {
        std::array::from_fn(|i| self.gbuffer[i].get(frame_index).texture)
    }

    pub fn gbuffer_indices(&self, frame_index: usize) -> [u32; 4] {
        std::array::from_fn(|i| self.gbuffer[i].get(frame_index).gpu_index)
    }

    pub fn prepare(
        &mut self,
        backend: &dyn GfxBackend,
        proxies: &ProxyManager,
        view: &View,
        frame_index: usize,
    ) -> CollectStats {
        crate::profile_scope!("opaque::prepare");
        self.draws.prepare(backend, proxies, view, frame_index)
    }

    /// Record the GBuffer fill against the pre-pass `depth`.
    pub fn render(&self, ctx: &mut PassContext<'_>, depth: TextureId) -> CommandBufferId {
        crate::profile_scope!("opaque::render");
        let backend = ctx.backend;
        let cb = self.command_buffers.begin(backend, ctx.frame_index);
        let gbuffer = self.gbuffer(ctx.frame_index);

        for texture in gbuffer {
            ctx.tracker.texture(texture, ResourceState::RenderTarget);
        }
        ctx.tracker.texture(depth, ResourceState::DepthRead);
        ctx.flush_barriers(cb);

        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "opaque",
                color: gbuffer
                    .iter()
                    .map(|texture| ColorAttachment::clear(*texture, [0.0; 4]))
                    .collect(),
                depth: Some(DepthAttachment::read_only(depth)),
            },
        );
        let (width, height) = self.gbuffer[0].extent();
        backend.cmd_set_viewport(cb, &Viewport::from_dimensions(width, height));
        if !self.draws.is_empty() {
            ctx.bind_globals(cb, BindPoint::Graphics);
            self.draws.record(backend, cb, ctx.frame_index, 0);
        }
        backend.cmd_end_render_pass(cb);

        for texture in gbuffer {
            ctx.tracker.rest_texture(texture);
        }
        ctx.tracker.rest_texture(depth);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for OpaquePass {
    fn name(&self) -> &'static str {
        "opaque"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.gbuffer.iter().flat_map(SlotTargets::textures).collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        GBUFFER_LABELS
            .into_iter()
            .zip(self.gbuffer_indices(frame_index))
            .collect()
    }

    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        self.gbuffer
            .iter_mut()
            .try_for_each(|targets| targets.resize(backend, width, height))
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.draws.destroy(backend);
        self.gbuffer.iter().for_each(|targets| targets.destroy(backend));
    }
}
