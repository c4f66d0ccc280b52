//! GPU particles.
//!
//! Simulation is a compute dispatch per emitter batched with SSAO on the
//! compute queue; rendering draws one instanced quad per live particle into
//! the HDR target after the forward pass. Both command buffers are closed
//! empty when no emitter has live particles.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use super::{
    EngineShaders, PassCommandBuffers, PassContext, RenderPass, SlotBuffers, group_count,
};
use crate::config::RendererConfig;
use crate::error::BackendResult;
use crate::gfx::{
    BindPoint, BufferUsage, ColorAttachment, CommandBufferId, DepthAttachment, GfxBackend,
    PipelineId, QueueType, RenderPassDesc, ResourceState, TextureId, Viewport,
};
use crate::proxy::ProxyManager;

const GROUP_SIZE: u32 = 64;

/// Emitter record read by the simulation and render shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuEmitter {
    pub transform: Mat4,
    pub color: Vec4,
    pub state_buffer: u32,
    pub max_particles: u32,
    pub live_particles: u32,
    pub spawn_rate: f32,
    pub lifetime: f32,
    pub size: f32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ParticleConstants {
    emitter_buffer: u32,
    emitter: u32,
    delta_time: f32,
    elapsed: f32,
}

pub struct ParticlePass {
    simulate: PipelineId,
    render: PipelineId,
    emitters: SlotBuffers,
    max_emitters: usize,
    /// `(max_particles, live_particles)` per emitter record this frame.
    batches: Vec<(u32, u32)>,
    simulate_buffers: PassCommandBuffers,
    render_buffers: PassCommandBuffers,
}

impl ParticlePass {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let max_emitters = config.capacities.emitters;
        let emitters = SlotBuffers::new(
            backend,
            "particle emitters",
            (max_emitters * std::mem::size_of::<GpuEmitter>()) as u64,
            BufferUsage::STORAGE,
        )?;
        let simulate_buffers =
            PassCommandBuffers::new(backend, QueueType::Compute, "particle_simulate")
                .inspect_err(|_| emitters.destroy(backend))?;
        let render_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "particle_render")
            .inspect_err(|_| {
                simulate_buffers.destroy(backend);
                emitters.destroy(backend);
            })?;
        Ok(Self {
            simulate: shaders.particle_simulate,
            render: shaders.particle_render,
            emitters,
            max_emitters,
            batches: Vec::new(),
            simulate_buffers,
            render_buffers,
        })
    }

    /// Number of emitters with live particles this frame.
    pub fn live_emitters(&self) -> usize {
        self.batches.len()
    }

    pub fn prepare(&mut self, backend: &dyn GfxBackend, proxies: &ProxyManager, frame_index: usize) {
        crate::profile_scope!("particles::prepare");
        self.batches.clear();
        let records: Vec<GpuEmitter> = proxies
            .emitters()
            .iter_active()
            .filter(|(_, emitter)| emitter.live_particles() > 0)
            .map(|(_, emitter)| GpuEmitter {
                transform: emitter.transform,
                color: emitter.color,
                state_buffer: emitter.state_gpu_index,
                max_particles: emitter.max_particles,
                live_particles: emitter.live_particles(),
                spawn_rate: emitter.spawn_rate,
                lifetime: emitter.lifetime,
                size: emitter.size,
                _pad: [0; 2],
            })
            .collect();
        assert!(
            records.len() <= self.max_emitters,
            "{} emitters exceed the emitter buffer capacity {}",
            records.len(),
            self.max_emitters
        );
        self.batches = records
            .iter()
            .map(|record| (record.max_particles, record.live_particles))
            .collect();
        self.emitters
            .write(backend, frame_index, bytemuck::cast_slice(&records));
    }

    fn constants(&self, ctx: &PassContext<'_>, emitter: usize) -> ParticleConstants {
        ParticleConstants {
            emitter_buffer: self.emitters.gpu_index(ctx.frame_index),
            emitter: emitter as u32,
            delta_time: ctx.time.delta,
            elapsed: ctx.time.elapsed,
        }
    }

    /// Record the simulation dispatches on the compute queue.
    pub fn simulate(&self, ctx: &mut PassContext<'_>) -> CommandBufferId {
        crate::profile_scope!("particles::simulate");
        let backend = ctx.backend;
        let cb = self.simulate_buffers.begin(backend, ctx.frame_index);
        if !self.batches.is_empty() {
            ctx.bind_globals(cb, BindPoint::Compute);
            backend.cmd_bind_pipeline(cb, self.simulate);
            for (emitter, (max_particles, _)) in self.batches.iter().enumerate() {
                let constants = self.constants(ctx, emitter);
                backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
                backend.cmd_dispatch(cb, group_count(*max_particles, GROUP_SIZE), 1, 1);
            }
        }
        backend.end_commands(cb);
        cb
    }

    /// Record the particle quads over `hdr`, tested against `depth`.
    pub fn render(
        &self,
        ctx: &mut PassContext<'_>,
        hdr: TextureId,
        depth: TextureId,
        extent: (u32, u32),
    ) -> CommandBufferId {
        crate::profile_scope!("particles::render");
        let backend = ctx.backend;
        let cb = self.render_buffers.begin(backend, ctx.frame_index);
        if self.batches.is_empty() {
            backend.end_commands(cb);
            return cb;
        }

        ctx.tracker
            .texture(hdr, ResourceState::RenderTarget)
            .texture(depth, ResourceState::DepthRead);
        ctx.flush_barriers(cb);
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "particles",
                color: vec![ColorAttachment::load(hdr)],
                depth: Some(DepthAttachment::read_only(depth)),
            },
        );
        backend.cmd_set_viewport(cb, &Viewport::from_dimensions(extent.0, extent.1));
        ctx.bind_globals(cb, BindPoint::Graphics);
        backend.cmd_bind_pipeline(cb, self.render);
        for (emitter, (_, live)) in self.batches.iter().enumerate() {
            let constants = self.constants(ctx, emitter);
            backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
            backend.cmd_draw(cb, 6, *live, 0, 0);
        }
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(hdr).rest_texture(depth);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for ParticlePass {
    fn name(&self) -> &'static str {
        "particles"
    }

    fn textures(&self) -> Vec<TextureId> {
        Vec::new()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![("particle_emitters", self.emitters.gpu_index(frame_index))]
    }

    fn on_resize(&mut self, _backend: &dyn GfxBackend, _width: u32, _height: u32) -> BackendResult<()> {
        Ok(())
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.render_buffers.destroy(backend);
        self.simulate_buffers.destroy(backend);
        self.emitters.destroy(backend);
    }
}
