//! Physics debug lines.
//!
//! The line list from the latest `SetPhysicsDebugLines` event is expanded
//! into a vertex buffer and drawn into the debug target, depth tested
//! against the scene without writing depth. The target is cleared every
//! frame, so an empty list leaves it transparent.

use bytemuck::{Pod, Zeroable};

use super::{
    EngineShaders, PassCommandBuffers, PassContext, RenderPass, SlotBuffers, SlotTargets,
    TargetSpec,
};
use crate::config::{RendererConfig, formats};
use crate::error::BackendResult;
use crate::events::DebugLine;
use crate::gfx::{
    BindPoint, BufferUsage, ColorAttachment, CommandBufferId, DepthAttachment, GfxBackend,
    PipelineId, QueueType, RenderPassDesc, ResourceState, TextureId, TextureUsage, Viewport,
};
use crate::proxy::ProxyManager;

/// Lines the per-slot vertex buffer holds.
pub const MAX_DEBUG_LINES: usize = 65536;

const DEBUG: TargetSpec = TargetSpec::new(
    "physics_debug",
    formats::LDR,
    TextureUsage::RENDER_TARGET.union(TextureUsage::SAMPLED),
);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct LineVertex {
    position: [f32; 3],
    color: u32,
}

pub struct PhysicsDebugPass {
    pipeline: PipelineId,
    target: SlotTargets,
    vertices: SlotBuffers,
    line_count: usize,
    command_buffers: PassCommandBuffers,
}

impl PhysicsDebugPass {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let target = SlotTargets::new(backend, DEBUG, width, height)?;
        let vertices = SlotBuffers::new(
            backend,
            "physics debug vertices",
            (MAX_DEBUG_LINES * 2 * std::mem::size_of::<LineVertex>()) as u64,
            BufferUsage::VERTEX,
        )
        .inspect_err(|_| target.destroy(backend))?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "physics_debug")
            .inspect_err(|_| {
                vertices.destroy(backend);
                target.destroy(backend);
            })?;
        Ok(Self {
            pipeline: shaders.physics_debug,
            target,
            vertices,
            line_count: 0,
            command_buffers,
        })
    }

    pub fn output(&self, frame_index: usize) -> TextureId {
        self.target.get(frame_index).texture
    }

    pub fn output_index(&self, frame_index: usize) -> u32 {
        self.target.get(frame_index).gpu_index
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn prepare(&mut self, backend: &dyn GfxBackend, proxies: &ProxyManager, frame_index: usize) {
        crate::profile_scope!("physics_debug::prepare");
        let lines = proxies.debug_lines();
        assert!(
            lines.len() <= MAX_DEBUG_LINES,
            "{} physics debug lines exceed the limit of {MAX_DEBUG_LINES}",
            lines.len()
        );
        let vertices: Vec<LineVertex> = lines.iter().flat_map(line_vertices).collect();
        self.vertices
            .write(backend, frame_index, bytemuck::cast_slice(&vertices));
        self.line_count = lines.len();
    }

    pub fn render(&self, ctx: &mut PassContext<'_>, depth: TextureId) -> CommandBufferId {
        crate::profile_scope!("physics_debug::render");
        let backend = ctx.backend;
        let frame_index = ctx.frame_index;
        let cb = self.command_buffers.begin(backend, frame_index);
        let target = self.output(frame_index);

        ctx.tracker
            .texture(target, ResourceState::RenderTarget)
            .texture(depth, ResourceState::DepthRead);
        ctx.flush_barriers(cb);
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "physics_debug",
                color: vec![ColorAttachment::clear(target, [0.0; 4])],
                depth: Some(DepthAttachment::read_only(depth)),
            },
        );
        if self.line_count > 0 {
            let (width, height) = self.target.extent();
            backend.cmd_set_viewport(cb, &Viewport::from_dimensions(width, height));
            ctx.bind_globals(cb, BindPoint::Graphics);
            backend.cmd_bind_pipeline(cb, self.pipeline);
            backend.cmd_bind_vertex_buffer(cb, self.vertices.get(frame_index), 0);
            backend.cmd_draw(cb, (self.line_count * 2) as u32, 1, 0, 0);
        }
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(target).rest_texture(depth);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

fn line_vertices(line: &DebugLine) -> [LineVertex; 2] {
    [
        LineVertex {
            position: line.start,
            color: line.color,
        },
        LineVertex {
            position: line.end,
            color: line.color,
        },
    ]
}

impl RenderPass for PhysicsDebugPass {
    fn name(&self) -> &'static str {
        "physics_debug"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.target.textures().collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![("physics_debug", self.output_index(frame_index))]
    }

    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        self.target.resize(backend, width, height)
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.vertices.destroy(backend);
        self.target.destroy(backend);
    }
}
