//! Screen-space ambient occlusion on the compute queue.
//!
//! Occlusion is computed at half resolution from depth and GBuffer normals,
//! then upsampled into a full resolution target the lighting pass samples.
//! With SSAO disabled the command buffer is closed empty and the lighting pass
//! receives `NO_GPU_INDEX` instead of the occlusion target.

use bytemuck::{Pod, Zeroable};

use super::{
    EngineShaders, NO_GPU_INDEX, PassCommandBuffers, PassContext, RenderPass, SlotTargets, TargetSpec,
    group_count,
};
use crate::config::{RendererConfig, formats};
use crate::error::BackendResult;
use crate::gfx::{
    BindPoint, CommandBufferId, GfxBackend, PipelineId, QueueType, ResourceState, TextureId,
    TextureUsage,
};

const GROUP_SIZE: u32 = 8;

const AO_USAGE: TextureUsage = TextureUsage::STORAGE.union(TextureUsage::SAMPLED);
const HALF_AO: TargetSpec = TargetSpec::new("ssao_half", formats::AMBIENT_OCCLUSION, AO_USAGE).half_resolution();
const FULL_AO: TargetSpec = TargetSpec::new("ssao", formats::AMBIENT_OCCLUSION, AO_USAGE);

/// Sample radius in view space.
const SSAO_RADIUS: f32 = 0.5;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SsaoConstants {
    depth: u32,
    normal: u32,
    input: u32,
    output: u32,
    width: u32,
    height: u32,
    radius: f32,
    _pad: u32,
}

pub struct SsaoPass {
    enabled: bool,
    ssao: PipelineId,
    upsample: PipelineId,
    half: SlotTargets,
    full: SlotTargets,
    command_buffers: PassCommandBuffers,
}

impl SsaoPass {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let half = SlotTargets::new(backend, HALF_AO, width, height)?;
        let full = SlotTargets::new(backend, FULL_AO, width, height)
            .inspect_err(|_| half.destroy(backend))?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Compute, "ssao")
            .inspect_err(|_| {
                full.destroy(backend);
                half.destroy(backend);
            })?;
        Ok(Self {
            enabled: config.ssao_enabled,
            ssao: shaders.ssao,
            upsample: shaders.ssao_upsample,
            half,
            full,
            command_buffers,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Full resolution occlusion of `frame_index`.
    pub fn output(&self, frame_index: usize) -> TextureId {
        self.full.get(frame_index).texture
    }

    /// Bindless index of the occlusion target, or `NO_GPU_INDEX` when
    /// disabled.
    pub fn output_index(&self, frame_index: usize) -> u32 {
        if self.enabled {
            self.full.get(frame_index).gpu_index
        } else {
            NO_GPU_INDEX
        }
    }

    /// Record the occlusion dispatches. `depth` and `normal` are bindless
    /// indices of the slot's depth and GBuffer normal targets.
    pub fn render(&self, ctx: &mut PassContext<'_>, depth: u32, normal: u32) -> CommandBufferId {
        crate::profile_scope!("ssao::render");
        let backend = ctx.backend;
        let frame_index = ctx.frame_index;
        let cb = self.command_buffers.begin(backend, frame_index);
        let half = self.half.get(frame_index);
        let full = self.full.get(frame_index);
        let (full_width, full_height) = self.full.extent();

        if !self.enabled {
            backend.end_commands(cb);
            return cb;
        }

        let (width, height) = self.half.extent();
        ctx.bind_globals(cb, BindPoint::Compute);
        ctx.tracker.texture(half.texture, ResourceState::UnorderedAccess);
        ctx.flush_barriers(cb);
        backend.cmd_bind_pipeline(cb, self.ssao);
        let constants = SsaoConstants {
            depth,
            normal,
            input: depth,
            output: half.gpu_index,
            width,
            height,
            radius: SSAO_RADIUS,
            _pad: 0,
        };
        backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
        backend.cmd_dispatch(cb, group_count(width, GROUP_SIZE), group_count(height, GROUP_SIZE), 1);

        // The upsample reads the half resolution result.
        ctx.tracker
            .rest_texture(half.texture)
            .texture(full.texture, ResourceState::UnorderedAccess);
        ctx.flush_barriers(cb);
        backend.cmd_bind_pipeline(cb, self.upsample);
        let constants = SsaoConstants {
            input: half.gpu_index,
            output: full.gpu_index,
            width: full_width,
            height: full_height,
            ..constants
        };
        backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
        backend.cmd_dispatch(
            cb,
            group_count(full_width, GROUP_SIZE),
            group_count(full_height, GROUP_SIZE),
            1,
        );
        ctx.tracker.rest_texture(full.texture);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for SsaoPass {
    fn name(&self) -> &'static str {
        "ssao"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.half.textures().chain(self.full.textures()).collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![("ssao", self.full.get(frame_index).gpu_index)]
    }

    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        self.half.resize(backend, width, height)?;
        self.full.resize(backend, width, height)
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.full.destroy(backend);
        self.half.destroy(backend);
    }
}
