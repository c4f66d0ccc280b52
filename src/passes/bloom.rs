//! Bloom on the compute queue.
//!
//! A bright-pass threshold writes the HDR target into mip 0 of a half
//! resolution chain, each following mip is downsampled from the previous one,
//! then the chain is walked back up accumulating into mip 0, which post
//! combine samples.

use bytemuck::{Pod, Zeroable};

use super::{
    EngineShaders, PassCommandBuffers, PassContext, RenderPass, SlotTargets, TargetSpec,
    group_count,
};
use crate::config::{RendererConfig, formats};
use crate::error::BackendResult;
use crate::gfx::{
    Barrier, BindPoint, CommandBufferId, GfxBackend, PipelineId, QueueType, ResourceState,
    TextureId, TextureUsage,
};

const GROUP_SIZE: u32 = 8;

/// Luminance above which pixels bloom.
const BLOOM_THRESHOLD: f32 = 1.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BloomConstants {
    input: u32,
    output: u32,
    input_mip: u32,
    output_mip: u32,
    width: u32,
    height: u32,
    threshold: f32,
    _pad: u32,
}

pub struct BloomPass {
    threshold: PipelineId,
    downsample: PipelineId,
    upsample: PipelineId,
    chain: SlotTargets,
    command_buffers: PassCommandBuffers,
}

impl BloomPass {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let spec = TargetSpec::new(
            "bloom",
            formats::BLOOM,
            TextureUsage::STORAGE | TextureUsage::SAMPLED,
        )
        .half_resolution()
        .with_mips(config.bloom_mip_count.max(1));
        let chain = SlotTargets::new(backend, spec, width, height)?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Compute, "bloom")
            .inspect_err(|_| chain.destroy(backend))?;
        Ok(Self {
            threshold: shaders.bloom_threshold,
            downsample: shaders.bloom_downsample,
            upsample: shaders.bloom_upsample,
            chain,
            command_buffers,
        })
    }

    pub fn output(&self, frame_index: usize) -> TextureId {
        self.chain.get(frame_index).texture
    }

    pub fn output_index(&self, frame_index: usize) -> u32 {
        self.chain.get(frame_index).gpu_index
    }

    fn mip_extent(&self, mip: u32) -> (u32, u32) {
        let (width, height) = self.chain.extent();
        ((width >> mip).max(1), (height >> mip).max(1))
    }

    /// Dispatches in recording order as `(input_mip, output_mip)`; the
    /// threshold dispatch reads the HDR target and is listed as `(None, 0)`.
    pub fn schedule(&self) -> Vec<(Option<u32>, u32)> {
        let mips = self.chain.mip_levels();
        std::iter::once((None, 0))
            .chain((1..mips).map(|mip| (Some(mip - 1), mip)))
            .chain((0..mips.saturating_sub(1)).rev().map(|mip| (Some(mip + 1), mip)))
            .collect()
    }

    /// Record the bloom chain from the HDR target at bindless index `hdr`.
    pub fn render(&self, ctx: &mut PassContext<'_>, hdr: u32) -> CommandBufferId {
        crate::profile_scope!("bloom::render");
        let backend = ctx.backend;
        let frame_index = ctx.frame_index;
        let cb = self.command_buffers.begin(backend, frame_index);
        let chain = self.chain.get(frame_index);
        let mips = self.chain.mip_levels();

        ctx.bind_globals(cb, BindPoint::Compute);
        ctx.tracker.texture(chain.texture, ResourceState::UnorderedAccess);
        ctx.flush_barriers(cb);

        for (step, (input_mip, output_mip)) in self.schedule().into_iter().enumerate() {
            let pipeline = match input_mip {
                None => self.threshold,
                Some(input) if input < output_mip => self.downsample,
                Some(_) => self.upsample,
            };
            if step > 0 {
                // Each step reads the mip the previous one wrote.
                backend.cmd_barrier(
                    cb,
                    &[Barrier::texture(
                        chain.texture,
                        ResourceState::UnorderedAccess,
                        ResourceState::UnorderedAccess,
                    )],
                );
            }
            let (width, height) = self.mip_extent(output_mip);
            backend.cmd_bind_pipeline(cb, pipeline);
            let constants = BloomConstants {
                input: if input_mip.is_some() { chain.gpu_index } else { hdr },
                output: chain.gpu_index,
                input_mip: input_mip.unwrap_or(0),
                output_mip,
                width,
                height,
                threshold: BLOOM_THRESHOLD,
                _pad: 0,
            };
            backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
            backend.cmd_dispatch(cb, group_count(width, GROUP_SIZE), group_count(height, GROUP_SIZE), 1);
        }
        log::trace!("bloom: {} dispatches over {mips} mips", self.schedule().len());

        ctx.tracker.rest_texture(chain.texture);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for BloomPass {
    fn name(&self) -> &'static str {
        "bloom"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.chain.textures().collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![("bloom", self.output_index(frame_index))]
    }

    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        self.chain.resize(backend, width, height)
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.chain.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{BindLayoutDesc, DummyBackend};

    #[test]
    fn test_schedule_walks_down_then_up() {
        let backend = DummyBackend::new();
        let layout = backend.create_bind_layout(&BindLayoutDesc::default()).unwrap();
        let shaders = EngineShaders::new(&backend, layout).unwrap();
        let config = RendererConfig::default().with_bloom_mip_count(4);
        let mut pass = BloomPass::new(&backend, &config, &shaders).unwrap();
        assert_eq!(
            pass.schedule(),
            vec![
                (None, 0),
                (Some(0), 1),
                (Some(1), 2),
                (Some(2), 3),
                (Some(3), 2),
                (Some(2), 1),
                (Some(1), 0),
            ]
        );
        pass.destroy(&backend);
        shaders.destroy(&backend);
    }
}
