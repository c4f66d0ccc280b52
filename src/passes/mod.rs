//! Render passes of the world renderer.
//!
//! Every pass follows the same two-phase contract:
//!
//! - `prepare` runs CPU work for a frame slot (culling, sorting, filling the
//!   slot's CPU-visible buffers) and records no GPU commands;
//! - `render` records the pass into its own per-slot command buffer, closes
//!   it and returns it without submitting.
//!
//! A pass with nothing to do still returns a closed (empty) command buffer so
//! the submission sequence never changes shape.
//!
//! Pass-owned textures rest in [`ResourceState::ShaderRead`]. A pass moves
//! what it writes into the state it needs through the
//! [`ResourceStateTracker`] and returns it to rest before closing.

pub mod bloom;
pub mod canvas;
pub mod engine_shaders;
pub mod forward;
pub mod lighting;
pub mod object_id;
pub mod opaque;
pub mod particles;
pub mod physics_debug;
pub mod post_combine;
pub mod pre_depth;
pub mod shadows;
pub mod ssao;

pub use bloom::BloomPass;
pub use canvas::CanvasPass;
pub use engine_shaders::EngineShaders;
pub use forward::ForwardPass;
pub use lighting::{GpuLight, LightingInputs, LightingPass};
pub use object_id::ObjectIdPass;
pub use opaque::OpaquePass;
pub use particles::ParticlePass;
pub use physics_debug::PhysicsDebugPass;
pub use post_combine::PostCombinePass;
pub use pre_depth::PreDepthPass;
pub use shadows::{ShadowData, ShadowPass};
pub use ssao::SsaoPass;

use bytemuck::{Pod, Zeroable};

use crate::error::BackendResult;
use crate::frame::{FrameBumpAllocator, PerFrame};
use crate::gfx::{
    BindGroupId, BindPoint, BufferDesc, BufferId, BufferUsage, CommandBufferId, GfxBackend,
    QueueType, ResourceState, TextureDesc, TextureFormat, TextureId, TextureUsage,
};
use crate::proxy::{ProxyManager, ShaderFlags};
use crate::scene::{CollectStats, DrawFilter, DrawStream, DrawStreamStats, InstanceData, RenderableCollector, View};
use crate::sync::ResourceStateTracker;

/// Bind group set of the global group.
pub const GLOBAL_SET: u32 = 0;

/// Bindless index meaning "no resource".
pub const NO_GPU_INDEX: u32 = u32::MAX;

/// Timing values of the frame being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    pub delta: f32,
    pub elapsed: f32,
}

/// Everything a pass needs while recording.
pub struct PassContext<'a> {
    pub backend: &'a dyn GfxBackend,
    pub proxies: &'a ProxyManager,
    pub view: &'a View,
    pub frame_index: usize,
    pub global_group: BindGroupId,
    pub tracker: &'a mut ResourceStateTracker,
    pub time: FrameTime,
}

impl PassContext<'_> {
    /// Bind the global group at set 0.
    pub fn bind_globals(&self, cb: CommandBufferId, point: BindPoint) {
        self.backend
            .cmd_bind_group(cb, point, GLOBAL_SET, self.global_group);
    }

    /// Record barriers queued in the tracker.
    pub fn flush_barriers(&mut self, cb: CommandBufferId) {
        self.tracker.record(self.backend, cb);
    }
}

/// Uniform surface of every pass, used by the world renderer for resize,
/// teardown and state tracking.
pub trait RenderPass {
    fn name(&self) -> &'static str;

    /// Textures owned by this pass. All of them rest in `ShaderRead`.
    fn textures(&self) -> Vec<TextureId>;

    /// Gpu-visible indices of the pass outputs for `frame_index`.
    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)>;

    /// Recreate size-dependent targets. New targets are created before the
    /// old ones are destroyed, so gpu indices are never reused.
    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()>;

    fn destroy(&mut self, backend: &dyn GfxBackend);
}

/// One command buffer per frame slot on a single queue.
#[derive(Debug)]
pub struct PassCommandBuffers {
    queue: QueueType,
    buffers: PerFrame<CommandBufferId>,
}

impl PassCommandBuffers {
    /// Labels are `label[slot]`.
    pub fn new(backend: &dyn GfxBackend, queue: QueueType, label: &str) -> BackendResult<Self> {
        let buffers = PerFrame::try_new(
            |slot| backend.create_command_buffer(queue, &format!("{label}[{slot}]")),
            |cb| backend.destroy_command_buffer(cb),
        )?;
        Ok(Self { queue, buffers })
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn get(&self, frame_index: usize) -> CommandBufferId {
        self.buffers[frame_index]
    }

    /// Open the slot's command buffer for recording.
    pub fn begin(&self, backend: &dyn GfxBackend, frame_index: usize) -> CommandBufferId {
        let cb = self.buffers[frame_index];
        backend.begin_commands(cb);
        cb
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        self.buffers
            .iter()
            .for_each(|cb| backend.destroy_command_buffer(*cb));
    }
}

/// A texture together with its bindless index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderTarget {
    pub texture: TextureId,
    pub gpu_index: u32,
}

/// How a per-slot target is sized and created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub label: &'static str,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    /// Resolution divisor: 1 for full, 2 for half resolution.
    pub divisor: u32,
    pub mip_levels: u32,
    /// Fixed size that ignores the window resolution.
    pub fixed_size: Option<(u32, u32)>,
}

impl TargetSpec {
    pub const fn new(label: &'static str, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label,
            format,
            usage,
            divisor: 1,
            mip_levels: 1,
            fixed_size: None,
        }
    }

    pub const fn half_resolution(mut self) -> Self {
        self.divisor = 2;
        self
    }

    pub const fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub const fn fixed(mut self, width: u32, height: u32) -> Self {
        self.fixed_size = Some((width, height));
        self
    }

    /// Extent for a window of `width` x `height`.
    pub fn extent(&self, width: u32, height: u32) -> (u32, u32) {
        self.fixed_size.unwrap_or((
            (width / self.divisor).max(1),
            (height / self.divisor).max(1),
        ))
    }
}

/// One target per frame slot, recreated on resize.
#[derive(Debug)]
pub struct SlotTargets {
    spec: TargetSpec,
    extent: (u32, u32),
    targets: PerFrame<RenderTarget>,
}

impl SlotTargets {
    pub fn new(
        backend: &dyn GfxBackend,
        spec: TargetSpec,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        let extent = spec.extent(width, height);
        let targets = Self::create(backend, &spec, extent)?;
        Ok(Self {
            spec,
            extent,
            targets,
        })
    }

    fn create(
        backend: &dyn GfxBackend,
        spec: &TargetSpec,
        (width, height): (u32, u32),
    ) -> BackendResult<PerFrame<RenderTarget>> {
        PerFrame::try_new(
            |slot| {
                let desc = TextureDesc::new_2d(
                    format!("{}[{slot}]", spec.label),
                    width,
                    height,
                    spec.format,
                    spec.usage,
                )
                .with_mips(spec.mip_levels)
                .with_initial_state(ResourceState::ShaderRead);
                let texture = backend.create_texture(&desc)?;
                Ok(RenderTarget {
                    texture,
                    gpu_index: backend.texture_gpu_index(texture),
                })
            },
            |target| backend.destroy_texture(target.texture),
        )
    }

    pub fn get(&self, frame_index: usize) -> RenderTarget {
        self.targets[frame_index]
    }

    pub fn extent(&self) -> (u32, u32) {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.spec.mip_levels
    }

    pub fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.targets.iter().map(|target| target.texture)
    }

    /// Recreate the targets for a new window size. Fixed-size targets are
    /// left alone.
    pub fn resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        if self.spec.fixed_size.is_some() {
            return Ok(());
        }
        let extent = self.spec.extent(width, height);
        let fresh = Self::create(backend, &self.spec, extent)?;
        let old = std::mem::replace(&mut self.targets, fresh);
        old.iter().for_each(|target| backend.destroy_texture(target.texture));
        self.extent = extent;
        log::debug!(
            "Recreated `{}` targets at {}x{}",
            self.spec.label,
            extent.0,
            extent.1
        );
        Ok(())
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        self.targets
            .iter()
            .for_each(|target| backend.destroy_texture(target.texture));
    }
}

/// A CPU-visible buffer per frame slot.
#[derive(Debug)]
pub struct SlotBuffers {
    buffers: PerFrame<BufferId>,
    indices: PerFrame<u32>,
    size: u64,
}

impl SlotBuffers {
    pub fn new(
        backend: &dyn GfxBackend,
        label: &str,
        size: u64,
        usage: BufferUsage,
    ) -> BackendResult<Self> {
        let buffers = PerFrame::try_new(
            |slot| {
                backend.create_buffer(&BufferDesc::new(
                    format!("{label}[{slot}]"),
                    size,
                    usage | BufferUsage::CPU_VISIBLE,
                ))
            },
            |buffer| backend.destroy_buffer(buffer),
        )?;
        let indices = buffers.map(|buffer| backend.buffer_gpu_index(*buffer));
        Ok(Self {
            buffers,
            indices,
            size,
        })
    }

    pub fn get(&self, frame_index: usize) -> BufferId {
        self.buffers[frame_index]
    }

    pub fn gpu_index(&self, frame_index: usize) -> u32 {
        self.indices[frame_index]
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Write `data` at the start of the slot's buffer.
    pub fn write(&self, backend: &dyn GfxBackend, frame_index: usize, data: &[u8]) {
        assert!(
            data.len() as u64 <= self.size,
            "{} bytes written into a {} byte slot buffer",
            data.len(),
            self.size
        );
        if !data.is_empty() {
            backend.write_buffer(self.buffers[frame_index], 0, data);
        }
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        self.buffers
            .iter()
            .for_each(|buffer| backend.destroy_buffer(*buffer));
    }
}

/// Push constants of every draw-stream pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DrawPushConstants {
    pub instance_buffer: u32,
    /// Shadow view index, or zero.
    pub view_index: u32,
    pub _pad: [u32; 2],
}

/// Culled, sorted draws of one pass together with their instance records.
#[derive(Debug)]
pub struct DrawList {
    filter: DrawFilter,
    variant: ShaderFlags,
    stream: DrawStream,
    arena: FrameBumpAllocator,
    instances: SlotBuffers,
}

impl DrawList {
    pub fn new(
        backend: &dyn GfxBackend,
        label: &'static str,
        filter: DrawFilter,
        variant: ShaderFlags,
        max_draws: usize,
        arena_size: u64,
    ) -> BackendResult<Self> {
        let bytes = arena_size.max(std::mem::size_of::<InstanceData>() as u64);
        Ok(Self {
            filter,
            variant,
            stream: DrawStream::new(label, max_draws),
            arena: FrameBumpAllocator::new(label, bytes),
            instances: SlotBuffers::new(backend, label, bytes, BufferUsage::STORAGE)?,
        })
    }

    /// Collect, sort and upload this frame's draws.
    pub fn prepare(
        &mut self,
        backend: &dyn GfxBackend,
        proxies: &ProxyManager,
        view: &View,
        frame_index: usize,
    ) -> CollectStats {
        self.stream.clear();
        self.arena.reset();
        let stats = RenderableCollector::collect(
            proxies,
            view,
            self.filter,
            self.variant,
            frame_index,
            &mut self.stream,
            &mut self.arena,
        );
        self.stream.sort();
        self.arena.flush(backend, self.instances.get(frame_index));
        stats
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stream.len()
    }

    pub fn stream(&self) -> &DrawStream {
        &self.stream
    }

    /// Push the instance buffer index and record every draw.
    pub fn record(
        &self,
        backend: &dyn GfxBackend,
        cb: CommandBufferId,
        frame_index: usize,
        view_index: u32,
    ) -> DrawStreamStats {
        if self.stream.is_empty() {
            return DrawStreamStats::default();
        }
        let constants = DrawPushConstants {
            instance_buffer: self.instances.gpu_index(frame_index),
            view_index,
            _pad: [0; 2],
        };
        backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
        self.stream.record(backend, cb)
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        self.instances.destroy(backend);
    }
}

/// Dispatch group count covering `size` items with groups of `group`.
#[inline]
pub fn group_count(size: u32, group: u32) -> u32 {
    size.div_ceil(group).max(1)
}
