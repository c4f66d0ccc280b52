//! Graphics backend abstraction.
//!
//! The renderer never talks to a graphics API directly. Every component
//! receives an `Arc<dyn GfxBackend>` at construction and issues resource,
//! command and queue operations through it.
//!
//! # Contract
//!
//! The backend is a black box. Only the call contract matters:
//!
//! - Resources are created with a descriptor and destroyed explicitly. The
//!   caller guarantees no in-flight command buffer still references a resource
//!   when it is destroyed (see [`crate::proxy::DestroyBuckets`]).
//! - Textures and buffers expose a GPU-visible index for bindless access.
//!   Indices are never reused while the backend lives.
//! - Command buffers are recorded between [`GfxBackend::begin_commands`] and
//!   [`GfxBackend::end_commands`] and may only be submitted once closed.
//! - Queue ordering is expressed with timeline semaphores. Every signal on a
//!   semaphore carries a value strictly greater than the previous one.
//!
//! ```text
//! Transfer   ──copy──▶ signal(copy, n)
//!                         │
//! Graphics   wait(copy) ──┴─ depth/shadow/opaque ─▶ signal(ssao, v0)
//!                                                        │
//! Compute                      wait(ssao, v0) ── SSAO ───┴─▶ signal(ssao, v1)
//! ```

pub mod dummy;
pub mod handles;
pub mod types;

pub use dummy::{CommandRecord, DummyBackend, DummyCall};
pub use handles::{
    BindGroupId, BindLayoutId, BufferId, CommandBufferId, PipelineId, SamplerId, SemaphoreId,
    SwapchainId, TextureId,
};
pub use types::*;

use crate::error::BackendResult;

/// Opaque graphics backend consumed by the renderer.
///
/// Implementations must be usable from the render thread while the main
/// thread holds another reference, hence `Send + Sync` and `&self` receivers.
pub trait GfxBackend: Send + Sync {
    /// Human readable backend name.
    fn name(&self) -> &'static str;

    // === Resources ===

    /// Create a texture.
    fn create_texture(&self, desc: &TextureDesc) -> BackendResult<TextureId>;

    /// Destroy a texture. The handle must be live.
    fn destroy_texture(&self, texture: TextureId);

    /// Bindless index of a texture.
    fn texture_gpu_index(&self, texture: TextureId) -> u32;

    /// Create a buffer.
    fn create_buffer(&self, desc: &BufferDesc) -> BackendResult<BufferId>;

    /// Destroy a buffer. The handle must be live.
    fn destroy_buffer(&self, buffer: BufferId);

    /// Bindless index of a buffer.
    fn buffer_gpu_index(&self, buffer: BufferId) -> u32;

    /// Write into a CPU-visible buffer.
    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]);

    /// Read back from a CPU-readable buffer.
    fn read_buffer(&self, buffer: BufferId, offset: u64, len: usize) -> Vec<u8>;

    /// Create a sampler.
    fn create_sampler(&self, desc: &SamplerDesc) -> BackendResult<SamplerId>;

    /// Destroy a sampler.
    fn destroy_sampler(&self, sampler: SamplerId);

    /// Bindless index of a sampler.
    fn sampler_gpu_index(&self, sampler: SamplerId) -> u32;

    /// Create a bind layout.
    fn create_bind_layout(&self, desc: &BindLayoutDesc) -> BackendResult<BindLayoutId>;

    /// Destroy a bind layout.
    fn destroy_bind_layout(&self, layout: BindLayoutId);

    /// Create a bind group.
    fn create_bind_group(&self, desc: &BindGroupDesc) -> BackendResult<BindGroupId>;

    /// Re-point entries of an existing bind group.
    ///
    /// The group must not be in use by an in-flight command buffer.
    fn update_bind_group(&self, group: BindGroupId, entries: &[(u32, BindEntry)]);

    /// Destroy a bind group.
    fn destroy_bind_group(&self, group: BindGroupId);

    /// Create a graphics or compute pipeline.
    fn create_pipeline(&self, desc: &PipelineDesc) -> BackendResult<PipelineId>;

    /// Destroy a pipeline.
    fn destroy_pipeline(&self, pipeline: PipelineId);

    // === Command recording ===

    /// Create a command buffer for `queue`.
    fn create_command_buffer(&self, queue: QueueType, label: &str)
    -> BackendResult<CommandBufferId>;

    /// Destroy a command buffer.
    fn destroy_command_buffer(&self, cb: CommandBufferId);

    /// Reset and open a command buffer for recording.
    fn begin_commands(&self, cb: CommandBufferId);

    /// Close a command buffer so it can be submitted.
    fn end_commands(&self, cb: CommandBufferId);

    /// Record resource state transitions.
    fn cmd_barrier(&self, cb: CommandBufferId, barriers: &[Barrier]);

    fn cmd_begin_render_pass(&self, cb: CommandBufferId, desc: &RenderPassDesc);

    fn cmd_end_render_pass(&self, cb: CommandBufferId);

    fn cmd_bind_pipeline(&self, cb: CommandBufferId, pipeline: PipelineId);

    fn cmd_bind_group(&self, cb: CommandBufferId, point: BindPoint, set: u32, group: BindGroupId);

    fn cmd_bind_vertex_buffer(&self, cb: CommandBufferId, buffer: BufferId, offset: u64);

    fn cmd_bind_index_buffer(
        &self,
        cb: CommandBufferId,
        buffer: BufferId,
        offset: u64,
        format: IndexFormat,
    );

    fn cmd_push_constants(&self, cb: CommandBufferId, data: &[u8]);

    fn cmd_set_viewport(&self, cb: CommandBufferId, viewport: &Viewport);

    fn cmd_draw(
        &self,
        cb: CommandBufferId,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    fn cmd_draw_indexed(
        &self,
        cb: CommandBufferId,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    );

    fn cmd_dispatch(&self, cb: CommandBufferId, x: u32, y: u32, z: u32);

    fn cmd_copy_buffer(
        &self,
        cb: CommandBufferId,
        src: BufferId,
        dst: BufferId,
        regions: &[BufferCopy],
    );

    fn cmd_copy_buffer_to_texture(
        &self,
        cb: CommandBufferId,
        src: BufferId,
        dst: TextureId,
        regions: &[BufferTextureCopy],
    );

    fn cmd_copy_texture_to_buffer(
        &self,
        cb: CommandBufferId,
        src: TextureId,
        dst: BufferId,
        regions: &[BufferTextureCopy],
    );

    // === Queues and synchronization ===

    /// Create a timeline semaphore starting at `initial`.
    fn create_semaphore(&self, initial: u64) -> BackendResult<SemaphoreId>;

    fn destroy_semaphore(&self, semaphore: SemaphoreId);

    /// Submit closed command buffers to `queue`, executed in slice order.
    fn submit_commands(&self, queue: QueueType, command_buffers: &[CommandBufferId]);

    /// Make `queue`'s next submission wait until `semaphore` reaches `value`.
    fn queue_wait(&self, queue: QueueType, semaphore: SemaphoreId, value: u64);

    /// Signal `semaphore` to `value` once `queue`'s prior work completes.
    fn queue_signal(&self, queue: QueueType, semaphore: SemaphoreId, value: u64);

    /// Block the calling thread until `semaphore` reaches `value`.
    fn wait_semaphore(&self, semaphore: SemaphoreId, value: u64);

    /// Current completed value of a semaphore.
    fn semaphore_value(&self, semaphore: SemaphoreId) -> u64;

    // === Swapchain ===

    fn create_swapchain(&self, desc: &SwapchainDesc) -> BackendResult<SwapchainId>;

    fn resize_swapchain(&self, swapchain: SwapchainId, width: u32, height: u32)
    -> BackendResult<()>;

    fn destroy_swapchain(&self, swapchain: SwapchainId);

    /// Images owned by the swapchain, indexed by image index.
    fn swapchain_images(&self, swapchain: SwapchainId) -> Vec<TextureId>;

    /// Index of the image to render into next.
    fn acquire_image(&self, swapchain: SwapchainId) -> u32;

    /// Block until the swapchain's frame-latency object allows a new frame.
    fn wait_swapchain_latency(&self, swapchain: SwapchainId);

    fn present(&self, swapchain: SwapchainId, image_index: u32);

    /// Block until every queue is idle.
    fn wait_idle(&self);
}
