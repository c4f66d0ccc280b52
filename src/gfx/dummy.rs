//! Recording backend for tests and headless runs.
//!
//! [`DummyBackend`] performs no GPU work. Submitted work "completes" the moment
//! it is submitted, so semaphore values advance as soon as they are signaled.
//! Every state-changing call is appended to an ordered log that tests inspect,
//! and the backend contract is enforced with panics:
//!
//! - destroying or querying an unknown handle panics,
//! - submitting a command buffer that is still open panics,
//! - signaling a semaphore with a value that is not strictly greater than its
//!   current value panics,
//! - waiting (on a queue or on the CPU) for a value that was never signaled
//!   panics, since on real hardware it would hang forever.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::handles::*;
use super::types::*;
use super::GfxBackend;
use crate::error::{BackendError, BackendResult};

/// One recorded backend call, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum DummyCall {
    CreateTexture {
        texture: TextureId,
        gpu_index: u32,
        label: String,
    },
    DestroyTexture(TextureId),
    CreateBuffer {
        buffer: BufferId,
        gpu_index: u32,
        label: String,
    },
    DestroyBuffer(BufferId),
    WriteBuffer {
        buffer: BufferId,
        offset: u64,
        len: usize,
    },
    DestroySampler(SamplerId),
    UpdateBindGroup {
        group: BindGroupId,
        entries: Vec<(u32, BindEntry)>,
    },
    DestroyBindGroup(BindGroupId),
    CreatePipeline {
        pipeline: PipelineId,
        label: String,
    },
    DestroyPipeline(PipelineId),
    Submit {
        queue: QueueType,
        command_buffers: Vec<CommandBufferId>,
    },
    QueueWait {
        queue: QueueType,
        semaphore: SemaphoreId,
        value: u64,
    },
    QueueSignal {
        queue: QueueType,
        semaphore: SemaphoreId,
        value: u64,
    },
    CpuWait {
        semaphore: SemaphoreId,
        value: u64,
    },
    Present {
        swapchain: SwapchainId,
        image_index: u32,
    },
    WaitIdle,
}

/// One command recorded into a command buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandRecord {
    Barrier(Vec<Barrier>),
    BeginRenderPass(RenderPassDesc),
    EndRenderPass,
    BindPipeline(PipelineId),
    BindGroup {
        point: BindPoint,
        set: u32,
        group: BindGroupId,
    },
    BindVertexBuffer(BufferId),
    BindIndexBuffer(BufferId),
    PushConstants(Vec<u8>),
    SetViewport(Viewport),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyBuffer {
        src: BufferId,
        dst: BufferId,
        regions: Vec<BufferCopy>,
    },
    CopyBufferToTexture {
        src: BufferId,
        dst: TextureId,
        regions: Vec<BufferTextureCopy>,
    },
    CopyTextureToBuffer {
        src: TextureId,
        dst: BufferId,
        regions: Vec<BufferTextureCopy>,
    },
}

impl CommandRecord {
    /// Whether this command draws or dispatches work.
    pub fn is_work(&self) -> bool {
        matches!(
            self,
            Self::Draw { .. } | Self::DrawIndexed { .. } | Self::Dispatch { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingState {
    Initial,
    Recording,
    Closed,
}

#[derive(Debug)]
struct TextureInfo {
    desc: TextureDesc,
    gpu_index: u32,
}

#[derive(Debug)]
struct BufferInfo {
    desc: BufferDesc,
    gpu_index: u32,
    data: Vec<u8>,
}

#[derive(Debug)]
struct CommandBufferInfo {
    queue: QueueType,
    label: String,
    state: RecordingState,
    commands: Vec<CommandRecord>,
}

#[derive(Debug)]
struct SwapchainInfo {
    desc: SwapchainDesc,
    images: Vec<TextureId>,
    next_image: u32,
}

#[derive(Debug, Default)]
struct DummyState {
    next_handle: u64,
    next_texture_index: u32,
    next_buffer_index: u32,
    next_sampler_index: u32,
    textures: HashMap<TextureId, TextureInfo>,
    buffers: HashMap<BufferId, BufferInfo>,
    samplers: HashMap<SamplerId, u32>,
    layouts: HashSet<BindLayoutId>,
    bind_groups: HashMap<BindGroupId, Vec<(u32, BindEntry)>>,
    pipelines: HashMap<PipelineId, String>,
    command_buffers: HashMap<CommandBufferId, CommandBufferInfo>,
    semaphores: HashMap<SemaphoreId, u64>,
    swapchains: HashMap<SwapchainId, SwapchainInfo>,
    calls: Vec<DummyCall>,
    log_disabled: bool,
    failing_pipelines: HashSet<String>,
    fail_swapchain: bool,
}

impl DummyState {
    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn log(&mut self, call: DummyCall) {
        if !self.log_disabled {
            self.calls.push(call);
        }
    }

    fn alloc_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let texture = TextureId::from_raw(self.next_raw());
        let gpu_index = self.next_texture_index;
        self.next_texture_index += 1;
        self.textures.insert(
            texture,
            TextureInfo {
                desc: desc.clone(),
                gpu_index,
            },
        );
        self.log(DummyCall::CreateTexture {
            texture,
            gpu_index,
            label: desc.label.clone(),
        });
        texture
    }

    fn remove_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            panic!("DummyBackend: destroying unknown texture {texture:?}");
        }
        self.log(DummyCall::DestroyTexture(texture));
    }

    fn recording(&mut self, cb: CommandBufferId) -> &mut CommandBufferInfo {
        let info = self
            .command_buffers
            .get_mut(&cb)
            .unwrap_or_else(|| panic!("DummyBackend: unknown command buffer {cb:?}"));
        assert!(
            info.state == RecordingState::Recording,
            "DummyBackend: command buffer `{}` is not recording",
            info.label
        );
        info
    }

    fn push(&mut self, cb: CommandBufferId, command: CommandRecord) {
        self.recording(cb).commands.push(command);
    }

    fn swapchain_images(&mut self, desc: &SwapchainDesc) -> Vec<TextureId> {
        (0..desc.image_count)
            .map(|i| {
                let image = TextureDesc::new_2d(
                    format!("swapchain image {i}"),
                    desc.width,
                    desc.height,
                    desc.format,
                    TextureUsage::RENDER_TARGET,
                )
                .with_initial_state(ResourceState::Present);
                self.alloc_texture(&image)
            })
            .collect()
    }
}

/// Recording, contract-checking backend without a GPU.
#[derive(Debug, Default)]
pub struct DummyBackend {
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the call log. Long headless runs turn it off.
    pub fn set_call_log(&self, enabled: bool) {
        self.state.lock().log_disabled = !enabled;
    }

    /// Make `create_pipeline` fail for pipelines with this label.
    pub fn fail_pipeline(&self, label: impl Into<String>) {
        self.state.lock().failing_pipelines.insert(label.into());
    }

    /// Make the next `create_swapchain` fail.
    pub fn fail_swapchain_creation(&self) {
        self.state.lock().fail_swapchain = true;
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<DummyCall> {
        self.state.lock().calls.clone()
    }

    /// Drain the call log.
    pub fn take_calls(&self) -> Vec<DummyCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    /// Commands recorded into `cb` since its last `begin_commands`.
    pub fn commands(&self, cb: CommandBufferId) -> Vec<CommandRecord> {
        self.state
            .lock()
            .command_buffers
            .get(&cb)
            .map(|info| info.commands.clone())
            .unwrap_or_default()
    }

    /// Label and queue of a command buffer.
    pub fn command_buffer_info(&self, cb: CommandBufferId) -> Option<(String, QueueType)> {
        self.state
            .lock()
            .command_buffers
            .get(&cb)
            .map(|info| (info.label.clone(), info.queue))
    }

    /// Live command buffers whose label starts with `prefix`, in creation order.
    pub fn command_buffers_labeled(&self, prefix: &str) -> Vec<CommandBufferId> {
        let state = self.state.lock();
        let mut found: Vec<_> = state
            .command_buffers
            .iter()
            .filter(|(_, info)| info.label.starts_with(prefix))
            .map(|(cb, _)| *cb)
            .collect();
        found.sort();
        found
    }

    pub fn is_texture_live(&self, texture: TextureId) -> bool {
        self.state.lock().textures.contains_key(&texture)
    }

    pub fn is_buffer_live(&self, buffer: BufferId) -> bool {
        self.state.lock().buffers.contains_key(&buffer)
    }

    /// Descriptor a live texture was created with.
    pub fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc> {
        self.state
            .lock()
            .textures
            .get(&texture)
            .map(|info| info.desc.clone())
    }

    /// Number of live textures, buffers, samplers, layouts, bind groups,
    /// pipelines, command buffers, semaphores and swapchains.
    pub fn live_object_count(&self) -> usize {
        let state = self.state.lock();
        state.textures.len()
            + state.buffers.len()
            + state.samplers.len()
            + state.layouts.len()
            + state.bind_groups.len()
            + state.pipelines.len()
            + state.command_buffers.len()
            + state.semaphores.len()
            + state.swapchains.len()
    }
}

impl GfxBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_texture(&self, desc: &TextureDesc) -> BackendResult<TextureId> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {} mips, {} layers)",
            desc.label,
            desc.width,
            desc.height,
            desc.mip_levels,
            desc.array_layers
        );
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 || desc.array_layers == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "`{}` has a zero dimension",
                desc.label
            )));
        }
        Ok(self.state.lock().alloc_texture(desc))
    }

    fn destroy_texture(&self, texture: TextureId) {
        self.state.lock().remove_texture(texture);
    }

    fn texture_gpu_index(&self, texture: TextureId) -> u32 {
        self.state
            .lock()
            .textures
            .get(&texture)
            .map(|info| info.gpu_index)
            .unwrap_or_else(|| panic!("DummyBackend: unknown texture {texture:?}"))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> BackendResult<BufferId> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        if desc.size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "`{}` has zero size",
                desc.label
            )));
        }
        let mut state = self.state.lock();
        let buffer = BufferId::from_raw(state.next_raw());
        let gpu_index = state.next_buffer_index;
        state.next_buffer_index += 1;
        state.buffers.insert(
            buffer,
            BufferInfo {
                desc: desc.clone(),
                gpu_index,
                data: Vec::new(),
            },
        );
        state.log(DummyCall::CreateBuffer {
            buffer,
            gpu_index,
            label: desc.label.clone(),
        });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer).is_none() {
            panic!("DummyBackend: destroying unknown buffer {buffer:?}");
        }
        state.log(DummyCall::DestroyBuffer(buffer));
    }

    fn buffer_gpu_index(&self, buffer: BufferId) -> u32 {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .map(|info| info.gpu_index)
            .unwrap_or_else(|| panic!("DummyBackend: unknown buffer {buffer:?}"))
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) {
        let mut state = self.state.lock();
        let info = state
            .buffers
            .get_mut(&buffer)
            .unwrap_or_else(|| panic!("DummyBackend: writing unknown buffer {buffer:?}"));
        assert!(
            info.desc.usage.contains(BufferUsage::CPU_VISIBLE),
            "DummyBackend: buffer `{}` is not CPU visible",
            info.desc.label
        );
        let end = offset + data.len() as u64;
        assert!(
            end <= info.desc.size,
            "DummyBackend: write of {} bytes at {} overflows buffer `{}` ({} bytes)",
            data.len(),
            offset,
            info.desc.label,
            info.desc.size
        );
        let (start, end) = (offset as usize, end as usize);
        if info.data.len() < end {
            info.data.resize(end, 0);
        }
        info.data[start..end].copy_from_slice(data);
        state.log(DummyCall::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn read_buffer(&self, buffer: BufferId, offset: u64, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        let info = state
            .buffers
            .get(&buffer)
            .unwrap_or_else(|| panic!("DummyBackend: reading unknown buffer {buffer:?}"));
        assert!(
            info.desc
                .usage
                .intersects(BufferUsage::CPU_VISIBLE | BufferUsage::READBACK),
            "DummyBackend: buffer `{}` is not CPU readable",
            info.desc.label
        );
        let start = offset as usize;
        (start..start + len)
            .map(|i| info.data.get(i).copied().unwrap_or(0))
            .collect()
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> BackendResult<SamplerId> {
        log::trace!("DummyBackend: creating sampler {desc:?}");
        let mut state = self.state.lock();
        let sampler = SamplerId::from_raw(state.next_raw());
        let gpu_index = state.next_sampler_index;
        state.next_sampler_index += 1;
        state.samplers.insert(sampler, gpu_index);
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: SamplerId) {
        let mut state = self.state.lock();
        if state.samplers.remove(&sampler).is_none() {
            panic!("DummyBackend: destroying unknown sampler {sampler:?}");
        }
        state.log(DummyCall::DestroySampler(sampler));
    }

    fn sampler_gpu_index(&self, sampler: SamplerId) -> u32 {
        self.state
            .lock()
            .samplers
            .get(&sampler)
            .copied()
            .unwrap_or_else(|| panic!("DummyBackend: unknown sampler {sampler:?}"))
    }

    fn create_bind_layout(&self, desc: &BindLayoutDesc) -> BackendResult<BindLayoutId> {
        log::trace!("DummyBackend: creating bind layout {:?}", desc.label);
        let mut state = self.state.lock();
        let layout = BindLayoutId::from_raw(state.next_raw());
        state.layouts.insert(layout);
        Ok(layout)
    }

    fn destroy_bind_layout(&self, layout: BindLayoutId) {
        if !self.state.lock().layouts.remove(&layout) {
            panic!("DummyBackend: destroying unknown bind layout {layout:?}");
        }
    }

    fn create_bind_group(&self, desc: &BindGroupDesc) -> BackendResult<BindGroupId> {
        let mut state = self.state.lock();
        if !state.layouts.contains(&desc.layout) {
            return Err(BackendError::BindGroupCreationFailed(format!(
                "`{}` uses unknown layout {:?}",
                desc.label, desc.layout
            )));
        }
        let group = BindGroupId::from_raw(state.next_raw());
        state.bind_groups.insert(group, desc.entries.clone());
        Ok(group)
    }

    fn update_bind_group(&self, group: BindGroupId, entries: &[(u32, BindEntry)]) {
        let mut state = self.state.lock();
        let current = state
            .bind_groups
            .get_mut(&group)
            .unwrap_or_else(|| panic!("DummyBackend: updating unknown bind group {group:?}"));
        for (binding, entry) in entries {
            match current.iter_mut().find(|(b, _)| b == binding) {
                Some(slot) => slot.1 = *entry,
                None => current.push((*binding, *entry)),
            }
        }
        state.log(DummyCall::UpdateBindGroup {
            group,
            entries: entries.to_vec(),
        });
    }

    fn destroy_bind_group(&self, group: BindGroupId) {
        let mut state = self.state.lock();
        if state.bind_groups.remove(&group).is_none() {
            panic!("DummyBackend: destroying unknown bind group {group:?}");
        }
        state.log(DummyCall::DestroyBindGroup(group));
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> BackendResult<PipelineId> {
        log::trace!("DummyBackend: creating pipeline {:?}", desc.label);
        let mut state = self.state.lock();
        if state.failing_pipelines.contains(&desc.label) {
            return Err(BackendError::PipelineCreationFailed(format!(
                "`{}` rejected by test configuration",
                desc.label
            )));
        }
        let pipeline = PipelineId::from_raw(state.next_raw());
        state.pipelines.insert(pipeline, desc.label.clone());
        state.log(DummyCall::CreatePipeline {
            pipeline,
            label: desc.label.clone(),
        });
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: PipelineId) {
        let mut state = self.state.lock();
        if state.pipelines.remove(&pipeline).is_none() {
            panic!("DummyBackend: destroying unknown pipeline {pipeline:?}");
        }
        state.log(DummyCall::DestroyPipeline(pipeline));
    }

    fn create_command_buffer(
        &self,
        queue: QueueType,
        label: &str,
    ) -> BackendResult<CommandBufferId> {
        let mut state = self.state.lock();
        let cb = CommandBufferId::from_raw(state.next_raw());
        state.command_buffers.insert(
            cb,
            CommandBufferInfo {
                queue,
                label: label.to_string(),
                state: RecordingState::Initial,
                commands: Vec::new(),
            },
        );
        Ok(cb)
    }

    fn destroy_command_buffer(&self, cb: CommandBufferId) {
        if self.state.lock().command_buffers.remove(&cb).is_none() {
            panic!("DummyBackend: destroying unknown command buffer {cb:?}");
        }
    }

    fn begin_commands(&self, cb: CommandBufferId) {
        let mut state = self.state.lock();
        let info = state
            .command_buffers
            .get_mut(&cb)
            .unwrap_or_else(|| panic!("DummyBackend: unknown command buffer {cb:?}"));
        assert!(
            info.state != RecordingState::Recording,
            "DummyBackend: command buffer `{}` is already recording",
            info.label
        );
        info.state = RecordingState::Recording;
        info.commands.clear();
    }

    fn end_commands(&self, cb: CommandBufferId) {
        let mut state = self.state.lock();
        state.recording(cb).state = RecordingState::Closed;
    }

    fn cmd_barrier(&self, cb: CommandBufferId, barriers: &[Barrier]) {
        if barriers.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        for barrier in barriers {
            match *barrier {
                Barrier::Texture { texture, .. } => assert!(
                    state.textures.contains_key(&texture),
                    "DummyBackend: barrier on unknown texture {texture:?}"
                ),
                Barrier::Buffer { buffer, .. } => assert!(
                    state.buffers.contains_key(&buffer),
                    "DummyBackend: barrier on unknown buffer {buffer:?}"
                ),
            }
        }
        state.push(cb, CommandRecord::Barrier(barriers.to_vec()));
    }

    fn cmd_begin_render_pass(&self, cb: CommandBufferId, desc: &RenderPassDesc) {
        self.state
            .lock()
            .push(cb, CommandRecord::BeginRenderPass(desc.clone()));
    }

    fn cmd_end_render_pass(&self, cb: CommandBufferId) {
        self.state.lock().push(cb, CommandRecord::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, cb: CommandBufferId, pipeline: PipelineId) {
        let mut state = self.state.lock();
        assert!(
            state.pipelines.contains_key(&pipeline),
            "DummyBackend: binding unknown pipeline {pipeline:?}"
        );
        state.push(cb, CommandRecord::BindPipeline(pipeline));
    }

    fn cmd_bind_group(&self, cb: CommandBufferId, point: BindPoint, set: u32, group: BindGroupId) {
        self.state
            .lock()
            .push(cb, CommandRecord::BindGroup { point, set, group });
    }

    fn cmd_bind_vertex_buffer(&self, cb: CommandBufferId, buffer: BufferId, _offset: u64) {
        self.state
            .lock()
            .push(cb, CommandRecord::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(
        &self,
        cb: CommandBufferId,
        buffer: BufferId,
        _offset: u64,
        _format: IndexFormat,
    ) {
        self.state
            .lock()
            .push(cb, CommandRecord::BindIndexBuffer(buffer));
    }

    fn cmd_push_constants(&self, cb: CommandBufferId, data: &[u8]) {
        self.state
            .lock()
            .push(cb, CommandRecord::PushConstants(data.to_vec()));
    }

    fn cmd_set_viewport(&self, cb: CommandBufferId, viewport: &Viewport) {
        self.state
            .lock()
            .push(cb, CommandRecord::SetViewport(*viewport));
    }

    fn cmd_draw(
        &self,
        cb: CommandBufferId,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.state.lock().push(
            cb,
            CommandRecord::Draw {
                vertex_count,
                instance_count,
            },
        );
    }

    fn cmd_draw_indexed(
        &self,
        cb: CommandBufferId,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        self.state.lock().push(
            cb,
            CommandRecord::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            },
        );
    }

    fn cmd_dispatch(&self, cb: CommandBufferId, x: u32, y: u32, z: u32) {
        self.state
            .lock()
            .push(cb, CommandRecord::Dispatch { x, y, z });
    }

    fn cmd_copy_buffer(
        &self,
        cb: CommandBufferId,
        src: BufferId,
        dst: BufferId,
        regions: &[BufferCopy],
    ) {
        self.state.lock().push(
            cb,
            CommandRecord::CopyBuffer {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_copy_buffer_to_texture(
        &self,
        cb: CommandBufferId,
        src: BufferId,
        dst: TextureId,
        regions: &[BufferTextureCopy],
    ) {
        self.state.lock().push(
            cb,
            CommandRecord::CopyBufferToTexture {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_copy_texture_to_buffer(
        &self,
        cb: CommandBufferId,
        src: TextureId,
        dst: BufferId,
        regions: &[BufferTextureCopy],
    ) {
        self.state.lock().push(
            cb,
            CommandRecord::CopyTextureToBuffer {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn create_semaphore(&self, initial: u64) -> BackendResult<SemaphoreId> {
        let mut state = self.state.lock();
        let semaphore = SemaphoreId::from_raw(state.next_raw());
        state.semaphores.insert(semaphore, initial);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreId) {
        if self.state.lock().semaphores.remove(&semaphore).is_none() {
            panic!("DummyBackend: destroying unknown semaphore {semaphore:?}");
        }
    }

    fn submit_commands(&self, queue: QueueType, command_buffers: &[CommandBufferId]) {
        let mut state = self.state.lock();
        for cb in command_buffers {
            let info = state
                .command_buffers
                .get(cb)
                .unwrap_or_else(|| panic!("DummyBackend: submitting unknown command buffer {cb:?}"));
            assert!(
                info.state == RecordingState::Closed,
                "DummyBackend: command buffer `{}` submitted while not closed",
                info.label
            );
            assert!(
                info.queue == queue || queue == QueueType::Graphics,
                "DummyBackend: command buffer `{}` recorded for {:?} submitted to {:?}",
                info.label,
                info.queue,
                queue
            );
        }
        log::trace!(
            "DummyBackend: submitting {} command buffers to {:?}",
            command_buffers.len(),
            queue
        );
        state.log(DummyCall::Submit {
            queue,
            command_buffers: command_buffers.to_vec(),
        });
    }

    fn queue_wait(&self, queue: QueueType, semaphore: SemaphoreId, value: u64) {
        let mut state = self.state.lock();
        let current = *state
            .semaphores
            .get(&semaphore)
            .unwrap_or_else(|| panic!("DummyBackend: waiting on unknown semaphore {semaphore:?}"));
        assert!(
            current >= value,
            "DummyBackend: {queue:?} queue waits for {semaphore:?} value {value} which was never signaled (current {current})"
        );
        state.log(DummyCall::QueueWait {
            queue,
            semaphore,
            value,
        });
    }

    fn queue_signal(&self, queue: QueueType, semaphore: SemaphoreId, value: u64) {
        let mut state = self.state.lock();
        let current = state
            .semaphores
            .get_mut(&semaphore)
            .unwrap_or_else(|| panic!("DummyBackend: signaling unknown semaphore {semaphore:?}"));
        assert!(
            value > *current,
            "DummyBackend: non-monotonic signal of {semaphore:?}: {value} after {current}"
        );
        *current = value;
        state.log(DummyCall::QueueSignal {
            queue,
            semaphore,
            value,
        });
    }

    fn wait_semaphore(&self, semaphore: SemaphoreId, value: u64) {
        let mut state = self.state.lock();
        let current = *state
            .semaphores
            .get(&semaphore)
            .unwrap_or_else(|| panic!("DummyBackend: waiting on unknown semaphore {semaphore:?}"));
        if current < value {
            log::error!("DummyBackend: CPU wait on {semaphore:?} for {value} can never complete");
            panic!("GPU hang: {semaphore:?} is at {current}, waited for {value}");
        }
        state.log(DummyCall::CpuWait { semaphore, value });
    }

    fn semaphore_value(&self, semaphore: SemaphoreId) -> u64 {
        self.state
            .lock()
            .semaphores
            .get(&semaphore)
            .copied()
            .unwrap_or_else(|| panic!("DummyBackend: unknown semaphore {semaphore:?}"))
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> BackendResult<SwapchainId> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_swapchain) {
            return Err(BackendError::SwapchainCreationFailed(
                "rejected by test configuration".to_string(),
            ));
        }
        let swapchain = SwapchainId::from_raw(state.next_raw());
        let images = state.swapchain_images(desc);
        state.swapchains.insert(
            swapchain,
            SwapchainInfo {
                desc: *desc,
                images,
                next_image: 0,
            },
        );
        Ok(swapchain)
    }

    fn resize_swapchain(&self, swapchain: SwapchainId, width: u32, height: u32) -> BackendResult<()> {
        let mut state = self.state.lock();
        let info = state
            .swapchains
            .remove(&swapchain)
            .ok_or_else(|| BackendError::SwapchainCreationFailed(format!("{swapchain:?} is unknown")))?;
        for image in &info.images {
            state.remove_texture(*image);
        }
        let desc = SwapchainDesc {
            width,
            height,
            ..info.desc
        };
        let images = state.swapchain_images(&desc);
        state.swapchains.insert(
            swapchain,
            SwapchainInfo {
                desc,
                images,
                next_image: 0,
            },
        );
        Ok(())
    }

    fn destroy_swapchain(&self, swapchain: SwapchainId) {
        let mut state = self.state.lock();
        let info = state
            .swapchains
            .remove(&swapchain)
            .unwrap_or_else(|| panic!("DummyBackend: destroying unknown swapchain {swapchain:?}"));
        for image in info.images {
            state.remove_texture(image);
        }
    }

    fn swapchain_images(&self, swapchain: SwapchainId) -> Vec<TextureId> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain)
            .map(|info| info.images.clone())
            .unwrap_or_else(|| panic!("DummyBackend: unknown swapchain {swapchain:?}"))
    }

    fn acquire_image(&self, swapchain: SwapchainId) -> u32 {
        let mut state = self.state.lock();
        let info = state
            .swapchains
            .get_mut(&swapchain)
            .unwrap_or_else(|| panic!("DummyBackend: unknown swapchain {swapchain:?}"));
        let index = info.next_image;
        info.next_image = (info.next_image + 1) % info.desc.image_count;
        index
    }

    fn wait_swapchain_latency(&self, _swapchain: SwapchainId) {}

    fn present(&self, swapchain: SwapchainId, image_index: u32) {
        let mut state = self.state.lock();
        assert!(
            state.swapchains.contains_key(&swapchain),
            "DummyBackend: presenting unknown swapchain {swapchain:?}"
        );
        state.log(DummyCall::Present {
            swapchain,
            image_index,
        });
    }

    fn wait_idle(&self) {
        self.state.lock().log(DummyCall::WaitIdle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging(backend: &DummyBackend) -> BufferId {
        backend
            .create_buffer(&BufferDesc::staging("staging", 64))
            .unwrap()
    }

    #[test]
    fn test_gpu_indices_never_reused() {
        let backend = DummyBackend::new();
        let desc = TextureDesc::new_2d(
            "t",
            4,
            4,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SAMPLED,
        );
        let a = backend.create_texture(&desc).unwrap();
        let a_index = backend.texture_gpu_index(a);
        backend.destroy_texture(a);
        let b = backend.create_texture(&desc).unwrap();
        assert_ne!(backend.texture_gpu_index(b), a_index);
    }

    #[test]
    #[should_panic(expected = "destroying unknown texture")]
    fn test_double_destroy_panics() {
        let backend = DummyBackend::new();
        let desc = TextureDesc::new_2d("t", 4, 4, TextureFormat::R8Unorm, TextureUsage::SAMPLED);
        let texture = backend.create_texture(&desc).unwrap();
        backend.destroy_texture(texture);
        backend.destroy_texture(texture);
    }

    #[test]
    #[should_panic(expected = "submitted while not closed")]
    fn test_submit_open_command_buffer_panics() {
        let backend = DummyBackend::new();
        let cb = backend
            .create_command_buffer(QueueType::Graphics, "open")
            .unwrap();
        backend.begin_commands(cb);
        backend.submit_commands(QueueType::Graphics, &[cb]);
    }

    #[test]
    #[should_panic(expected = "non-monotonic signal")]
    fn test_non_monotonic_signal_panics() {
        let backend = DummyBackend::new();
        let semaphore = backend.create_semaphore(0).unwrap();
        backend.queue_signal(QueueType::Graphics, semaphore, 2);
        backend.queue_signal(QueueType::Compute, semaphore, 2);
    }

    #[test]
    #[should_panic(expected = "GPU hang")]
    fn test_cpu_wait_on_unsignaled_value_panics() {
        let backend = DummyBackend::new();
        let semaphore = backend.create_semaphore(0).unwrap();
        backend.wait_semaphore(semaphore, 1);
    }

    #[test]
    fn test_write_and_read_buffer() {
        let backend = DummyBackend::new();
        let buffer = staging(&backend);
        backend.write_buffer(buffer, 8, &[1, 2, 3]);
        assert_eq!(backend.read_buffer(buffer, 7, 5), vec![0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_commands_recorded_between_begin_and_end() {
        let backend = DummyBackend::new();
        let cb = backend
            .create_command_buffer(QueueType::Compute, "work")
            .unwrap();
        backend.begin_commands(cb);
        backend.cmd_dispatch(cb, 8, 8, 1);
        backend.end_commands(cb);
        backend.submit_commands(QueueType::Compute, &[cb]);
        assert_eq!(
            backend.commands(cb),
            vec![CommandRecord::Dispatch { x: 8, y: 8, z: 1 }]
        );

        backend.begin_commands(cb);
        assert!(backend.commands(cb).is_empty());
    }

    #[test]
    fn test_failing_pipeline() {
        let backend = DummyBackend::new();
        backend.fail_pipeline("broken");
        let layout = backend
            .create_bind_layout(&BindLayoutDesc::default())
            .unwrap();
        let desc = PipelineDesc::compute("broken", ShaderSource::Engine("broken"), layout);
        assert!(matches!(
            backend.create_pipeline(&desc),
            Err(BackendError::PipelineCreationFailed(_))
        ));
    }

    #[test]
    fn test_swapchain_resize_replaces_images() {
        let backend = DummyBackend::new();
        let swapchain = backend
            .create_swapchain(&SwapchainDesc {
                width: 64,
                height: 64,
                image_count: 3,
                format: TextureFormat::Bgra8Unorm,
                flags: Default::default(),
            })
            .unwrap();
        let before = backend.swapchain_images(swapchain);
        backend.resize_swapchain(swapchain, 32, 32).unwrap();
        let after = backend.swapchain_images(swapchain);
        assert_eq!(after.len(), 3);
        assert!(before.iter().all(|image| !backend.is_texture_live(*image)));
        assert_eq!(backend.texture_desc(after[0]).unwrap().width, 32);

        backend.destroy_swapchain(swapchain);
        assert_eq!(backend.live_object_count(), 0);
    }
}
