//! CPU → GPU upload batching.
//!
//! Proxies write their initial data into CPU-visible staging buffers and
//! queue a copy here. Once per frame [`UploadQueues::record`] turns every
//! pending copy into a single transfer-queue command buffer:
//!
//! ```text
//! barriers (Undefined → CopyDst)
//! copy buffer → buffer   (vertex / index data)
//! copy buffer → texture  (every mip and array layer)
//! ```
//!
//! The transfer queue cannot move resources into graphics states, so the
//! CopyDst → resting transitions are returned to the caller and applied on
//! the graphics queue after it waits on the `copy` semaphore.

use crate::error::BackendResult;
use crate::frame::PerFrame;
use crate::gfx::{
    Barrier, BufferCopy, BufferId, BufferTextureCopy, CommandBufferId, GfxBackend, QueueType,
    ResourceState, TextureId,
};

/// Pending buffer → buffer copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUpload {
    pub src: BufferId,
    pub dst: BufferId,
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
    /// State `dst` is left in after the upload.
    pub dst_state: ResourceState,
}

/// Pending buffer → texture copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureUpload {
    pub src: BufferId,
    pub dst: TextureId,
    /// One region per (layer, mip) subresource.
    pub regions: Vec<BufferTextureCopy>,
    /// State `dst` is left in after the upload.
    pub dst_state: ResourceState,
}

/// Queue of pending buffer uploads.
#[derive(Debug, Default)]
pub struct BufferUploadQueue {
    pending: Vec<BufferUpload>,
}

impl BufferUploadQueue {
    pub fn push(&mut self, upload: BufferUpload) {
        debug_assert!(upload.size > 0, "empty buffer upload");
        self.pending.push(upload);
    }

    /// Drop pending uploads targeting `dst`.
    pub fn cancel(&mut self, dst: BufferId) {
        self.pending.retain(|upload| upload.dst != dst);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[BufferUpload] {
        &self.pending
    }
}

/// Queue of pending texture uploads.
#[derive(Debug, Default)]
pub struct TextureUploadQueue {
    pending: Vec<TextureUpload>,
}

impl TextureUploadQueue {
    pub fn push(&mut self, upload: TextureUpload) {
        debug_assert!(!upload.regions.is_empty(), "texture upload without regions");
        self.pending.push(upload);
    }

    /// Drop pending uploads targeting `dst`.
    pub fn cancel(&mut self, dst: TextureId) {
        self.pending.retain(|upload| upload.dst != dst);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[TextureUpload] {
        &self.pending
    }
}

/// Build tightly packed copy regions for every (layer, mip) of a texture.
///
/// Returns the regions and the total byte size they cover.
pub fn texture_regions(
    width: u32,
    height: u32,
    mip_levels: u32,
    array_layers: u32,
    block_size: u32,
) -> (Vec<BufferTextureCopy>, u64) {
    let mut regions = Vec::with_capacity((mip_levels * array_layers) as usize);
    let mut offset = 0u64;
    for layer in 0..array_layers {
        for mip in 0..mip_levels {
            let mip_width = (width >> mip).max(1);
            let mip_height = (height >> mip).max(1);
            regions.push(BufferTextureCopy {
                buffer_offset: offset,
                mip_level: mip,
                array_layer: layer,
                width: mip_width,
                height: mip_height,
                origin: (0, 0),
            });
            offset += mip_width as u64 * mip_height as u64 * block_size as u64;
        }
    }
    (regions, offset)
}

/// Result of recording the frame's uploads.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSubmission {
    /// Closed transfer-queue command buffer.
    pub command_buffer: CommandBufferId,
    /// CopyDst → resting transitions to apply on the graphics queue.
    pub post_barriers: Vec<Barrier>,
    pub buffer_uploads: usize,
    pub texture_uploads: usize,
}

/// Buffer and texture upload queues plus their per-frame transfer command
/// buffers.
#[derive(Debug)]
pub struct UploadQueues {
    pub buffers: BufferUploadQueue,
    pub textures: TextureUploadQueue,
    command_buffers: PerFrame<CommandBufferId>,
}

impl UploadQueues {
    pub fn new(backend: &dyn GfxBackend) -> BackendResult<Self> {
        let command_buffers = PerFrame::try_new(
            |slot| backend.create_command_buffer(QueueType::Transfer, &format!("upload[{slot}]")),
            |cb| backend.destroy_command_buffer(cb),
        )?;
        Ok(Self {
            buffers: BufferUploadQueue::default(),
            textures: TextureUploadQueue::default(),
            command_buffers,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty()
    }

    /// Record every pending upload into the transfer command buffer for
    /// `frame_index` and clear the queues.
    ///
    /// Returns `None` without touching the command buffer when nothing is
    /// pending.
    pub fn record(
        &mut self,
        frame_index: usize,
        backend: &dyn GfxBackend,
    ) -> Option<UploadSubmission> {
        if self.is_empty() {
            return None;
        }
        crate::profile_scope!("upload_record");

        let cb = self.command_buffers[frame_index];
        let buffers = std::mem::take(&mut self.buffers.pending);
        let textures = std::mem::take(&mut self.textures.pending);

        let mut pre_barriers = Vec::with_capacity(buffers.len() + textures.len());
        let mut post_barriers = Vec::with_capacity(buffers.len() + textures.len());
        for upload in &buffers {
            pre_barriers.push(Barrier::buffer(
                upload.dst,
                ResourceState::Undefined,
                ResourceState::CopyDst,
            ));
            post_barriers.push(Barrier::buffer(
                upload.dst,
                ResourceState::CopyDst,
                upload.dst_state,
            ));
        }
        for upload in &textures {
            pre_barriers.push(Barrier::texture(
                upload.dst,
                ResourceState::Undefined,
                ResourceState::CopyDst,
            ));
            post_barriers.push(Barrier::texture(
                upload.dst,
                ResourceState::CopyDst,
                upload.dst_state,
            ));
        }

        backend.begin_commands(cb);
        backend.cmd_barrier(cb, &pre_barriers);
        for upload in &buffers {
            backend.cmd_copy_buffer(
                cb,
                upload.src,
                upload.dst,
                &[BufferCopy {
                    src_offset: upload.src_offset,
                    dst_offset: upload.dst_offset,
                    size: upload.size,
                }],
            );
        }
        for upload in &textures {
            backend.cmd_copy_buffer_to_texture(cb, upload.src, upload.dst, &upload.regions);
        }
        backend.end_commands(cb);

        log::trace!(
            "Recorded {} buffer and {} texture uploads for slot {}",
            buffers.len(),
            textures.len(),
            frame_index
        );

        Some(UploadSubmission {
            command_buffer: cb,
            post_barriers,
            buffer_uploads: buffers.len(),
            texture_uploads: textures.len(),
        })
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        self.command_buffers
            .iter()
            .for_each(|cb| backend.destroy_command_buffer(*cb));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{
        BufferDesc, BufferUsage, CommandRecord, DummyBackend, TextureDesc, TextureFormat,
        TextureUsage,
    };

    #[test]
    fn test_texture_regions_mip_chain() {
        let (regions, size) = texture_regions(4, 4, 3, 1, 4);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[1].buffer_offset, 64);
        assert_eq!(regions[2].width, 1);
        assert_eq!(size, 64 + 16 + 4);
    }

    #[test]
    fn test_texture_regions_layers_are_layer_major() {
        let (regions, _) = texture_regions(2, 2, 2, 2, 1);
        let order: Vec<_> = regions.iter().map(|r| (r.array_layer, r.mip_level)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_empty_queues_record_nothing() {
        let backend = DummyBackend::new();
        let mut queues = UploadQueues::new(&backend).unwrap();
        assert!(queues.record(0, &backend).is_none());
    }

    #[test]
    fn test_record_barriers_and_copies() {
        let backend = DummyBackend::new();
        let mut queues = UploadQueues::new(&backend).unwrap();
        let staging = backend.create_buffer(&BufferDesc::staging("s", 256)).unwrap();
        let vertices = backend
            .create_buffer(&BufferDesc::new("v", 128, BufferUsage::VERTEX | BufferUsage::COPY_DST))
            .unwrap();
        let texture = backend
            .create_texture(&TextureDesc::new_2d(
                "t",
                4,
                4,
                TextureFormat::Rgba8Unorm,
                TextureUsage::SAMPLED | TextureUsage::COPY_DST,
            ))
            .unwrap();

        queues.buffers.push(BufferUpload {
            src: staging,
            dst: vertices,
            src_offset: 0,
            dst_offset: 0,
            size: 128,
            dst_state: ResourceState::VertexBuffer,
        });
        let (regions, _) = texture_regions(4, 4, 1, 1, 4);
        queues.textures.push(TextureUpload {
            src: staging,
            dst: texture,
            regions,
            dst_state: ResourceState::ShaderRead,
        });

        let submission = queues.record(1, &backend).unwrap();
        assert_eq!(submission.buffer_uploads, 1);
        assert_eq!(submission.texture_uploads, 1);
        assert!(submission.post_barriers.contains(&Barrier::texture(
            texture,
            ResourceState::CopyDst,
            ResourceState::ShaderRead
        )));

        let commands = backend.commands(submission.command_buffer);
        assert!(matches!(commands[0], CommandRecord::Barrier(_)));
        assert_eq!(commands.len(), 3);
        assert!(queues.is_empty());
    }

    #[test]
    fn test_cancel_drops_pending() {
        let mut queue = TextureUploadQueue::default();
        let (regions, _) = texture_regions(1, 1, 1, 1, 4);
        queue.push(TextureUpload {
            src: BufferId::from_raw(1),
            dst: TextureId::from_raw(2),
            regions,
            dst_state: ResourceState::ShaderRead,
        });
        queue.cancel(TextureId::from_raw(2));
        assert!(queue.is_empty());
    }
}
