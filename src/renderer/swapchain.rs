//! Swapchain ownership and the final composite into the back buffer.
//!
//! The swapchain pass is the last thing recorded each frame: the acquired
//! image moves from `Present` to `RenderTarget`, a fullscreen blit composites
//! the world, physics debug and editor targets by bindless index, and the
//! image moves back to `Present`.

use bytemuck::{Pod, Zeroable};

use crate::config::{BACK_BUFFER_COUNT, RendererConfig, SwapchainFlags, formats};
use crate::error::BackendResult;
use crate::gfx::{
    Barrier, BindGroupId, BindPoint, ColorAttachment, CommandBufferId, GfxBackend, LoadOp,
    PipelineId, RenderPassDesc, ResourceState, StoreOp, SwapchainDesc, SwapchainId, TextureId,
    Viewport,
};
use crate::passes::{GLOBAL_SET, NO_GPU_INDEX};
use crate::world_renderer::WorldOutputs;

/// How frames are synchronized with the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// No synchronization. May tear.
    Immediate,
    /// Low latency without tearing.
    Mailbox,
    /// Wait for vertical blank.
    #[default]
    Fifo,
}

impl PresentMode {
    pub fn from_flags(flags: SwapchainFlags) -> Self {
        if flags.contains(SwapchainFlags::VSYNC) {
            Self::Fifo
        } else if flags.contains(SwapchainFlags::ALLOW_TEARING) {
            Self::Immediate
        } else {
            Self::Mailbox
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
struct BlitConstants {
    world: u32,
    debug: u32,
    editor: u32,
    _pad: u32,
}

/// The window's swapchain and its images.
#[derive(Debug)]
pub struct Swapchain {
    id: SwapchainId,
    images: Vec<TextureId>,
    extent: (u32, u32),
    flags: SwapchainFlags,
}

impl Swapchain {
    /// One image more than frames in flight, so acquiring never waits on the
    /// image being presented.
    pub const IMAGE_COUNT: u32 = BACK_BUFFER_COUNT as u32 + 1;

    pub fn new(backend: &dyn GfxBackend, config: &RendererConfig) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let id = backend.create_swapchain(&SwapchainDesc {
            width,
            height,
            image_count: Self::IMAGE_COUNT,
            format: formats::SWAPCHAIN,
            flags: config.swapchain_flags,
        })?;
        log::debug!(
            "Created swapchain {width}x{height} ({:?}, {} images)",
            PresentMode::from_flags(config.swapchain_flags),
            Self::IMAGE_COUNT
        );
        Ok(Self {
            id,
            images: backend.swapchain_images(id),
            extent: (width, height),
            flags: config.swapchain_flags,
        })
    }

    pub fn id(&self) -> SwapchainId {
        self.id
    }

    pub fn extent(&self) -> (u32, u32) {
        self.extent
    }

    pub fn images(&self) -> &[TextureId] {
        &self.images
    }

    pub fn present_mode(&self) -> PresentMode {
        PresentMode::from_flags(self.flags)
    }

    /// Acquire the next image, returning its index and texture.
    pub fn acquire(&self, backend: &dyn GfxBackend) -> (u32, TextureId) {
        let index = backend.acquire_image(self.id);
        let image = *self
            .images
            .get(index as usize)
            .unwrap_or_else(|| panic!("swapchain returned image {index} of {}", self.images.len()));
        (index, image)
    }

    /// Block until the display is ready to take another frame.
    pub fn wait_latency(&self, backend: &dyn GfxBackend) {
        backend.wait_swapchain_latency(self.id);
    }

    pub fn present(&self, backend: &dyn GfxBackend, image_index: u32) {
        backend.present(self.id, image_index);
    }

    /// Recreate the images at a new size. The GPU must be idle.
    pub fn resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        backend.resize_swapchain(self.id, width, height)?;
        self.images = backend.swapchain_images(self.id);
        self.extent = (width, height);
        Ok(())
    }

    /// Record the composite of `outputs` into `image`. `cb` must be open.
    pub fn record_blit(
        &self,
        backend: &dyn GfxBackend,
        cb: CommandBufferId,
        image: TextureId,
        pipeline: PipelineId,
        global_group: BindGroupId,
        outputs: &WorldOutputs,
    ) {
        crate::profile_scope!("swapchain::blit");
        backend.cmd_barrier(
            cb,
            &[Barrier::texture(image, ResourceState::Present, ResourceState::RenderTarget)],
        );
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "swapchain",
                color: vec![ColorAttachment {
                    texture: image,
                    load: LoadOp::DontCare,
                    store: StoreOp::Store,
                }],
                depth: None,
            },
        );
        backend.cmd_set_viewport(cb, &Viewport::from_dimensions(self.extent.0, self.extent.1));
        backend.cmd_bind_group(cb, BindPoint::Graphics, GLOBAL_SET, global_group);
        backend.cmd_bind_pipeline(cb, pipeline);
        let constants = BlitConstants {
            world: outputs.world_index,
            debug: outputs.debug_index,
            editor: outputs.editor_index.unwrap_or(NO_GPU_INDEX),
            _pad: 0,
        };
        backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
        backend.cmd_draw(cb, 3, 1, 0, 0);
        backend.cmd_end_render_pass(cb);
        backend.cmd_barrier(
            cb,
            &[Barrier::texture(image, ResourceState::RenderTarget, ResourceState::Present)],
        );
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        backend.destroy_swapchain(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::DummyBackend;

    #[test]
    fn test_present_mode_from_flags() {
        assert_eq!(PresentMode::from_flags(SwapchainFlags::VSYNC), PresentMode::Fifo);
        assert_eq!(
            PresentMode::from_flags(SwapchainFlags::ALLOW_TEARING),
            PresentMode::Immediate
        );
        assert_eq!(PresentMode::from_flags(SwapchainFlags::empty()), PresentMode::Mailbox);
    }

    #[test]
    fn test_acquire_cycles_images() {
        let backend = DummyBackend::new();
        let swapchain = Swapchain::new(&backend, &RendererConfig::default()).unwrap();
        assert_eq!(swapchain.images().len(), Swapchain::IMAGE_COUNT as usize);
        let indices: Vec<u32> = (0..Swapchain::IMAGE_COUNT + 1)
            .map(|_| swapchain.acquire(&backend).0)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
        swapchain.destroy(&backend);
        assert_eq!(backend.live_object_count(), 0);
    }

    #[test]
    fn test_resize_replaces_images() {
        let backend = DummyBackend::new();
        let mut swapchain = Swapchain::new(&backend, &RendererConfig::default()).unwrap();
        let old = swapchain.images().to_vec();
        swapchain.resize(&backend, 640, 480).unwrap();
        assert_eq!(swapchain.extent(), (640, 480));
        assert!(old.iter().all(|image| !backend.is_texture_live(*image)));
        assert_eq!(backend.texture_desc(swapchain.images()[0]).unwrap().width, 640);
        swapchain.destroy(&backend);
    }
}
