//! Frame orchestration.
//!
//! [`Renderer`] drives one frame per [`render_frame`](Renderer::render_frame)
//! call:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. wait for the slot's previous frame (`frame` timeline)     │
//! │ 2. drain the event stream, flush the retired destroy bucket  │
//! │ 3. record + submit uploads on transfer, signal `copy`        │
//! │ 4. close the global command buffer (post-upload barriers)    │
//! │ 5. world renderer: prepare, record, submit all passes        │
//! │ 6. swapchain blit: Present → RenderTarget → Present          │
//! │ 7. submit, signal `frame`, wait latency, present             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Step 1 is the only point where the CPU waits for the GPU, which bounds the
//! render thread to [`BACK_BUFFER_COUNT`] frames ahead.

mod swapchain;
mod thread;

pub use swapchain::{PresentMode, Swapchain};
pub use thread::{FrameTiming, RenderThread};

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::config::{BACK_BUFFER_COUNT, RendererConfig};
use crate::error::{BackendResult, InitError};
use crate::events::EventStream;
use crate::frame::{PerFrame, frame_slot};
use crate::gfx::{
    BindEntry, BindGroupDesc, BindGroupId, BindLayoutDesc, BindLayoutId, BindingKind, BufferDesc,
    BufferId, BufferUsage, GfxBackend, QueueType, SamplerDesc, SamplerId,
};
use crate::passes::{EngineShaders, FrameTime, PassCommandBuffers};
use crate::proxy::{FetchStats, ProxyManager};
use crate::scene::ViewConstants;
use crate::sync::QueueSemaphores;
use crate::upload::UploadQueues;
use crate::window::WindowEvent;
use crate::world_renderer::{RenderParams, WorldOutputs, WorldRenderer, WorldStats};

/// Push constant bytes every pipeline may use.
pub const PUSH_CONSTANT_SIZE: u32 = 128;

/// Contents of the per-frame global constant buffer, bound at set 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalConstants {
    pub view: ViewConstants,
    pub resolution: [f32; 2],
    pub delta_time: f32,
    pub elapsed_time: f32,
    pub render_frame: u32,
    pub frame_index: u32,
    pub _pad: [u32; 2],
}

static_assertions::const_assert_eq!(std::mem::size_of::<GlobalConstants>() % 16, 0);

/// What one `render_frame` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub render_frame: u64,
    pub frame_index: usize,
    pub fetch: FetchStats,
    /// Deferred destroys handed to the backend this frame.
    pub destroyed: usize,
    /// `(buffer, texture)` uploads recorded this frame.
    pub uploads: Option<(usize, usize)>,
    /// Value of the `frame` timeline that retires this frame.
    pub frame_value: u64,
    pub outputs: WorldOutputs,
    pub world: WorldStats,
}

fn global_layout_desc() -> BindLayoutDesc {
    BindLayoutDesc {
        label: "global".to_string(),
        bindings: vec![
            BindingKind::ConstantBuffer,
            BindingKind::TextureArray,
            BindingKind::Sampler,
        ],
        push_constant_size: PUSH_CONSTANT_SIZE,
    }
}

/// Per-frame global constant buffers and the groups binding them.
#[derive(Debug)]
struct GlobalResources {
    sampler: SamplerId,
    constants: PerFrame<BufferId>,
    groups: PerFrame<BindGroupId>,
}

impl GlobalResources {
    fn new(backend: &dyn GfxBackend, layout: BindLayoutId) -> BackendResult<Self> {
        let size = std::mem::size_of::<GlobalConstants>() as u64;
        let sampler = backend.create_sampler(&SamplerDesc::default())?;
        let constants = PerFrame::try_new(
            |slot| {
                backend.create_buffer(&BufferDesc::new(
                    format!("global constants[{slot}]"),
                    size,
                    BufferUsage::CONSTANT | BufferUsage::CPU_VISIBLE,
                ))
            },
            |buffer| backend.destroy_buffer(buffer),
        )
        .inspect_err(|_| backend.destroy_sampler(sampler))?;
        let groups = PerFrame::try_new(
            |slot| {
                backend.create_bind_group(&BindGroupDesc {
                    label: format!("global[{slot}]"),
                    layout,
                    entries: vec![
                        (
                            0,
                            BindEntry::Buffer {
                                buffer: constants[slot],
                                offset: 0,
                                size,
                            },
                        ),
                        (2, BindEntry::Sampler(sampler)),
                    ],
                })
            },
            |group| backend.destroy_bind_group(group),
        )
        .inspect_err(|_| {
            constants.iter().for_each(|buffer| backend.destroy_buffer(*buffer));
            backend.destroy_sampler(sampler);
        })?;
        Ok(Self {
            sampler,
            constants,
            groups,
        })
    }

    fn destroy(&self, backend: &dyn GfxBackend) {
        self.groups
            .iter()
            .for_each(|group| backend.destroy_bind_group(*group));
        self.constants
            .iter()
            .for_each(|buffer| backend.destroy_buffer(*buffer));
        backend.destroy_sampler(self.sampler);
    }
}

/// Everything `init` created so far. Torn down newest first on failure.
#[derive(Default)]
struct InitGuard {
    semaphores: Option<QueueSemaphores>,
    global_layout: Option<BindLayoutId>,
    globals: Option<GlobalResources>,
    shaders: Option<EngineShaders>,
    swapchain: Option<Swapchain>,
    uploads: Option<UploadQueues>,
    proxies: Option<ProxyManager>,
    world: Option<WorldRenderer>,
    global_cbs: Option<PassCommandBuffers>,
}

impl InitGuard {
    fn rollback(mut self, backend: &dyn GfxBackend) {
        if let Some(cbs) = self.global_cbs.take() {
            cbs.destroy(backend);
        }
        if let Some(mut world) = self.world.take() {
            world.destroy(backend);
        }
        if let Some(mut proxies) = self.proxies.take() {
            proxies.shutdown();
        }
        if let Some(uploads) = self.uploads.take() {
            uploads.destroy(backend);
        }
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(backend);
        }
        if let Some(shaders) = self.shaders.take() {
            shaders.destroy(backend);
        }
        if let Some(globals) = self.globals.take() {
            globals.destroy(backend);
        }
        if let Some(layout) = self.global_layout.take() {
            backend.destroy_bind_layout(layout);
        }
        if let Some(semaphores) = self.semaphores.take() {
            semaphores.destroy(backend);
        }
        log::debug!("Rolled back partial renderer initialization");
    }
}

/// The render-thread side of the engine.
pub struct Renderer {
    backend: Arc<dyn GfxBackend>,
    config: RendererConfig,
    semaphores: QueueSemaphores,
    global_layout: BindLayoutId,
    globals: GlobalResources,
    shaders: EngineShaders,
    swapchain: Swapchain,
    uploads: UploadQueues,
    proxies: ProxyManager,
    world: WorldRenderer,
    global_cbs: PassCommandBuffers,
    blit_cbs: PassCommandBuffers,
    /// `frame` value that retires each slot's last frame.
    frame_values: PerFrame<u64>,
    render_frame: u64,
    timing: Arc<FrameTiming>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("backend", &self.backend.name())
            .field("resolution", &self.config.resolution)
            .field("render_frame", &self.render_frame)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Create every subsystem in order. If a stage fails, the stages before
    /// it are destroyed in reverse order and the failure is returned.
    pub fn init(backend: Arc<dyn GfxBackend>, config: RendererConfig) -> Result<Self, InitError> {
        crate::profile_function!();
        config.validate()?;
        let mut guard = InitGuard::default();
        let renderer = Self::create(&backend, &config, &mut guard).inspect_err(|err| {
            log::error!("Renderer initialization failed: {err}");
            guard.rollback(backend.as_ref());
        })?;
        log::info!(
            "Renderer initialized on {} at {}x{} ({} frames in flight, tool mode {})",
            renderer.backend.name(),
            config.resolution.0,
            config.resolution.1,
            BACK_BUFFER_COUNT,
            config.tool_mode
        );
        Ok(renderer)
    }

    fn create(
        backend: &Arc<dyn GfxBackend>,
        config: &RendererConfig,
        guard: &mut InitGuard,
    ) -> Result<Self, InitError> {
        let gfx = backend.as_ref();
        guard.semaphores = Some(QueueSemaphores::new(gfx).map_err(InitError::backend("semaphores"))?);
        let global_layout = *guard.global_layout.insert(
            gfx.create_bind_layout(&global_layout_desc())
                .map_err(InitError::backend("global layout"))?,
        );
        guard.globals = Some(
            GlobalResources::new(gfx, global_layout).map_err(InitError::backend("global constants"))?,
        );
        let shaders = guard.shaders.insert(EngineShaders::new(gfx, global_layout)?);
        guard.swapchain = Some(Swapchain::new(gfx, config).map_err(InitError::Swapchain)?);
        let uploads = guard
            .uploads
            .insert(UploadQueues::new(gfx).map_err(InitError::backend("upload queues"))?);
        guard.proxies = Some(
            ProxyManager::new(backend.clone(), &config.capacities, global_layout, uploads)
                .map_err(InitError::backend("proxy manager"))?,
        );
        guard.world = Some(
            WorldRenderer::new(gfx, config, shaders).map_err(InitError::backend("world renderer"))?,
        );
        guard.global_cbs = Some(
            PassCommandBuffers::new(gfx, QueueType::Graphics, "globals")
                .map_err(InitError::backend("global command buffers"))?,
        );
        let blit_cbs = PassCommandBuffers::new(gfx, QueueType::Graphics, "swapchain")
            .map_err(InitError::backend("swapchain command buffers"))?;

        let InitGuard {
            semaphores: Some(semaphores),
            global_layout: Some(global_layout),
            globals: Some(globals),
            shaders: Some(shaders),
            swapchain: Some(swapchain),
            uploads: Some(uploads),
            proxies: Some(proxies),
            world: Some(world),
            global_cbs: Some(global_cbs),
        } = std::mem::take(guard)
        else {
            unreachable!("every init stage completed");
        };
        Ok(Self {
            backend: backend.clone(),
            config: config.clone(),
            semaphores,
            global_layout,
            globals,
            shaders,
            swapchain,
            uploads,
            proxies,
            world,
            global_cbs,
            blit_cbs,
            frame_values: PerFrame::default(),
            render_frame: 0,
            timing: Arc::new(FrameTiming::new()),
        })
    }

    pub fn backend(&self) -> &Arc<dyn GfxBackend> {
        &self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn proxies(&self) -> &ProxyManager {
        &self.proxies
    }

    pub fn world(&self) -> &WorldRenderer {
        &self.world
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Global group every pass binds at set 0 for `frame_index`.
    pub fn global_group(&self, frame_index: usize) -> BindGroupId {
        self.globals.groups[frame_index]
    }

    pub fn semaphores(&self) -> &QueueSemaphores {
        &self.semaphores
    }

    /// Timing shared with the simulation thread.
    pub fn timing(&self) -> &Arc<FrameTiming> {
        &self.timing
    }

    /// Number of frames rendered so far.
    pub fn frames_rendered(&self) -> u64 {
        self.render_frame
    }

    /// Run the frame state machine once.
    pub fn render_frame(&mut self, stream: &EventStream) -> FrameReport {
        crate::profile_scope!("render_frame");
        let backend = Arc::clone(&self.backend);
        let backend = backend.as_ref();
        let render_frame = self.render_frame;
        let frame_index = frame_slot(render_frame);

        // 1. The slot's previous frame must have retired before anything of
        // the slot is touched.
        self.semaphores
            .frame
            .cpu_wait(backend, self.frame_values[frame_index]);

        // 2. Simulation input.
        self.proxies.begin_frame(render_frame);
        let fetch = self.proxies.fetch_render_events(stream, &mut self.uploads);
        let destroyed = self.proxies.flush_destroys(false);
        self.proxies.flush_material_updates(frame_index);

        // 3. Uploads.
        let upload = self.uploads.record(frame_index, backend);
        let copy_wait = upload.as_ref().map(|submission| {
            backend.submit_commands(QueueType::Transfer, &[submission.command_buffer]);
            self.semaphores.copy.signal(backend, QueueType::Transfer)
        });

        // 4. Global state. This command buffer only moves uploaded resources
        // to their resting state. Bindings do not survive across command
        // buffers, so every pass binds the global group itself through
        // `PassContext::bind_globals`, and the per-slot constants are written
        // host-side below.
        let global_cb = self.global_cbs.begin(backend, frame_index);
        if let Some(submission) = &upload {
            backend.cmd_barrier(global_cb, &submission.post_barriers);
        }
        backend.end_commands(global_cb);

        // 5. World.
        self.world.prepare(backend, &self.proxies, frame_index);
        let time = FrameTime {
            delta: self.timing.delta_time(),
            elapsed: self.timing.elapsed_time(),
        };
        let (width, height) = self.world.resolution();
        let constants = GlobalConstants {
            view: self.world.view().constants(),
            resolution: [width as f32, height as f32],
            delta_time: time.delta,
            elapsed_time: time.elapsed,
            render_frame: render_frame as u32,
            frame_index: frame_index as u32,
            _pad: [0; 2],
        };
        backend.write_buffer(
            self.globals.constants[frame_index],
            0,
            bytemuck::bytes_of(&constants),
        );
        let outputs = self.world.render(
            backend,
            &self.proxies,
            frame_index,
            &mut self.semaphores,
            &RenderParams {
                global_cb,
                global_group: self.globals.groups[frame_index],
                copy_wait,
                time,
            },
        );

        // 6. Swapchain.
        let (image_index, image) = self.swapchain.acquire(backend);
        let blit_cb = self.blit_cbs.begin(backend, frame_index);
        self.swapchain.record_blit(
            backend,
            blit_cb,
            image,
            self.shaders.swapchain_blit,
            self.globals.groups[frame_index],
            &outputs,
        );
        backend.end_commands(blit_cb);

        // 7. Submit and present.
        backend.submit_commands(QueueType::Graphics, &[blit_cb]);
        let frame_value = self.semaphores.frame.signal(backend, QueueType::Graphics);
        self.frame_values[frame_index] = frame_value;
        self.swapchain.wait_latency(backend);
        self.swapchain.present(backend, image_index);

        self.render_frame += 1;
        self.timing.set_render_frame(self.render_frame);
        crate::frame_mark!();
        log::trace!("Frame {render_frame} (slot {frame_index}) submitted, retires at {frame_value}");

        FrameReport {
            render_frame,
            frame_index,
            fetch,
            destroyed,
            uploads: upload.map(|submission| (submission.buffer_uploads, submission.texture_uploads)),
            frame_value,
            outputs,
            world: self.world.stats(),
        }
    }

    /// Block until every frame in flight has retired.
    pub fn wait_for_frames(&self) {
        for value in self.frame_values.iter() {
            self.semaphores.frame.cpu_wait(self.backend.as_ref(), *value);
        }
    }

    /// Resize the swapchain and every size-dependent target.
    ///
    /// The render thread must be joined. Zero-sized windows (minimized) are
    /// ignored.
    pub fn on_window_resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if width == 0 || height == 0 {
            log::warn!("Ignoring resize to {width}x{height}");
            return Ok(());
        }
        if (width, height) == self.config.resolution {
            return Ok(());
        }
        crate::profile_scope!("on_window_resize");
        let backend = self.backend.as_ref();
        self.wait_for_frames();
        backend.wait_idle();
        self.swapchain.resize(backend, width, height)?;
        self.world.on_window_resize(backend, width, height)?;
        self.config.resolution = (width, height);
        log::info!("Renderer resized to {width}x{height}");
        Ok(())
    }

    /// Forward a window or input event to the passes that consume input.
    pub fn on_window_event(&mut self, event: &WindowEvent) {
        log::trace!("Window event {event:?}");
        self.world.on_window_event(event);
    }

    /// Wait for the GPU, flush every deferred destroy and release all GPU
    /// objects the renderer owns.
    pub fn shutdown(mut self) {
        crate::profile_function!();
        let backend = Arc::clone(&self.backend);
        let backend = backend.as_ref();
        self.wait_for_frames();
        backend.wait_idle();
        self.proxies.shutdown();
        self.world.destroy(backend);
        self.blit_cbs.destroy(backend);
        self.global_cbs.destroy(backend);
        self.uploads.destroy(backend);
        self.swapchain.destroy(backend);
        self.shaders.destroy(backend);
        self.globals.destroy(backend);
        backend.destroy_bind_layout(self.global_layout);
        self.semaphores.destroy(backend);
        log::info!("Renderer shut down after {} frames", self.render_frame);
    }
}
