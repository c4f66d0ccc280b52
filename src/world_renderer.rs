//! The fixed render-pass graph.
//!
//! [`WorldRenderer`] owns every pass, wires the outputs of one pass into the
//! inputs of the next by bindless index and submits the recorded command
//! buffers across the graphics and compute queues.
//!
//! Submission order for one frame:
//!
//! ```text
//! graphics: [globals, depth, shadows.., opaque]                    signal ssao
//! compute:  wait ssao     [ssao, particle simulate]                signal ssao
//! graphics: wait ssao     [lighting, forward, particles, debug, ids] signal lighting
//! compute:  wait lighting [bloom]                                  signal lighting
//! graphics: wait lighting [post combine, canvas]
//! ```
//!
//! Passes with nothing to do still close an empty command buffer, so the
//! sequence above never changes shape.

use crate::config::RendererConfig;
use crate::error::BackendResult;
use crate::gfx::{BindGroupId, CommandBufferId, GfxBackend, QueueType, ResourceState, TextureId};
use crate::passes::{
    BloomPass, CanvasPass, EngineShaders, ForwardPass, FrameTime, LightingInputs, LightingPass,
    ObjectIdPass, OpaquePass, ParticlePass, PassContext, PhysicsDebugPass, PostCombinePass,
    PreDepthPass, RenderPass, ShadowPass, SsaoPass,
};
use crate::proxy::ProxyManager;
use crate::scene::{CollectStats, View};
use crate::sync::{QueueSemaphores, ResourceStateTracker};
use crate::window::WindowEvent;

/// Per-frame inputs handed down by the renderer.
#[derive(Debug, Clone, Copy)]
pub struct RenderParams {
    /// Closed command buffer carrying the global state and post-upload
    /// barriers. Submitted first on the graphics queue.
    pub global_cb: CommandBufferId,
    pub global_group: BindGroupId,
    /// `copy` value the graphics queue waits for before its first batch.
    pub copy_wait: Option<u64>,
    pub time: FrameTime,
}

/// What the swapchain pass composites, as bindless indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldOutputs {
    pub world_index: u32,
    pub debug_index: u32,
    /// Only present in tool mode.
    pub editor_index: Option<u32>,
    /// Every `(timeline, value)` signaled while submitting, in order.
    pub signals: Vec<(&'static str, u64)>,
}

/// CPU side counters of the last prepared frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub depth: CollectStats,
    pub opaque: CollectStats,
    pub forward: CollectStats,
    pub object_id: CollectStats,
    pub shadow_views: usize,
    pub skipped_shadow_views: usize,
    pub lights: usize,
    pub live_emitters: usize,
    pub canvas_quads: u32,
    pub debug_lines: usize,
}

pub struct WorldRenderer {
    pre_depth: PreDepthPass,
    shadows: ShadowPass,
    opaque: OpaquePass,
    ssao: SsaoPass,
    lighting: LightingPass,
    bloom: BloomPass,
    particles: ParticlePass,
    forward: ForwardPass,
    physics_debug: PhysicsDebugPass,
    post_combine: PostCombinePass,
    canvas: CanvasPass,
    object_id: Option<ObjectIdPass>,
    tracker: ResourceStateTracker,
    view: View,
    resolution: (u32, u32),
    warned_no_camera: bool,
    stats: WorldStats,
}

/// Destroy the passes created so far, newest first, if `result` failed.
fn or_rollback<T>(
    result: BackendResult<T>,
    backend: &dyn GfxBackend,
    created: &mut [&mut dyn RenderPass],
) -> BackendResult<T> {
    result.inspect_err(|err| {
        log::error!("World renderer creation failed: {err}");
        created
            .iter_mut()
            .rev()
            .for_each(|pass| pass.destroy(backend));
    })
}

impl WorldRenderer {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let mut pre_depth = PreDepthPass::new(backend, config)?;
        let mut shadows = or_rollback(ShadowPass::new(backend, config), backend, &mut [&mut pre_depth])?;
        let mut opaque = or_rollback(
            OpaquePass::new(backend, config),
            backend,
            &mut [&mut pre_depth, &mut shadows],
        )?;
        let mut ssao = or_rollback(
            SsaoPass::new(backend, config, shaders),
            backend,
            &mut [&mut pre_depth, &mut shadows, &mut opaque],
        )?;
        let mut lighting = or_rollback(
            LightingPass::new(backend, config, shaders),
            backend,
            &mut [&mut pre_depth, &mut shadows, &mut opaque, &mut ssao],
        )?;
        let mut bloom = or_rollback(
            BloomPass::new(backend, config, shaders),
            backend,
            &mut [&mut pre_depth, &mut shadows, &mut opaque, &mut ssao, &mut lighting],
        )?;
        let mut particles = or_rollback(
            ParticlePass::new(backend, config, shaders),
            backend,
            &mut [&mut pre_depth, &mut shadows, &mut opaque, &mut ssao, &mut lighting, &mut bloom],
        )?;
        let mut forward = or_rollback(
            ForwardPass::new(backend, config),
            backend,
            &mut [
                &mut pre_depth,
                &mut shadows,
                &mut opaque,
                &mut ssao,
                &mut lighting,
                &mut bloom,
                &mut particles,
            ],
        )?;
        let mut physics_debug = or_rollback(
            PhysicsDebugPass::new(backend, config, shaders),
            backend,
            &mut [
                &mut pre_depth,
                &mut shadows,
                &mut opaque,
                &mut ssao,
                &mut lighting,
                &mut bloom,
                &mut particles,
                &mut forward,
            ],
        )?;
        let mut post_combine = or_rollback(
            PostCombinePass::new(backend, config, shaders),
            backend,
            &mut [
                &mut pre_depth,
                &mut shadows,
                &mut opaque,
                &mut ssao,
                &mut lighting,
                &mut bloom,
                &mut particles,
                &mut forward,
                &mut physics_debug,
            ],
        )?;
        let mut canvas = or_rollback(
            CanvasPass::new(backend, config, shaders),
            backend,
            &mut [
                &mut pre_depth,
                &mut shadows,
                &mut opaque,
                &mut ssao,
                &mut lighting,
                &mut bloom,
                &mut particles,
                &mut forward,
                &mut physics_debug,
                &mut post_combine,
            ],
        )?;
        let object_id = if config.tool_mode {
            Some(or_rollback(
                ObjectIdPass::new(backend, config, shaders),
                backend,
                &mut [
                    &mut pre_depth,
                    &mut shadows,
                    &mut opaque,
                    &mut ssao,
                    &mut lighting,
                    &mut bloom,
                    &mut particles,
                    &mut forward,
                    &mut physics_debug,
                    &mut post_combine,
                    &mut canvas,
                ],
            )?)
        } else {
            None
        };

        let mut world = Self {
            pre_depth,
            shadows,
            opaque,
            ssao,
            lighting,
            bloom,
            particles,
            forward,
            physics_debug,
            post_combine,
            canvas,
            object_id,
            tracker: ResourceStateTracker::new(),
            view: View::default(),
            resolution: config.resolution,
            warned_no_camera: false,
            stats: WorldStats::default(),
        };
        world.register_textures();
        log::debug!(
            "World renderer created at {}x{} ({} passes, tool mode {})",
            config.resolution.0,
            config.resolution.1,
            world.passes().len(),
            config.tool_mode
        );
        Ok(world)
    }

    fn passes(&self) -> Vec<&dyn RenderPass> {
        let mut passes: Vec<&dyn RenderPass> = vec![
            &self.pre_depth,
            &self.shadows,
            &self.opaque,
            &self.ssao,
            &self.lighting,
            &self.bloom,
            &self.particles,
            &self.forward,
            &self.physics_debug,
            &self.post_combine,
            &self.canvas,
        ];
        if let Some(object_id) = &self.object_id {
            passes.push(object_id);
        }
        passes
    }

    fn passes_mut(&mut self) -> Vec<&mut dyn RenderPass> {
        let mut passes: Vec<&mut dyn RenderPass> = vec![
            &mut self.pre_depth,
            &mut self.shadows,
            &mut self.opaque,
            &mut self.ssao,
            &mut self.lighting,
            &mut self.bloom,
            &mut self.particles,
            &mut self.forward,
            &mut self.physics_debug,
            &mut self.post_combine,
            &mut self.canvas,
        ];
        if let Some(object_id) = &mut self.object_id {
            passes.push(object_id);
        }
        passes
    }

    fn pass_textures(&self) -> Vec<TextureId> {
        self.passes()
            .iter()
            .flat_map(|pass| pass.textures())
            .collect()
    }

    fn register_textures(&mut self) {
        for texture in self.pass_textures() {
            self.tracker
                .register_texture(texture, ResourceState::ShaderRead, ResourceState::ShaderRead);
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn stats(&self) -> WorldStats {
        self.stats
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn is_tool_mode(&self) -> bool {
        self.object_id.is_some()
    }

    pub fn object_id(&self) -> Option<&ObjectIdPass> {
        self.object_id.as_ref()
    }

    /// Gpu-visible output indices of every pass for `frame_index`, as
    /// `(pass, target, index)`.
    pub fn targets(&self, frame_index: usize) -> Vec<(&'static str, &'static str, u32)> {
        self.passes()
            .iter()
            .flat_map(|pass| {
                let name = pass.name();
                pass.targets(frame_index)
                    .into_iter()
                    .map(move |(target, index)| (name, target, index))
            })
            .collect()
    }

    /// Build the frame's view and run every pass's CPU work.
    pub fn prepare(&mut self, backend: &dyn GfxBackend, proxies: &ProxyManager, frame_index: usize) {
        crate::profile_scope!("world::prepare");
        let (width, height) = self.resolution;
        let aspect = width as f32 / height.max(1) as f32;
        self.view = match proxies.main_camera() {
            Some(camera) => {
                self.warned_no_camera = false;
                View::from_camera(camera, aspect)
            }
            None => {
                if !self.warned_no_camera {
                    log::warn!("No main camera set, rendering with an identity view");
                    self.warned_no_camera = true;
                }
                View::default()
            }
        };
        let view = &self.view;

        let mut stats = WorldStats {
            depth: self.pre_depth.prepare(backend, proxies, view, frame_index),
            ..WorldStats::default()
        };
        self.shadows.prepare(backend, proxies, view, frame_index);
        stats.shadow_views = self.shadows.view_count();
        stats.skipped_shadow_views = self.shadows.skipped_views();
        stats.opaque = self.opaque.prepare(backend, proxies, view, frame_index);
        let view_lights: Vec<u32> = self.shadows.view_lights().collect();
        self.lighting
            .prepare(backend, proxies, &view_lights, frame_index);
        stats.lights = self.lighting.light_count();
        self.particles.prepare(backend, proxies, frame_index);
        stats.live_emitters = self.particles.live_emitters();
        stats.forward = self.forward.prepare(backend, proxies, view, frame_index);
        if let Some(object_id) = &mut self.object_id {
            stats.object_id = object_id.prepare(backend, proxies, view, frame_index);
        }
        self.physics_debug.prepare(backend, proxies, frame_index);
        stats.debug_lines = self.physics_debug.line_count();
        self.canvas.prepare(backend, proxies, frame_index);
        stats.canvas_quads = self.canvas.quad_count();
        self.stats = stats;
    }

    /// Record every pass and submit the frame's batches.
    ///
    /// The renderer submits nothing between `params.global_cb` and the end of
    /// this call, so the semaphore values here are the only rendezvous the
    /// two queues need.
    pub fn render(
        &mut self,
        backend: &dyn GfxBackend,
        proxies: &ProxyManager,
        frame_index: usize,
        semaphores: &mut QueueSemaphores,
        params: &RenderParams,
    ) -> WorldOutputs {
        crate::profile_scope!("world::render");
        let mut ctx = PassContext {
            backend,
            proxies,
            view: &self.view,
            frame_index,
            global_group: params.global_group,
            tracker: &mut self.tracker,
            time: params.time,
        };

        // Recorded in queue execution order so the tracker sees the same
        // transitions the GPU does.
        let depth = self.pre_depth.depth(frame_index);
        let depth_cb = self.pre_depth.render(&mut ctx);
        let shadow_cbs = self.shadows.render(&mut ctx);
        let opaque_cb = self.opaque.render(&mut ctx, depth);

        let gbuffer = self.opaque.gbuffer_indices(frame_index);
        let depth_index = self.pre_depth.depth_index(frame_index);
        let ssao_cb = self.ssao.render(&mut ctx, depth_index, gbuffer[1]);
        let simulate_cb = self.particles.simulate(&mut ctx);

        let inputs = LightingInputs {
            gbuffer,
            depth: depth_index,
            ambient_occlusion: self.ssao.output_index(frame_index),
            shadow_atlas: self.shadows.atlas_index(frame_index),
            shadow_data: self.shadows.shadow_data_index(frame_index),
        };
        let hdr = self.lighting.hdr(frame_index);
        let hdr_extent = self.lighting.hdr_extent();
        let lighting_cb = self.lighting.render(&mut ctx, &inputs);
        let forward_cb =
            self.forward
                .render(&mut ctx, hdr, depth, hdr_extent, !self.lighting.has_work());
        let particles_cb = self.particles.render(&mut ctx, hdr, depth, hdr_extent);
        let debug_cb = self.physics_debug.render(&mut ctx, depth);
        let object_id_cb = self
            .object_id
            .as_mut()
            .map(|object_id| object_id.render(&mut ctx, depth));

        let hdr_index = self.lighting.hdr_index(frame_index);
        let bloom_cb = self.bloom.render(&mut ctx, hdr_index);

        let post_cb = self
            .post_combine
            .render(&mut ctx, hdr_index, self.bloom.output_index(frame_index));
        let canvas_cb = self.canvas.render(
            &mut ctx,
            self.post_combine.world(frame_index),
            self.post_combine.world_extent(),
        );

        if cfg!(debug_assertions) {
            self.tracker.assert_all_resting();
        }

        let mut signals = Vec::with_capacity(4);
        let mut signal = |semaphores: &mut QueueSemaphores, which: Timeline, queue: QueueType| {
            let timeline = match which {
                Timeline::Ssao => &mut semaphores.ssao,
                Timeline::Lighting => &mut semaphores.lighting,
            };
            let value = timeline.signal(backend, queue);
            signals.push((timeline.name(), value));
            value
        };

        if let Some(copy) = params.copy_wait {
            semaphores.copy.wait(backend, QueueType::Graphics, copy);
        }
        let mut first = Vec::with_capacity(shadow_cbs.len() + 3);
        first.push(params.global_cb);
        first.push(depth_cb);
        first.extend(shadow_cbs);
        first.push(opaque_cb);
        submit(backend, QueueType::Graphics, &first);
        let gbuffer_ready = signal(semaphores, Timeline::Ssao, QueueType::Graphics);

        semaphores.ssao.wait(backend, QueueType::Compute, gbuffer_ready);
        submit(backend, QueueType::Compute, &[ssao_cb, simulate_cb]);
        let occlusion_ready = signal(semaphores, Timeline::Ssao, QueueType::Compute);

        semaphores.ssao.wait(backend, QueueType::Graphics, occlusion_ready);
        let mut shading = vec![lighting_cb, forward_cb, particles_cb, debug_cb];
        shading.extend(object_id_cb);
        submit(backend, QueueType::Graphics, &shading);
        let hdr_ready = signal(semaphores, Timeline::Lighting, QueueType::Graphics);

        semaphores.lighting.wait(backend, QueueType::Compute, hdr_ready);
        submit(backend, QueueType::Compute, &[bloom_cb]);
        let bloom_ready = signal(semaphores, Timeline::Lighting, QueueType::Compute);

        semaphores.lighting.wait(backend, QueueType::Graphics, bloom_ready);
        submit(backend, QueueType::Graphics, &[post_cb, canvas_cb]);

        WorldOutputs {
            world_index: self.post_combine.world_index(frame_index),
            debug_index: self.physics_debug.output_index(frame_index),
            editor_index: self
                .object_id
                .as_ref()
                .map(|object_id| object_id.editor_index(frame_index)),
            signals,
        }
    }

    /// Recreate every size-dependent target. The GPU must be idle.
    pub fn on_window_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        crate::profile_scope!("world::on_window_resize");
        for texture in self.pass_textures() {
            self.tracker.forget_texture(texture);
        }
        let result = self
            .passes_mut()
            .into_iter()
            .try_for_each(|pass| pass.on_resize(backend, width, height));
        // Whatever was recreated before a failure is still owned by its pass.
        self.register_textures();
        result?;
        self.resolution = (width, height);
        log::debug!("World renderer resized to {width}x{height}");
        Ok(())
    }

    pub fn on_window_event(&mut self, event: &WindowEvent) {
        if let Some(object_id) = &mut self.object_id {
            object_id.on_window_event(event);
        }
    }

    pub fn destroy(&mut self, backend: &dyn GfxBackend) {
        for texture in self.pass_textures() {
            self.tracker.forget_texture(texture);
        }
        self.passes_mut()
            .into_iter()
            .rev()
            .for_each(|pass| pass.destroy(backend));
    }
}

#[derive(Debug, Clone, Copy)]
enum Timeline {
    Ssao,
    Lighting,
}

fn submit(backend: &dyn GfxBackend, queue: QueueType, command_buffers: &[CommandBufferId]) {
    log::trace!("Submitting {} command buffers to {queue:?}", command_buffers.len());
    backend.submit_commands(queue, command_buffers);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyCapacities;
    use crate::gfx::{BindLayoutDesc, DummyBackend, DummyCall};

    fn world(tool_mode: bool) -> (DummyBackend, EngineShaders, WorldRenderer) {
        let backend = DummyBackend::new();
        let layout = backend.create_bind_layout(&BindLayoutDesc::default()).unwrap();
        let shaders = EngineShaders::new(&backend, layout).unwrap();
        let config = RendererConfig::default()
            .with_resolution(320, 180)
            .with_capacities(ProxyCapacities::small())
            .with_tool_mode(tool_mode);
        let world = WorldRenderer::new(&backend, &config, &shaders).unwrap();
        (backend, shaders, world)
    }

    #[test]
    fn test_tool_mode_adds_object_id_pass() {
        let (backend, shaders, mut plain) = world(false);
        assert!(!plain.is_tool_mode());
        assert!(plain.targets(0).iter().all(|(pass, _, _)| *pass != "object_id"));
        plain.destroy(&backend);
        shaders.destroy(&backend);

        let (backend, shaders, mut tool) = world(true);
        assert!(tool.is_tool_mode());
        assert!(tool.targets(0).iter().any(|(pass, _, _)| *pass == "object_id"));
        tool.destroy(&backend);
        shaders.destroy(&backend);
    }

    #[test]
    fn test_creation_failure_rolls_back() {
        let backend = DummyBackend::new();
        let layout = backend.create_bind_layout(&BindLayoutDesc::default()).unwrap();
        let shaders = EngineShaders::new(&backend, layout).unwrap();
        let before = backend.live_object_count();
        // A zero-sized quad buffer fails the canvas pass after every other
        // pass was created.
        let mut capacities = ProxyCapacities::small();
        capacities.canvas_items = 0;
        let config = RendererConfig::default()
            .with_resolution(64, 64)
            .with_capacities(capacities);
        assert!(WorldRenderer::new(&backend, &config, &shaders).is_err());
        assert_eq!(backend.live_object_count(), before);
        assert!(
            !backend
                .calls()
                .iter()
                .any(|call| matches!(call, DummyCall::Submit { .. }))
        );
    }
}
