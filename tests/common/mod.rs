//! Common utilities for renderer integration tests.
//!
//! Every test drives a real [`Renderer`] on top of the recording
//! [`DummyBackend`], feeding it event batches the way the simulation does.

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Affine3A, Vec3};
use render_core::events::{
    CameraPayload, EmitterPayload, EntityPayload, LightPayload, MAX_MATERIAL_SHADERS,
    MAX_MODEL_NODES, MaterialPayload, MeshPayload, ModelNode, ModelPayload, NO_INDEX,
    ShaderPayload, TexturePayload, Transform3x4,
};
use render_core::gfx::{CommandBufferId, CommandRecord, DummyCall, QueueType, TextureFormat};
use render_core::proxy::{EntityFlags, ShaderFlags};
use render_core::{
    DummyBackend, EventBatchWriter, EventStream, FrameReport, GfxBackend, ProxyCapacities,
    Renderer, RendererConfig,
};

/// Initialise test logging once. Output shows with `--nocapture`.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small configuration used by most tests.
pub fn test_config() -> RendererConfig {
    RendererConfig::default()
        .with_resolution(320, 180)
        .with_capacities(ProxyCapacities::small())
}

// ============================================================================
// Test Harness
// ============================================================================

/// A renderer, its backend and the event stream feeding it.
pub struct TestHarness {
    pub backend: Arc<DummyBackend>,
    pub stream: EventStream,
    pub renderer: Renderer,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        init_logger();
        let backend = Arc::new(DummyBackend::new());
        let gfx: Arc<dyn GfxBackend> = backend.clone();
        let renderer = Renderer::init(gfx, config).expect("renderer init");
        Self {
            backend,
            stream: EventStream::new(),
            renderer,
        }
    }

    /// Queue a batch for the next frame.
    pub fn push(&self, batch: EventBatchWriter) {
        self.stream.push_batch(batch.finish());
    }

    /// Render one frame.
    pub fn frame(&mut self) -> FrameReport {
        self.renderer.render_frame(&self.stream)
    }

    /// Queue `batch` and render one frame.
    pub fn frame_with(&mut self, batch: EventBatchWriter) -> FrameReport {
        self.push(batch);
        self.frame()
    }

    /// Render `count` frames without new events.
    pub fn frames(&mut self, count: usize) -> Vec<FrameReport> {
        (0..count).map(|_| self.frame()).collect()
    }

    /// Shut the renderer down, returning the backend for leak checks.
    pub fn shutdown(self) -> Arc<DummyBackend> {
        self.renderer.shutdown();
        self.backend
    }

    /// Every submission logged since the last `take_calls`, with the
    /// command buffer labels.
    pub fn take_submissions(&self) -> Vec<(QueueType, Vec<String>)> {
        self.backend
            .take_calls()
            .into_iter()
            .filter_map(|call| match call {
                DummyCall::Submit {
                    queue,
                    command_buffers,
                } => Some((
                    queue,
                    command_buffers
                        .iter()
                        .map(|cb| self.label(*cb))
                        .collect(),
                )),
                _ => None,
            })
            .collect()
    }

    pub fn label(&self, cb: CommandBufferId) -> String {
        self.backend
            .command_buffer_info(cb)
            .map(|(label, _)| label)
            .unwrap_or_default()
    }

    /// Commands last recorded into the pass command buffer of `slot`.
    pub fn pass_commands(&self, pass: &str, slot: usize) -> Vec<CommandRecord> {
        let label = format!("{pass}[{slot}]");
        let cb = self
            .backend
            .command_buffers_labeled(&label)
            .into_iter()
            .find(|cb| self.label(*cb) == label)
            .unwrap_or_else(|| panic!("no command buffer labeled {label}"));
        self.backend.commands(cb)
    }
}

// ============================================================================
// Scene Content
// ============================================================================

pub const TEXTURE: u32 = 0;
pub const BASE_SHADER: u32 = 0;
pub const DEPTH_SHADER: u32 = 1;
pub const MATERIAL: u32 = 0;
pub const CUBE: u32 = 0;
pub const MODEL: u32 = 0;
pub const CAMERA: u32 = 0;

pub fn texture_payload() -> TexturePayload {
    TexturePayload {
        width: 4,
        height: 4,
        mip_levels: 1,
        array_layers: 1,
        format: TextureFormat::Rgba8Unorm as u32,
    }
}

pub fn material_payload(shaders: &[u32], texture: u32, priority: u32) -> MaterialPayload {
    let mut payload = MaterialPayload {
        shaders: [NO_INDEX; MAX_MATERIAL_SHADERS],
        shader_count: shaders.len() as u32,
        textures: [texture, NO_INDEX, NO_INDEX, NO_INDEX],
        sampler: NO_INDEX,
        base_color: [1.0; 4],
        blend: 0,
        priority,
    };
    payload.shaders[..shaders.len()].copy_from_slice(shaders);
    payload
}

pub fn cube_payload() -> MeshPayload {
    MeshPayload {
        vertex_count: 8,
        index_count: 36,
        vertex_stride: 12,
        index_format: 0,
        aabb_min: [-0.5; 3],
        aabb_max: [0.5; 3],
    }
}

pub fn entity_payload(position: Vec3) -> EntityPayload {
    EntityPayload {
        model: MODEL,
        flags: (EntityFlags::VISIBLE | EntityFlags::CAST_SHADOWS).bits(),
        transform: Transform3x4::from_translation(position),
    }
}

/// Camera at `eye` looking at the origin.
pub fn camera_payload(eye: Vec3) -> CameraPayload {
    CameraPayload {
        transform: Transform3x4::from_affine(
            &Affine3A::look_at_rh(eye, Vec3::ZERO, Vec3::Y).inverse(),
        ),
        fov_y: 60f32.to_radians(),
        near: 0.1,
        far: 100.0,
        orthographic: 0,
        ortho_height: 0.0,
    }
}

pub fn point_light(position: Vec3, cast_shadows: bool) -> LightPayload {
    LightPayload {
        transform: Transform3x4::from_translation(position),
        color: [1.0; 3],
        intensity: 5.0,
        range: 10.0,
        inner_cone: 0.0,
        outer_cone: 0.0,
        kind: 1,
        cast_shadows: cast_shadows as u32,
    }
}

pub fn emitter_payload() -> EmitterPayload {
    EmitterPayload {
        transform: Transform3x4::IDENTITY,
        color: [1.0; 4],
        max_particles: 128,
        spawn_rate: 16.0,
        lifetime: 1.0,
        size: 0.1,
    }
}

/// Shaders, a material, a cube model and a main camera. No entities and no
/// lights.
pub fn content_batch() -> EventBatchWriter {
    let mut batch = EventBatchWriter::new();
    batch.create_texture(TEXTURE, &texture_payload(), &[0xFF; 64]);
    batch.create_shader(
        BASE_SHADER,
        &ShaderPayload {
            flags: 0,
            blend: 0,
            asset_hash: 1,
        },
    );
    batch.create_shader(
        DEPTH_SHADER,
        &ShaderPayload {
            flags: (ShaderFlags::DEPTH_ONLY | ShaderFlags::SHADOW | ShaderFlags::OBJECT_ID).bits(),
            blend: 0,
            asset_hash: 2,
        },
    );
    batch.create_material(
        MATERIAL,
        &material_payload(&[BASE_SHADER, DEPTH_SHADER], TEXTURE, 0),
    );
    batch.create_mesh(CUBE, &cube_payload(), &[0; 96], &[0; 72]);
    let mut nodes = [ModelNode::default(); MAX_MODEL_NODES];
    nodes[0] = ModelNode {
        mesh: CUBE,
        material: MATERIAL,
    };
    batch.create_model(MODEL, &ModelPayload { node_count: 1, nodes });
    batch.create_camera(CAMERA, &camera_payload(Vec3::new(0.0, 4.0, 12.0)));
    batch.set_main_camera(CAMERA);
    batch
}

/// Content plus `count` entities in a row in front of the camera.
pub fn scene_batch(count: u32) -> EventBatchWriter {
    let mut batch = content_batch();
    for index in 0..count {
        let x = index as f32 - count as f32 * 0.5;
        batch.create_entity(index, &entity_payload(Vec3::new(x, 0.0, 0.0)));
    }
    batch
}

/// Number of draw or dispatch commands in `commands`.
pub fn work_count(commands: &[CommandRecord]) -> usize {
    commands.iter().filter(|command| command.is_work()).count()
}
