//! Headless driver: renders a small animated scene on the recording backend.
//!
//! ```text
//! cargo run --bin headless -- --frames 120 --entities 256 --tool-mode
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{Affine3A, Quat, Vec3};
use render_core::events::{
    CameraPayload, CanvasItemPayload, DebugLine, EmitterPayload, EntityPayload, LightPayload,
    MAX_MATERIAL_SHADERS, MAX_MODEL_NODES, MaterialPayload, MeshPayload, ModelNode, ModelPayload,
    NO_INDEX, ShaderPayload, TexturePayload, Transform3x4,
};
use render_core::gfx::TextureFormat;
use render_core::proxy::{EntityFlags, ShaderFlags};
use render_core::{
    DummyBackend, EventBatchWriter, EventStream, GfxBackend, RenderThread, Renderer,
    RendererConfig, SwapchainFlags,
};

/// Headless render-core driver.
#[derive(Parser, Debug)]
#[command(
    name = "headless",
    about = "Render an animated scene on the recording backend",
    version
)]
struct Args {
    /// Render width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Render height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Exit after rendering N frames.
    #[arg(long, default_value = "60")]
    frames: u64,

    /// Wait for vertical blank when presenting.
    #[arg(long)]
    vsync: bool,

    /// Enable the object-id pass and the editor target.
    #[arg(long)]
    tool_mode: bool,

    /// Number of animated entities in the scene.
    #[arg(long, default_value = "64")]
    entities: u32,
}

const CUBE_MESH: u32 = 0;
const MATERIAL: u32 = 0;
const MODEL: u32 = 0;
const CAMERA: u32 = 0;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = RendererConfig::default()
        .with_resolution(args.width, args.height)
        .with_swapchain_flags(if args.vsync {
            SwapchainFlags::VSYNC
        } else {
            SwapchainFlags::empty()
        })
        .with_tool_mode(args.tool_mode);
    if args.entities as usize > config.capacities.entities {
        log::error!(
            "--entities {} exceeds the entity capacity {}",
            args.entities,
            config.capacities.entities
        );
        return ExitCode::FAILURE;
    }

    let backend = Arc::new(DummyBackend::new());
    backend.set_call_log(false);
    let gfx: Arc<dyn GfxBackend> = backend.clone();
    let renderer = match Renderer::init(gfx, config) {
        Ok(renderer) => renderer,
        Err(err) => {
            log::error!("Failed to initialize the renderer: {err}");
            return ExitCode::FAILURE;
        }
    };

    let stream = Arc::new(EventStream::new());
    stream.push_batch(scene_batch(args.entities).finish());

    let mut thread = RenderThread::new(renderer, Arc::clone(&stream));
    let timing = Arc::clone(thread.timing());
    if let Err(err) = thread.kick_off_render() {
        log::error!("Failed to start the render thread: {err}");
        thread.shutdown();
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    let mut last = start;
    for frame in 0..args.frames {
        let now = Instant::now();
        timing.set_time(
            now.duration_since(last).as_secs_f32(),
            now.duration_since(start).as_secs_f32(),
        );
        last = now;
        stream.push_batch(animation_batch(args.entities, frame).finish());
        timing.advance_simulation();
        thread.notify();
        // Keep the simulation at most one frame ahead.
        while timing.render_frame() < frame + 1 {
            std::thread::sleep(Duration::from_micros(100));
        }
    }
    thread.join_render();

    let elapsed = start.elapsed();
    log::info!(
        "Rendered {} frames in {:.2?} ({:.1} fps)",
        timing.render_frame(),
        elapsed,
        timing.render_frame() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    thread.shutdown();

    let leaked = backend.live_object_count();
    if leaked != 0 {
        log::error!("{leaked} GPU objects leaked");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Static content: one cube model, a camera, lights, an emitter and a canvas
/// overlay.
fn scene_batch(entities: u32) -> EventBatchWriter {
    let mut batch = EventBatchWriter::new();

    batch.create_texture(
        0,
        &TexturePayload {
            width: 4,
            height: 4,
            mip_levels: 1,
            array_layers: 1,
            format: TextureFormat::Rgba8Unorm as u32,
        },
        &[0xFF; 64],
    );
    batch.create_shader(
        0,
        &ShaderPayload {
            flags: 0,
            blend: 0,
            asset_hash: 0x0BA5E,
        },
    );
    batch.create_shader(
        1,
        &ShaderPayload {
            flags: (ShaderFlags::DEPTH_ONLY | ShaderFlags::SHADOW | ShaderFlags::OBJECT_ID).bits(),
            blend: 0,
            asset_hash: 0xDE97,
        },
    );
    let mut shaders = [NO_INDEX; MAX_MATERIAL_SHADERS];
    shaders[..2].copy_from_slice(&[0, 1]);
    batch.create_material(
        MATERIAL,
        &MaterialPayload {
            shaders,
            shader_count: 2,
            textures: [0, NO_INDEX, NO_INDEX, NO_INDEX],
            sampler: NO_INDEX,
            base_color: [0.8, 0.3, 0.2, 1.0],
            blend: 0,
            priority: 0,
        },
    );

    let (vertices, indices) = cube();
    batch.create_mesh(
        CUBE_MESH,
        &MeshPayload {
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            vertex_stride: std::mem::size_of::<[f32; 3]>() as u32,
            index_format: 0,
            aabb_min: [-0.5; 3],
            aabb_max: [0.5; 3],
        },
        bytemuck::cast_slice(&vertices),
        bytemuck::cast_slice(&indices),
    );
    let mut nodes = [ModelNode::default(); MAX_MODEL_NODES];
    nodes[0] = ModelNode {
        mesh: CUBE_MESH,
        material: MATERIAL,
    };
    batch.create_model(MODEL, &ModelPayload { node_count: 1, nodes });

    for index in 0..entities {
        batch.create_entity(
            index,
            &EntityPayload {
                model: MODEL,
                flags: (EntityFlags::VISIBLE | EntityFlags::CAST_SHADOWS).bits(),
                transform: entity_transform(index, entities, 0),
            },
        );
    }

    let eye = Vec3::new(0.0, 8.0, 24.0);
    batch.create_camera(
        CAMERA,
        &CameraPayload {
            transform: Transform3x4::from_affine(
                &Affine3A::look_at_rh(eye, Vec3::ZERO, Vec3::Y).inverse(),
            ),
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 200.0,
            orthographic: 0,
            ortho_height: 0.0,
        },
    );
    batch.set_main_camera(CAMERA);

    batch.create_light(
        0,
        &LightPayload {
            transform: Transform3x4::from_affine(&Affine3A::from_rotation_x(-0.9)),
            color: [1.0, 0.95, 0.9],
            intensity: 3.0,
            range: 0.0,
            inner_cone: 0.0,
            outer_cone: 0.0,
            kind: 0,
            cast_shadows: 1,
        },
    );
    batch.create_light(
        1,
        &LightPayload {
            transform: Transform3x4::from_translation(Vec3::new(0.0, 3.0, 0.0)),
            color: [0.2, 0.4, 1.0],
            intensity: 10.0,
            range: 12.0,
            inner_cone: 0.0,
            outer_cone: 0.0,
            kind: 1,
            cast_shadows: 1,
        },
    );

    batch.create_emitter(
        0,
        &EmitterPayload {
            transform: Transform3x4::from_translation(Vec3::new(0.0, 1.0, 0.0)),
            color: [1.0, 0.6, 0.1, 1.0],
            max_particles: 512,
            spawn_rate: 64.0,
            lifetime: 2.0,
            size: 0.1,
        },
    );
    batch.create_canvas_item(
        0,
        &CanvasItemPayload {
            rect: [16.0, 16.0, 200.0, 32.0],
            color: [0.0, 0.0, 0.0, 0.5],
            texture: NO_INDEX,
            layer: 0,
        },
    );
    batch
}

/// Per-frame transform updates plus a fresh set of debug lines.
fn animation_batch(entities: u32, frame: u64) -> EventBatchWriter {
    let mut batch = EventBatchWriter::new();
    for index in 0..entities {
        batch.update_entity_transform(index, &entity_transform(index, entities, frame));
    }
    let lines: Vec<DebugLine> = (0..entities.min(16))
        .map(|index| {
            let start = entity_transform(index, entities, frame).translation();
            DebugLine {
                start: start.to_array(),
                end: (start + Vec3::Y).to_array(),
                color: 0xFF00FF00,
            }
        })
        .collect();
    batch.set_physics_debug_lines(&lines);
    batch
}

/// Entities spin on a square grid centred on the origin.
fn entity_transform(index: u32, count: u32, frame: u64) -> Transform3x4 {
    let side = (count as f32).sqrt().ceil().max(1.0) as u32;
    let x = (index % side) as f32 - side as f32 * 0.5;
    let z = (index / side) as f32 - side as f32 * 0.5;
    let angle = frame as f32 * 0.02 + index as f32 * 0.1;
    Transform3x4::from_affine(&Affine3A::from_rotation_translation(
        Quat::from_rotation_y(angle),
        Vec3::new(x * 1.5, 0.5, z * 1.5),
    ))
}

fn cube() -> (Vec<[f32; 3]>, Vec<u16>) {
    let vertices = (0..8)
        .map(|corner| {
            [
                if corner & 1 == 0 { -0.5 } else { 0.5 },
                if corner & 2 == 0 { -0.5 } else { 0.5 },
                if corner & 4 == 0 { -0.5 } else { 0.5 },
            ]
        })
        .collect();
    let indices = vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    (vertices, indices)
}
