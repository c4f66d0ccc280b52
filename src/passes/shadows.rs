//! Shadow atlas rendering.
//!
//! Every shadow-casting light gets one view (directional, spot) or six views
//! (point) in a fixed-size depth atlas. Tiles are handed out in light order
//! until the atlas is full; a light whose views no longer fit is skipped for
//! the frame.
//!
//! Views are recorded into `ShadowConfig::command_buffer_count` command
//! buffers, view `i` going to shard `i % shards`. Shards are submitted in
//! order on the graphics queue, so the first shard transitions and clears the
//! atlas and the last one returns it to rest.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use super::{DrawPushConstants, PassCommandBuffers, PassContext, RenderPass, SlotBuffers, SlotTargets, TargetSpec};
use crate::config::{RendererConfig, ShadowConfig, formats};
use crate::error::BackendResult;
use crate::frame::FrameBumpAllocator;
use crate::gfx::{
    BindPoint, BufferUsage, CommandBufferId, DepthAttachment, GfxBackend, LoadOp, QueueType,
    RenderPassDesc, ResourceState, StoreOp, TextureId, TextureUsage, Viewport,
};
use crate::proxy::{LightKind, LightProxy, ProxyManager, ShaderFlags};
use crate::scene::{DrawFilter, DrawStream, RenderableCollector, View};

/// Near plane of perspective shadow views.
const SHADOW_NEAR: f32 = 0.05;
/// Half extent of a directional light's shadow box when the light has no range.
const DEFAULT_DIRECTIONAL_RADIUS: f32 = 50.0;

/// Per-view record read by the lighting shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowData {
    pub view_proj: Mat4,
    /// Atlas tile as `(u, v, width, height)` in normalized coordinates.
    pub atlas_rect: Vec4,
}

#[derive(Debug, Clone, Copy)]
struct ShadowView {
    light: u32,
    view: View,
    viewport: Viewport,
}

pub struct ShadowPass {
    config: ShadowConfig,
    atlas: SlotTargets,
    shadow_data: SlotBuffers,
    instances: SlotBuffers,
    arena: FrameBumpAllocator,
    streams: Vec<DrawStream>,
    views: Vec<ShadowView>,
    skipped_views: usize,
    shards: Vec<PassCommandBuffers>,
}

impl ShadowPass {
    pub fn new(backend: &dyn GfxBackend, config: &RendererConfig) -> BackendResult<Self> {
        let shadow = config.shadow;
        let tile_count = shadow.tile_count();
        let atlas = SlotTargets::new(
            backend,
            TargetSpec::new(
                "shadow_atlas",
                formats::SHADOW_ATLAS,
                TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED,
            )
            .fixed(shadow.atlas_size, shadow.atlas_size),
            shadow.atlas_size,
            shadow.atlas_size,
        )?;
        let shadow_data = SlotBuffers::new(
            backend,
            "shadow_data",
            (tile_count * std::mem::size_of::<ShadowData>()) as u64,
            BufferUsage::STORAGE,
        )
        .inspect_err(|_| atlas.destroy(backend))?;
        let instances = SlotBuffers::new(
            backend,
            "shadow instances",
            config.frame_arena_size,
            BufferUsage::STORAGE,
        )
        .inspect_err(|_| {
            shadow_data.destroy(backend);
            atlas.destroy(backend);
        })?;

        let mut shards: Vec<PassCommandBuffers> = Vec::with_capacity(shadow.command_buffer_count);
        for shard in 0..shadow.command_buffer_count {
            match PassCommandBuffers::new(backend, QueueType::Graphics, &format!("shadows{shard}")) {
                Ok(cbs) => shards.push(cbs),
                Err(err) => {
                    shards.iter().for_each(|cbs| cbs.destroy(backend));
                    instances.destroy(backend);
                    shadow_data.destroy(backend);
                    atlas.destroy(backend);
                    return Err(err);
                }
            }
        }

        Ok(Self {
            config: shadow,
            atlas,
            shadow_data,
            instances,
            arena: FrameBumpAllocator::new("shadow instances", config.frame_arena_size),
            streams: (0..tile_count)
                .map(|_| DrawStream::new("shadow view", config.max_draws_per_pass))
                .collect(),
            views: Vec::with_capacity(tile_count),
            skipped_views: 0,
            shards,
        })
    }

    pub fn atlas(&self, frame_index: usize) -> TextureId {
        self.atlas.get(frame_index).texture
    }

    pub fn atlas_index(&self, frame_index: usize) -> u32 {
        self.atlas.get(frame_index).gpu_index
    }

    pub fn shadow_data_index(&self, frame_index: usize) -> u32 {
        self.shadow_data.gpu_index(frame_index)
    }

    /// Number of views rendered this frame.
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Views that did not fit in the atlas this frame.
    pub fn skipped_views(&self) -> usize {
        self.skipped_views
    }

    /// Light index of every view, in tile order.
    pub fn view_lights(&self) -> impl Iterator<Item = u32> + '_ {
        self.views.iter().map(|view| view.light)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Assign atlas tiles, cull every view and upload the shadow data.
    pub fn prepare(
        &mut self,
        backend: &dyn GfxBackend,
        proxies: &ProxyManager,
        camera: &View,
        frame_index: usize,
    ) {
        crate::profile_scope!("shadows::prepare");
        self.views.clear();
        self.arena.reset();
        self.skipped_views = 0;
        let tile_count = self.config.tile_count();
        let per_row = (self.config.atlas_size / self.config.tile_size) as usize;
        let tile = self.config.tile_size as f32;
        let atlas = self.config.atlas_size as f32;

        for (index, light) in proxies.lights().iter_active() {
            if !light.cast_shadows {
                continue;
            }
            let needed = light.kind.shadow_view_count();
            if self.views.len() + needed > tile_count {
                self.skipped_views += needed;
                continue;
            }
            for view in light_views(light, camera) {
                let slot = self.views.len();
                let (column, row) = (slot % per_row, slot / per_row);
                self.views.push(ShadowView {
                    light: index,
                    view,
                    viewport: Viewport {
                        x: column as f32 * tile,
                        y: row as f32 * tile,
                        width: tile,
                        height: tile,
                    },
                });
            }
        }
        if self.skipped_views > 0 {
            log::warn!(
                "{} shadow views skipped, the atlas holds {} tiles",
                self.skipped_views,
                tile_count
            );
        }

        let mut data = Vec::with_capacity(self.views.len());
        for (slot, shadow_view) in self.views.iter().enumerate() {
            let stream = &mut self.streams[slot];
            stream.clear();
            RenderableCollector::collect(
                proxies,
                &shadow_view.view,
                DrawFilter::ShadowCasters,
                ShaderFlags::SHADOW,
                frame_index,
                stream,
                &mut self.arena,
            );
            stream.sort();
            let viewport = shadow_view.viewport;
            data.push(ShadowData {
                view_proj: shadow_view.view.view_proj,
                atlas_rect: Vec4::new(
                    viewport.x / atlas,
                    viewport.y / atlas,
                    viewport.width / atlas,
                    viewport.height / atlas,
                ),
            });
        }
        self.arena.flush(backend, self.instances.get(frame_index));
        self.shadow_data
            .write(backend, frame_index, bytemuck::cast_slice(&data));
    }

    /// Record every shard. Returns the shard command buffers in submission
    /// order; shards without views are closed empty.
    pub fn render(&self, ctx: &mut PassContext<'_>) -> Vec<CommandBufferId> {
        crate::profile_scope!("shadows::render");
        let backend = ctx.backend;
        let frame_index = ctx.frame_index;
        let cbs: Vec<CommandBufferId> = self
            .shards
            .iter()
            .map(|shard| shard.begin(backend, frame_index))
            .collect();

        if !self.views.is_empty() {
            let atlas = self.atlas(frame_index);
            let instance_buffer = self.instances.gpu_index(frame_index);
            ctx.tracker.texture(atlas, ResourceState::DepthWrite);
            ctx.flush_barriers(cbs[0]);

            for (shard, &cb) in cbs.iter().enumerate() {
                let views: Vec<usize> = (shard..self.views.len())
                    .step_by(cbs.len())
                    .collect();
                if views.is_empty() && shard != 0 {
                    continue;
                }
                let load = if shard == 0 {
                    LoadOp::Clear([1.0, 0.0, 0.0, 0.0])
                } else {
                    LoadOp::Load
                };
                backend.cmd_begin_render_pass(
                    cb,
                    &RenderPassDesc {
                        label: "shadows",
                        color: vec![],
                        depth: Some(DepthAttachment {
                            texture: atlas,
                            load,
                            store: StoreOp::Store,
                            read_only: false,
                        }),
                    },
                );
                ctx.bind_globals(cb, BindPoint::Graphics);
                for slot in views {
                    let stream = &self.streams[slot];
                    if stream.is_empty() {
                        continue;
                    }
                    backend.cmd_set_viewport(cb, &self.views[slot].viewport);
                    let constants = DrawPushConstants {
                        instance_buffer,
                        view_index: slot as u32,
                        _pad: [0; 2],
                    };
                    backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
                    stream.record(backend, cb);
                }
                backend.cmd_end_render_pass(cb);
            }

            ctx.tracker.rest_texture(atlas);
            if let Some(&last) = cbs.last() {
                ctx.flush_barriers(last);
            }
        }

        cbs.iter().for_each(|cb| backend.end_commands(*cb));
        cbs
    }
}

/// Views a light renders its shadows from.
fn light_views(light: &LightProxy, camera: &View) -> Vec<View> {
    let position = light.transform.w_axis.xyz();
    let direction = (-light.transform.z_axis.xyz()).try_normalize().unwrap_or(Vec3::NEG_Z);
    let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let far = light.range.max(SHADOW_NEAR * 2.0);

    match light.kind {
        LightKind::Directional => {
            let radius = if light.range > 0.0 {
                light.range
            } else {
                DEFAULT_DIRECTIONAL_RADIUS
            };
            let center = camera.position;
            let view = Mat4::look_at_rh(center - direction * radius, center, up);
            let projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 2.0);
            vec![View::from_matrices(view, projection)]
        }
        LightKind::Spot => {
            let fov = (light.outer_cone * 2.0).clamp(0.01, std::f32::consts::PI - 0.01);
            let view = Mat4::look_at_rh(position, position + direction, up);
            let projection = Mat4::perspective_rh(fov, 1.0, SHADOW_NEAR, far);
            vec![View::from_matrices(view, projection)]
        }
        LightKind::Point => {
            let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, SHADOW_NEAR, far);
            [
                (Vec3::X, Vec3::NEG_Y),
                (Vec3::NEG_X, Vec3::NEG_Y),
                (Vec3::Y, Vec3::Z),
                (Vec3::NEG_Y, Vec3::NEG_Z),
                (Vec3::Z, Vec3::NEG_Y),
                (Vec3::NEG_Z, Vec3::NEG_Y),
            ]
            .into_iter()
            .map(|(face, face_up)| {
                View::from_matrices(Mat4::look_at_rh(position, position + face, face_up), projection)
            })
            .collect()
        }
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &'static str {
        "shadows"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.atlas.textures().collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![
            ("shadow_atlas", self.atlas_index(frame_index)),
            ("shadow_data", self.shadow_data_index(frame_index)),
        ]
    }

    fn on_resize(&mut self, _backend: &dyn GfxBackend, _width: u32, _height: u32) -> BackendResult<()> {
        // The atlas has a fixed size.
        Ok(())
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.shards.iter().for_each(|cbs| cbs.destroy(backend));
        self.instances.destroy(backend);
        self.shadow_data.destroy(backend);
        self.atlas.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_light_has_six_views() {
        let light = LightProxy {
            kind: LightKind::Point,
            range: 10.0,
            cast_shadows: true,
            ..Default::default()
        };
        let views = light_views(&light, &View::default());
        assert_eq!(views.len(), 6);
        // Each face sees a point one unit along its axis.
        assert!(views[0].frustum.intersects_sphere(Vec3::X * 2.0, 0.1));
        assert!(!views[0].frustum.intersects_sphere(Vec3::NEG_X * 2.0, 0.1));
    }

    #[test]
    fn test_spot_light_looks_along_negative_z() {
        let light = LightProxy {
            kind: LightKind::Spot,
            range: 20.0,
            outer_cone: 0.5,
            ..Default::default()
        };
        let views = light_views(&light, &View::default());
        assert!(views[0].frustum.intersects_sphere(Vec3::new(0.0, 0.0, -5.0), 0.1));
        assert!(!views[0].frustum.intersects_sphere(Vec3::new(0.0, 0.0, 5.0), 0.1));
    }
}
