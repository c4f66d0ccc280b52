//! Deferred lighting.
//!
//! Accumulates every active light and the ambient term into the HDR target
//! with one fullscreen triangle. GBuffer, depth, occlusion and shadow inputs
//! are passed as bindless indices through push constants.
//!
//! A frame with no lights and a black ambient term records nothing: the
//! command buffer is closed empty and the forward pass clears the HDR target
//! instead of loading it.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4, Vec4Swizzles};
use static_assertions::const_assert_eq;

use super::{
    EngineShaders, PassCommandBuffers, PassContext, RenderPass, SlotBuffers, SlotTargets,
    TargetSpec,
};
use crate::config::{RendererConfig, formats};
use crate::error::BackendResult;
use crate::gfx::{
    BindPoint, BufferUsage, ColorAttachment, CommandBufferId, GfxBackend, PipelineId, QueueType,
    RenderPassDesc, ResourceState, TextureId, TextureUsage, Viewport,
};
use crate::proxy::{AmbientLight, LightKind, LightProxy, ProxyManager};

const HDR: TargetSpec = TargetSpec::new(
    "hdr",
    formats::HDR,
    TextureUsage::RENDER_TARGET
        .union(TextureUsage::SAMPLED)
        .union(TextureUsage::STORAGE),
);

/// Shadow view index meaning "not shadowed".
const NO_SHADOW: f32 = -1.0;

/// Light record read by the lighting shader, 64 bytes (4 Vec4s).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    /// xyz: world position, w: range.
    pub position_range: Vec4,
    /// xyz: direction the light shines along, w: kind.
    pub direction_kind: Vec4,
    /// rgb: color, a: intensity.
    pub color_intensity: Vec4,
    /// x: cos inner cone, y: cos outer cone, z: first shadow view or -1,
    /// w: shadow view count.
    pub cone_shadow: Vec4,
}

const_assert_eq!(std::mem::size_of::<GpuLight>(), 64);

impl GpuLight {
    pub fn new(light: &LightProxy, first_shadow_view: Option<usize>) -> Self {
        let direction = (-light.transform.z_axis.xyz()).try_normalize().unwrap_or(Vec3::NEG_Z);
        let (shadow_view, shadow_count) = match first_shadow_view {
            Some(first) => (first as f32, light.kind.shadow_view_count() as f32),
            None => (NO_SHADOW, 0.0),
        };
        Self {
            position_range: light.transform.w_axis.xyz().extend(light.range),
            direction_kind: direction.extend(light.kind as u32 as f32),
            color_intensity: light.color.extend(light.intensity),
            cone_shadow: Vec4::new(light.inner_cone.cos(), light.outer_cone.cos(), shadow_view, shadow_count),
        }
    }

    pub fn kind(&self) -> LightKind {
        LightKind::from_raw(self.direction_kind.w as u32)
    }
}

/// Bindless indices of every lighting input for one frame slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct LightingInputs {
    pub gbuffer: [u32; 4],
    pub depth: u32,
    pub ambient_occlusion: u32,
    pub shadow_atlas: u32,
    pub shadow_data: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightingConstants {
    inputs: LightingInputs,
    light_buffer: u32,
    light_count: u32,
    _pad: [u32; 2],
    ambient: Vec4,
}

pub struct LightingPass {
    pipeline: PipelineId,
    hdr: SlotTargets,
    lights: SlotBuffers,
    max_lights: usize,
    light_count: usize,
    ambient: AmbientLight,
    command_buffers: PassCommandBuffers,
}

impl LightingPass {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let max_lights = config.capacities.lights;
        let hdr = SlotTargets::new(backend, HDR, width, height)?;
        let lights = SlotBuffers::new(
            backend,
            "light list",
            (max_lights * std::mem::size_of::<GpuLight>()) as u64,
            BufferUsage::STORAGE,
        )
        .inspect_err(|_| hdr.destroy(backend))?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "lighting")
            .inspect_err(|_| {
                lights.destroy(backend);
                hdr.destroy(backend);
            })?;
        Ok(Self {
            pipeline: shaders.lighting,
            hdr,
            lights,
            max_lights,
            light_count: 0,
            ambient: AmbientLight::default(),
            command_buffers,
        })
    }

    pub fn hdr(&self, frame_index: usize) -> TextureId {
        self.hdr.get(frame_index).texture
    }

    pub fn hdr_index(&self, frame_index: usize) -> u32 {
        self.hdr.get(frame_index).gpu_index
    }

    pub fn hdr_extent(&self) -> (u32, u32) {
        self.hdr.extent()
    }

    pub fn light_count(&self) -> usize {
        self.light_count
    }

    /// Whether this frame has anything to light.
    pub fn has_work(&self) -> bool {
        self.light_count > 0 || !self.ambient.is_black()
    }

    /// Build the slot's light list. `shadow_view_lights` holds the light
    /// index of every shadow view in tile order.
    pub fn prepare(
        &mut self,
        backend: &dyn GfxBackend,
        proxies: &ProxyManager,
        shadow_view_lights: &[u32],
        frame_index: usize,
    ) {
        crate::profile_scope!("lighting::prepare");
        let lights: Vec<GpuLight> = proxies
            .lights()
            .iter_active()
            .map(|(index, light)| {
                let first_view = shadow_view_lights.iter().position(|&owner| owner == index);
                GpuLight::new(light, first_view)
            })
            .collect();
        assert!(
            lights.len() <= self.max_lights,
            "{} active lights exceed the light list capacity {}",
            lights.len(),
            self.max_lights
        );
        self.lights
            .write(backend, frame_index, bytemuck::cast_slice(&lights));
        self.light_count = lights.len();
        self.ambient = proxies.ambient_light();
    }

    pub fn render(&self, ctx: &mut PassContext<'_>, inputs: &LightingInputs) -> CommandBufferId {
        crate::profile_scope!("lighting::render");
        let backend = ctx.backend;
        let frame_index = ctx.frame_index;
        let cb = self.command_buffers.begin(backend, frame_index);
        if !self.has_work() {
            log::trace!("lighting: nothing to light, closing empty");
            backend.end_commands(cb);
            return cb;
        }

        let hdr = self.hdr(frame_index);
        ctx.tracker.texture(hdr, ResourceState::RenderTarget);
        ctx.flush_barriers(cb);
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "lighting",
                color: vec![ColorAttachment::clear(hdr, [0.0; 4])],
                depth: None,
            },
        );
        let (width, height) = self.hdr.extent();
        backend.cmd_set_viewport(cb, &Viewport::from_dimensions(width, height));
        ctx.bind_globals(cb, BindPoint::Graphics);
        backend.cmd_bind_pipeline(cb, self.pipeline);
        let constants = LightingConstants {
            inputs: *inputs,
            light_buffer: self.lights.gpu_index(frame_index),
            light_count: self.light_count as u32,
            _pad: [0; 2],
            ambient: (self.ambient.color * self.ambient.intensity).extend(1.0),
        };
        backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
        backend.cmd_draw(cb, 3, 1, 0, 0);
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(hdr);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &'static str {
        "lighting"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.hdr.textures().collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![
            ("hdr", self.hdr_index(frame_index)),
            ("light_list", self.lights.gpu_index(frame_index)),
        ]
    }

    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        self.hdr.resize(backend, width, height)
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.lights.destroy(backend);
        self.hdr.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn test_gpu_light_layout() {
        let light = LightProxy {
            kind: LightKind::Spot,
            transform: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            color: Vec3::ONE,
            intensity: 4.0,
            range: 10.0,
            ..Default::default()
        };
        let gpu = GpuLight::new(&light, Some(2));
        assert_eq!(gpu.position_range, Vec4::new(1.0, 2.0, 3.0, 10.0));
        assert_eq!(gpu.direction_kind.xyz(), Vec3::NEG_Z);
        assert_eq!(gpu.kind(), LightKind::Spot);
        assert_eq!(gpu.cone_shadow.z, 2.0);
        assert_eq!(gpu.cone_shadow.w, 1.0);
    }

    #[test]
    fn test_unshadowed_light() {
        let gpu = GpuLight::new(&LightProxy::default(), None);
        assert_eq!(gpu.cone_shadow.z, NO_SHADOW);
        assert_eq!(gpu.cone_shadow.w, 0.0);
    }
}
