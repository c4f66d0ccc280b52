//! Per-kind proxy data.
//!
//! Every proxy is `Default`, and the default value holds null hardware ids,
//! so a retired slot never refers to a live GPU object.

use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};

use crate::events::{DebugLine, MAX_MATERIAL_SHADERS, MAX_MODEL_NODES, ModelNode, NO_INDEX};
use crate::frame::PerFrame;
use crate::gfx::{
    BindGroupId, BlendMode, BufferId, IndexFormat, PipelineId, SamplerId, TextureFormat, TextureId,
};

bitflags! {
    /// Capabilities of a shader variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderFlags: u32 {
        /// Writes depth only (pre-pass).
        const DEPTH_ONLY = 1 << 0;
        /// Renders into the shadow atlas.
        const SHADOW = 1 << 1;
        /// Discards below an alpha threshold.
        const ALPHA_MASK = 1 << 2;
        /// Blends over the HDR target in the forward pass.
        const TRANSPARENT = 1 << 3;
        /// Writes object ids for picking and outlines.
        const OBJECT_ID = 1 << 4;
        /// Skinned vertex layout.
        const SKINNED = 1 << 5;
    }
}

bitflags! {
    /// Per-entity render flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntityFlags: u32 {
        const VISIBLE = 1 << 0;
        const CAST_SHADOWS = 1 << 1;
        /// Outlined in tool mode.
        const SELECTED = 1 << 2;
    }
}

/// How a material is composited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaterialBlend {
    #[default]
    Opaque,
    /// Opaque with alpha-tested cutouts.
    Masked,
    Transparent,
}

impl MaterialBlend {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Masked,
            2 => Self::Transparent,
            _ => Self::Opaque,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextureProxy {
    pub texture: TextureId,
    /// Staging buffer holding the texel data, kept for the proxy's lifetime.
    pub staging: BufferId,
    pub gpu_index: u32,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: TextureFormat,
}

#[derive(Debug, Clone, Default)]
pub struct SamplerProxy {
    pub sampler: SamplerId,
    pub gpu_index: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ShaderProxy {
    pub pipeline: PipelineId,
    pub flags: ShaderFlags,
    pub blend: BlendMode,
}

/// Constants each material exposes to its shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialConstants {
    pub base_color: [f32; 4],
    /// Bindless indices of albedo, normal, ORM and emissive textures.
    pub texture_indices: [u32; 4],
}

#[derive(Debug, Clone, Default)]
pub struct MaterialProxy {
    /// Shader proxy indices, most general variant first.
    pub shaders: [u32; MAX_MATERIAL_SHADERS],
    pub shader_count: usize,
    /// Albedo, normal, ORM and emissive texture proxy indices or `NO_INDEX`.
    pub textures: [u32; 4],
    /// Sampler proxy index or `NO_INDEX`.
    pub sampler: u32,
    pub base_color: Vec4,
    pub blend: MaterialBlend,
    pub priority: u32,
    pub constants: PerFrame<BufferId>,
    pub bind_groups: PerFrame<BindGroupId>,
}

impl MaterialProxy {
    /// Shader indices in declaration order.
    pub fn shader_indices(&self) -> &[u32] {
        &self.shaders[..self.shader_count]
    }

    /// Whether `texture` is one of this material's textures.
    pub fn references_texture(&self, texture: u32) -> bool {
        texture != NO_INDEX && self.textures.contains(&texture)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshProxy {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    /// Staging buffer holding vertices then indices.
    pub staging: BufferId,
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_stride: u32,
    pub index_format: IndexFormat,
    pub aabb_min: Vec3,
    pub aabb_max: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct ModelProxy {
    pub nodes: [ModelNode; MAX_MODEL_NODES],
    pub node_count: usize,
}

impl ModelProxy {
    pub fn nodes(&self) -> &[ModelNode] {
        &self.nodes[..self.node_count]
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityProxy {
    /// Model proxy index.
    pub model: u32,
    pub transform: Mat4,
    pub flags: EntityFlags,
}

#[derive(Debug, Clone, Default)]
pub struct MeshInstanceProxy {
    pub mesh: u32,
    pub material: u32,
    pub transform: Mat4,
    pub flags: EntityFlags,
}

#[derive(Debug, Clone, Default)]
pub struct CameraProxy {
    /// Camera to world transform.
    pub transform: Mat4,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub orthographic: bool,
    pub ortho_height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightKind {
    #[default]
    Directional,
    Point,
    Spot,
}

impl LightKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Point,
            2 => Self::Spot,
            _ => Self::Directional,
        }
    }

    /// Number of shadow views a light of this kind renders.
    pub fn shadow_view_count(self) -> usize {
        match self {
            Self::Directional | Self::Spot => 1,
            Self::Point => 6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LightProxy {
    pub kind: LightKind,
    /// Light to world transform; lights shine along -Z.
    pub transform: Mat4,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub inner_cone: f32,
    pub outer_cone: f32,
    pub cast_shadows: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl AmbientLight {
    pub fn is_black(&self) -> bool {
        self.intensity <= 0.0 || self.color == Vec3::ZERO
    }
}

/// Bytes of GPU state per particle: position, age, velocity, size.
pub const PARTICLE_STATE_SIZE: u64 = 32;

#[derive(Debug, Clone, Default)]
pub struct EmitterProxy {
    pub transform: Mat4,
    pub color: Vec4,
    pub max_particles: u32,
    pub spawn_rate: f32,
    pub lifetime: f32,
    pub size: f32,
    /// GPU particle state, `max_particles * PARTICLE_STATE_SIZE` bytes.
    pub state_buffer: BufferId,
    pub state_gpu_index: u32,
}

impl EmitterProxy {
    /// Particles alive in steady state.
    pub fn live_particles(&self) -> u32 {
        let steady = (self.spawn_rate * self.lifetime).ceil().max(0.0) as u32;
        steady.min(self.max_particles)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CanvasItemProxy {
    /// x, y, width, height in pixels.
    pub rect: Vec4,
    pub color: Vec4,
    /// Texture proxy index or `NO_INDEX`.
    pub texture: u32,
    pub layer: i32,
}

/// Physics debug geometry, replaced wholesale every update.
#[derive(Debug, Clone, Default)]
pub struct PhysicsDebugLines {
    pub lines: Vec<DebugLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_light_renders_six_views() {
        assert_eq!(LightKind::Point.shadow_view_count(), 6);
        assert_eq!(LightKind::from_raw(2), LightKind::Spot);
    }

    #[test]
    fn test_emitter_live_particles_clamped() {
        let emitter = EmitterProxy {
            max_particles: 100,
            spawn_rate: 50.0,
            lifetime: 4.0,
            ..Default::default()
        };
        assert_eq!(emitter.live_particles(), 100);
        assert_eq!(EmitterProxy::default().live_particles(), 0);
    }

    #[test]
    fn test_material_texture_reference() {
        let material = MaterialProxy {
            textures: [3, NO_INDEX, NO_INDEX, NO_INDEX],
            ..Default::default()
        };
        assert!(material.references_texture(3));
        assert!(!material.references_texture(NO_INDEX));
    }
}
