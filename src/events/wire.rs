//! Binary layout of render events.
//!
//! Every record is a [`RenderEventHeader`] followed by `payload_size` bytes.
//! Payloads start with one of the `#[repr(C)]` structs below; texture and mesh
//! creation append raw data after the struct, and physics debug lines append
//! `count` [`DebugLine`] records. Records are packed back to back with no
//! alignment padding.

use bytemuck::{Pod, Zeroable};
use glam::{Affine3A, Mat4, Vec3, Vec3A};
use static_assertions::const_assert_eq;

/// Maximum number of shader variants a material references.
pub const MAX_MATERIAL_SHADERS: usize = 4;

/// Maximum number of (mesh, material) nodes in a model.
pub const MAX_MODEL_NODES: usize = 8;

/// Index value meaning "no resource".
pub const NO_INDEX: u32 = u32::MAX;

/// Header preceding every event payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RenderEventHeader {
    pub event_type: u16,
    pub reserved: u16,
    /// Dense pool slot the event targets.
    pub index: u32,
    pub payload_size: u32,
}

const_assert_eq!(std::mem::size_of::<RenderEventHeader>(), 12);

macro_rules! render_event_types {
    ($($name:ident = $value:literal,)*) => {
        /// Kind of a render event.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum RenderEventType {
            $($name = $value,)*
        }

        impl RenderEventType {
            /// Decode a raw event type.
            pub fn from_raw(raw: u16) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Every event type, in wire order.
            pub const ALL: &'static [RenderEventType] = &[$(Self::$name,)*];
        }
    };
}

render_event_types! {
    CreateTexture = 0,
    ReloadTexture = 1,
    DestroyTexture = 2,
    CreateSampler = 3,
    DestroySampler = 4,
    CreateShader = 5,
    DestroyShader = 6,
    CreateMaterial = 7,
    UpdateMaterial = 8,
    DestroyMaterial = 9,
    CreateMesh = 10,
    DestroyMesh = 11,
    CreateModel = 12,
    DestroyModel = 13,
    CreateEntity = 14,
    UpdateEntityTransform = 15,
    UpdateEntityFlags = 16,
    DestroyEntity = 17,
    CreateMeshInstance = 18,
    UpdateMeshInstanceTransform = 19,
    DestroyMeshInstance = 20,
    CreateCamera = 21,
    UpdateCamera = 22,
    SetMainCamera = 23,
    DestroyCamera = 24,
    CreateLight = 25,
    UpdateLight = 26,
    DestroyLight = 27,
    SetAmbientLight = 28,
    CreateEmitter = 29,
    UpdateEmitter = 30,
    DestroyEmitter = 31,
    CreateCanvasItem = 32,
    UpdateCanvasItem = 33,
    DestroyCanvasItem = 34,
    SetPhysicsDebugLines = 35,
}

/// Column-major affine transform: three basis columns then translation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Transform3x4 {
    pub cols: [[f32; 3]; 4],
}

impl Default for Transform3x4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform3x4 {
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
        ],
    };

    /// Pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        let mut transform = Self::IDENTITY;
        transform.cols[3] = translation.to_array();
        transform
    }

    pub fn from_affine(affine: &Affine3A) -> Self {
        Self {
            cols: [
                affine.matrix3.x_axis.to_array(),
                affine.matrix3.y_axis.to_array(),
                affine.matrix3.z_axis.to_array(),
                affine.translation.to_array(),
            ],
        }
    }

    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_cols(
            Vec3A::from_array(self.cols[0]),
            Vec3A::from_array(self.cols[1]),
            Vec3A::from_array(self.cols[2]),
            Vec3A::from_array(self.cols[3]),
        )
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from(self.to_affine())
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::from_array(self.cols[3])
    }
}

/// Payload of `CreateTexture` / `ReloadTexture`, followed by texel data for
/// every (layer, mip) subresource, layer-major and tightly packed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TexturePayload {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    /// `TextureFormat` as `u32`.
    pub format: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SamplerPayload {
    /// 0 = nearest, 1 = linear.
    pub filter: u32,
    /// 0 = repeat, 1 = clamp, 2 = mirror.
    pub address: u32,
    pub comparison: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ShaderPayload {
    /// `ShaderFlags` bits.
    pub flags: u32,
    /// `BlendMode` as `u32` (0 opaque, 1 alpha, 2 additive).
    pub blend: u32,
    pub asset_hash: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialPayload {
    pub shaders: [u32; MAX_MATERIAL_SHADERS],
    pub shader_count: u32,
    /// Albedo, normal, ORM, emissive texture indices or [`NO_INDEX`].
    pub textures: [u32; 4],
    pub sampler: u32,
    pub base_color: [f32; 4],
    /// `MaterialBlend` as `u32`.
    pub blend: u32,
    pub priority: u32,
}

/// Payload of `CreateMesh`, followed by `vertex_count * vertex_stride` vertex
/// bytes and then the index bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshPayload {
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_stride: u32,
    /// 0 = u16 indices, 1 = u32 indices.
    pub index_format: u32,
    pub aabb_min: [f32; 3],
    pub aabb_max: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct ModelNode {
    pub mesh: u32,
    pub material: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ModelPayload {
    pub node_count: u32,
    pub nodes: [ModelNode; MAX_MODEL_NODES],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EntityPayload {
    pub model: u32,
    /// `EntityFlags` bits.
    pub flags: u32,
    pub transform: Transform3x4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshInstancePayload {
    pub mesh: u32,
    pub material: u32,
    pub flags: u32,
    pub transform: Transform3x4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraPayload {
    pub transform: Transform3x4,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub orthographic: u32,
    /// Height of the orthographic view volume.
    pub ortho_height: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightPayload {
    pub transform: Transform3x4,
    pub color: [f32; 3],
    pub intensity: f32,
    pub range: f32,
    pub inner_cone: f32,
    pub outer_cone: f32,
    /// 0 directional, 1 point, 2 spot.
    pub kind: u32,
    pub cast_shadows: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AmbientLightPayload {
    pub color: [f32; 3],
    pub intensity: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EmitterPayload {
    pub transform: Transform3x4,
    pub color: [f32; 4],
    pub max_particles: u32,
    pub spawn_rate: f32,
    pub lifetime: f32,
    pub size: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CanvasItemPayload {
    /// x, y, width, height in pixels.
    pub rect: [f32; 4],
    pub color: [f32; 4],
    /// Texture index or [`NO_INDEX`].
    pub texture: u32,
    pub layer: i32,
}

/// One physics debug line.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct DebugLine {
    pub start: [f32; 3],
    pub end: [f32; 3],
    /// RGBA8 packed color.
    pub color: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_raw_roundtrip() {
        for ty in RenderEventType::ALL {
            assert_eq!(RenderEventType::from_raw(*ty as u16), Some(*ty));
        }
        assert_eq!(RenderEventType::from_raw(999), None);
    }

    #[test]
    fn test_transform_to_mat4() {
        let transform = Transform3x4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let point = transform.to_mat4().transform_point3(Vec3::ZERO);
        assert_eq!(point, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(Transform3x4::from_affine(&transform.to_affine()), transform);
    }

    #[test]
    fn test_payload_sizes_have_no_padding() {
        assert_eq!(std::mem::size_of::<TexturePayload>(), 20);
        assert_eq!(std::mem::size_of::<ShaderPayload>(), 16);
        assert_eq!(std::mem::size_of::<Transform3x4>(), 48);
        assert_eq!(std::mem::size_of::<DebugLine>(), 28);
    }
}
