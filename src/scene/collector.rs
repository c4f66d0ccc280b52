use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::draw_stream::{DrawCommand, DrawStream};
use super::view::{View, transform_aabb};
use crate::frame::FrameBumpAllocator;
use crate::proxy::{EntityFlags, MaterialBlend, ProxyManager, ShaderFlags};

/// Object ids of mesh instances carry this bit; entity ids do not.
pub const MESH_INSTANCE_ID_BIT: u32 = 1 << 31;

/// Which renderables a pass wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawFilter {
    /// Opaque and alpha-masked materials.
    Opaque,
    Transparent,
    /// Non-transparent renderables flagged `CAST_SHADOWS`.
    ShadowCasters,
    /// Everything, for object ids.
    All,
}

impl DrawFilter {
    fn accepts(self, blend: MaterialBlend, flags: EntityFlags) -> bool {
        match self {
            Self::Opaque => blend != MaterialBlend::Transparent,
            Self::Transparent => blend == MaterialBlend::Transparent,
            Self::ShadowCasters => {
                blend != MaterialBlend::Transparent && flags.contains(EntityFlags::CAST_SHADOWS)
            }
            Self::All => true,
        }
    }
}

/// Per-draw record read by content shaders through `first_instance`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct InstanceData {
    pub model: Mat4,
    pub object_id: u32,
    pub _pad: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectStats {
    pub visited: usize,
    pub culled: usize,
    pub emitted: usize,
}

/// Turns visible proxies into draw commands for one pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderableCollector;

struct Renderable {
    mesh: u32,
    material: u32,
    transform: Mat4,
    flags: EntityFlags,
    object_id: u32,
}

impl RenderableCollector {
    /// Cull every visible entity node and mesh instance against `view`,
    /// append one draw per survivor to `stream` and its instance record to
    /// `arena`.
    ///
    /// `variant` is the capability set the pass needs; alpha-masked materials
    /// additionally require [`ShaderFlags::ALPHA_MASK`] outside the
    /// transparent pass.
    ///
    /// # Panics
    ///
    /// Panics if a material has no shader variant for the request, or if a
    /// renderable references an inactive mesh or material.
    #[allow(clippy::too_many_arguments)]
    pub fn collect(
        proxies: &ProxyManager,
        view: &View,
        filter: DrawFilter,
        variant: ShaderFlags,
        frame_index: usize,
        stream: &mut DrawStream,
        arena: &mut FrameBumpAllocator,
    ) -> CollectStats {
        crate::profile_function!();
        let mut stats = CollectStats::default();

        let entities = proxies.entities().iter_active().flat_map(|(index, entity)| {
            proxies
                .get_model(entity.model)
                .nodes()
                .iter()
                .map(move |node| Renderable {
                    mesh: node.mesh,
                    material: node.material,
                    transform: entity.transform,
                    flags: entity.flags,
                    object_id: index + 1,
                })
        });
        let instances = proxies
            .mesh_instances()
            .iter_active()
            .map(|(index, instance)| Renderable {
                mesh: instance.mesh,
                material: instance.material,
                transform: instance.transform,
                flags: instance.flags,
                object_id: (index + 1) | MESH_INSTANCE_ID_BIT,
            });

        for renderable in entities.chain(instances) {
            if !renderable.flags.contains(EntityFlags::VISIBLE) {
                continue;
            }
            assert!(
                proxies.meshes().is_active(renderable.mesh),
                "object {:#x} references inactive mesh {}",
                renderable.object_id,
                renderable.mesh
            );
            assert!(
                proxies.materials().is_active(renderable.material),
                "object {:#x} references inactive material {}",
                renderable.object_id,
                renderable.material
            );
            let material = proxies.get_material(renderable.material);
            if !filter.accepts(material.blend, renderable.flags) {
                continue;
            }
            stats.visited += 1;

            let mesh = proxies.get_mesh(renderable.mesh);
            let (min, max) = transform_aabb(&renderable.transform, mesh.aabb_min, mesh.aabb_max);
            if !view.frustum.intersects_aabb(min, max) {
                stats.culled += 1;
                continue;
            }

            let mut flags = variant;
            if material.blend == MaterialBlend::Masked && filter != DrawFilter::Transparent {
                flags |= ShaderFlags::ALPHA_MASK;
            }
            let pipeline = proxies.get_shader_variant(renderable.material, flags);
            assert!(
                !pipeline.is_null(),
                "material {} has no shader variant for {flags:?}",
                renderable.material
            );

            let allocation = arena.push(&InstanceData {
                model: renderable.transform,
                object_id: renderable.object_id,
                _pad: [0; 3],
            });
            stream.push(DrawCommand {
                priority: material.priority,
                pipeline,
                vertex_buffer: mesh.vertex_buffer,
                index_buffer: mesh.index_buffer,
                index_format: mesh.index_format,
                index_count: mesh.index_count,
                first_index: 0,
                base_vertex: 0,
                instance_offset: allocation.element_index::<InstanceData>(),
                object_id: renderable.object_id,
                material: material.bind_groups[frame_index],
            });
            stats.emitted += 1;
        }
        stats
    }
}
