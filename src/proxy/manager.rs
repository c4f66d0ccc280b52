use std::sync::Arc;

use glam::{Vec3, Vec4};

use super::destroy::{DestroyBuckets, DestroyEntry};
use super::kinds::*;
use super::pool::ProxyPool;
use crate::config::{BACK_BUFFER_COUNT, ProxyCapacities, formats};
use crate::error::BackendResult;
use crate::events::*;
use crate::frame::{PerFrame, frame_slot};
use crate::gfx::{
    AddressMode, BindEntry, BindGroupDesc, BindLayoutDesc, BindLayoutId, BindingKind, BlendMode,
    BufferDesc, BufferId, BufferUsage, DepthMode, FilterMode, GfxBackend, IndexFormat,
    PipelineDesc, PipelineId, ResourceState, SamplerDesc, SamplerId, ShaderSource, TextureDesc,
    TextureFormat, TextureId, TextureUsage,
};
use crate::upload::{BufferUpload, TextureUpload, UploadQueues, texture_regions};

/// Counters of one `fetch_render_events` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchStats {
    pub batches: usize,
    pub events: usize,
}

/// Owns the GPU-side mirror of every render-relevant object.
///
/// The proxy manager is only ever touched by the render thread. Scene changes
/// arrive as event batches through [`fetch_render_events`](Self::fetch_render_events);
/// hardware resources are created eagerly and released through
/// [`DestroyBuckets`] so that in-flight frames never see a destroyed handle.
///
/// # Frame protocol
///
/// ```text
/// begin_frame(F)
/// fetch_render_events(stream)       creates / updates / retires proxies
/// flush_material_updates(slot(F))   re-points this slot's material groups
/// flush_destroys(false)             destroys what frame F - N released
/// ```
pub struct ProxyManager {
    backend: Arc<dyn GfxBackend>,
    render_frame: u64,

    textures: ProxyPool<TextureProxy>,
    samplers: ProxyPool<SamplerProxy>,
    shaders: ProxyPool<ShaderProxy>,
    materials: ProxyPool<MaterialProxy>,
    meshes: ProxyPool<MeshProxy>,
    models: ProxyPool<ModelProxy>,
    entities: ProxyPool<EntityProxy>,
    mesh_instances: ProxyPool<MeshInstanceProxy>,
    cameras: ProxyPool<CameraProxy>,
    lights: ProxyPool<LightProxy>,
    emitters: ProxyPool<EmitterProxy>,
    canvas_items: ProxyPool<CanvasItemProxy>,

    main_camera: Option<u32>,
    ambient: AmbientLight,
    debug_lines: PhysicsDebugLines,

    destroy_buckets: DestroyBuckets,
    material_updates: PerFrame<Vec<u32>>,

    pipeline_layout: BindLayoutId,
    material_layout: BindLayoutId,
    fallback_texture: TextureId,
    fallback_staging: BufferId,
    fallback_sampler: SamplerId,
}

impl std::fmt::Debug for ProxyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyManager")
            .field("render_frame", &self.render_frame)
            .field("textures", &self.textures.active_count())
            .field("materials", &self.materials.active_count())
            .field("meshes", &self.meshes.active_count())
            .field("entities", &self.entities.active_count())
            .field("lights", &self.lights.active_count())
            .field("pending_destroys", &self.destroy_buckets.pending())
            .finish()
    }
}

impl ProxyManager {
    /// Create the manager and its shared fallback resources.
    ///
    /// `pipeline_layout` is the layout every content pipeline is created
    /// with. The white fallback texture is uploaded through `uploads`.
    pub fn new(
        backend: Arc<dyn GfxBackend>,
        capacities: &ProxyCapacities,
        pipeline_layout: BindLayoutId,
        uploads: &mut UploadQueues,
    ) -> BackendResult<Self> {
        let material_layout = backend.create_bind_layout(&BindLayoutDesc {
            label: "material".to_string(),
            bindings: vec![
                BindingKind::ConstantBuffer,
                BindingKind::SampledTexture,
                BindingKind::SampledTexture,
                BindingKind::SampledTexture,
                BindingKind::SampledTexture,
                BindingKind::Sampler,
            ],
            push_constant_size: 0,
        })?;

        let fallback_texture = match backend.create_texture(&TextureDesc::new_2d(
            "fallback white",
            1,
            1,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        )) {
            Ok(texture) => texture,
            Err(err) => {
                backend.destroy_bind_layout(material_layout);
                return Err(err);
            }
        };
        let fallback_staging = match backend.create_buffer(&BufferDesc::staging("fallback white", 4)) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.destroy_texture(fallback_texture);
                backend.destroy_bind_layout(material_layout);
                return Err(err);
            }
        };
        let fallback_sampler = match backend.create_sampler(&SamplerDesc::default()) {
            Ok(sampler) => sampler,
            Err(err) => {
                backend.destroy_buffer(fallback_staging);
                backend.destroy_texture(fallback_texture);
                backend.destroy_bind_layout(material_layout);
                return Err(err);
            }
        };

        backend.write_buffer(fallback_staging, 0, &[255; 4]);
        let (regions, _) = texture_regions(1, 1, 1, 1, 4);
        uploads.textures.push(TextureUpload {
            src: fallback_staging,
            dst: fallback_texture,
            regions,
            dst_state: ResourceState::ShaderRead,
        });

        log::debug!("Proxy manager created with capacities {capacities:?}");

        Ok(Self {
            backend,
            render_frame: 0,
            textures: ProxyPool::new("texture", capacities.textures),
            samplers: ProxyPool::new("sampler", capacities.samplers),
            shaders: ProxyPool::new("shader", capacities.shaders),
            materials: ProxyPool::new("material", capacities.materials),
            meshes: ProxyPool::new("mesh", capacities.meshes),
            models: ProxyPool::new("model", capacities.models),
            entities: ProxyPool::new("entity", capacities.entities),
            mesh_instances: ProxyPool::new("mesh instance", capacities.mesh_instances),
            cameras: ProxyPool::new("camera", capacities.cameras),
            lights: ProxyPool::new("light", capacities.lights),
            emitters: ProxyPool::new("emitter", capacities.emitters),
            canvas_items: ProxyPool::new("canvas item", capacities.canvas_items),
            main_camera: None,
            ambient: AmbientLight::default(),
            debug_lines: PhysicsDebugLines::default(),
            destroy_buckets: DestroyBuckets::new(),
            material_updates: PerFrame::default(),
            pipeline_layout,
            material_layout,
            fallback_texture,
            fallback_staging,
            fallback_sampler,
        })
    }

    // ========================================================================
    // Frame protocol
    // ========================================================================

    /// Set the render frame used for destroy scheduling.
    pub fn begin_frame(&mut self, render_frame: u64) {
        self.render_frame = render_frame;
    }

    pub fn render_frame(&self) -> u64 {
        self.render_frame
    }

    /// Drain every batch queued in `stream` and apply its records in order.
    ///
    /// A batch is popped only after every record in it has been applied.
    pub fn fetch_render_events(
        &mut self,
        stream: &EventStream,
        uploads: &mut UploadQueues,
    ) -> FetchStats {
        crate::profile_scope!("fetch_render_events");
        let mut stats = FetchStats::default();
        stats.batches = stream.drain(|batch| {
            for event in EventReader::new(batch) {
                self.apply_event(&event, uploads);
                stats.events += 1;
            }
        });
        if stats.events > 0 {
            log::trace!(
                "Frame {}: applied {} events from {} batches",
                self.render_frame,
                stats.events,
                stats.batches
            );
        }
        stats
    }

    /// Re-point material bind groups of `frame_index` queued by material
    /// updates and texture reloads, then clear that slot's queue.
    ///
    /// Must run after the slot's previous frame retired.
    pub fn flush_material_updates(&mut self, frame_index: usize) {
        let mut pending = std::mem::take(&mut self.material_updates[frame_index]);
        pending.sort_unstable();
        pending.dedup();
        for index in pending {
            if !self.materials.is_active(index) {
                continue;
            }
            let (constants, entries) = self.material_bindings(index, frame_index);
            let material = self.materials.get(index);
            self.backend.write_buffer(
                material.constants[frame_index],
                0,
                bytemuck::bytes_of(&constants),
            );
            self.backend
                .update_bind_group(material.bind_groups[frame_index], &entries);
        }
    }

    /// Destroy handles that are no longer referenced by the GPU.
    ///
    /// Normal frames flush the single bucket released `BACK_BUFFER_COUNT`
    /// frames ago. `force` waits for the device to go idle and flushes every
    /// bucket.
    pub fn flush_destroys(&mut self, force: bool) -> usize {
        if force {
            self.backend.wait_idle();
            self.destroy_buckets.flush_all(self.backend.as_ref())
        } else {
            self.destroy_buckets
                .flush(self.render_frame, self.backend.as_ref())
        }
    }

    /// Retire every active proxy, flush all destroys and release the shared
    /// fallback resources.
    pub fn shutdown(&mut self) {
        for index in self.canvas_items.active_indices() {
            self.canvas_items.retire(index);
        }
        for index in self.emitters.active_indices() {
            self.destroy_emitter(index);
        }
        for index in self.lights.active_indices() {
            self.lights.retire(index);
        }
        for index in self.cameras.active_indices() {
            self.cameras.retire(index);
        }
        for index in self.mesh_instances.active_indices() {
            self.mesh_instances.retire(index);
        }
        for index in self.entities.active_indices() {
            self.entities.retire(index);
        }
        for index in self.models.active_indices() {
            self.models.retire(index);
        }
        for index in self.meshes.active_indices() {
            self.destroy_mesh(index, None);
        }
        for index in self.materials.active_indices() {
            self.destroy_material(index);
        }
        for index in self.shaders.active_indices() {
            self.destroy_shader(index);
        }
        for index in self.samplers.active_indices() {
            self.destroy_sampler(index);
        }
        for index in self.textures.active_indices() {
            self.destroy_texture(index, None);
        }
        self.main_camera = None;
        self.debug_lines.lines.clear();

        let destroyed = self.flush_destroys(true);
        self.backend.destroy_sampler(self.fallback_sampler);
        self.backend.destroy_buffer(self.fallback_staging);
        self.backend.destroy_texture(self.fallback_texture);
        self.backend.destroy_bind_layout(self.material_layout);
        log::info!("Proxy manager shut down ({destroyed} deferred destroys flushed)");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn get_texture(&self, index: u32) -> &TextureProxy {
        self.textures.get(index)
    }

    pub fn get_sampler(&self, index: u32) -> &SamplerProxy {
        self.samplers.get(index)
    }

    pub fn get_shader(&self, index: u32) -> &ShaderProxy {
        self.shaders.get(index)
    }

    pub fn get_material(&self, index: u32) -> &MaterialProxy {
        self.materials.get(index)
    }

    pub fn get_mesh(&self, index: u32) -> &MeshProxy {
        self.meshes.get(index)
    }

    pub fn get_model(&self, index: u32) -> &ModelProxy {
        self.models.get(index)
    }

    pub fn get_entity(&self, index: u32) -> &EntityProxy {
        self.entities.get(index)
    }

    pub fn get_mesh_instance(&self, index: u32) -> &MeshInstanceProxy {
        self.mesh_instances.get(index)
    }

    pub fn get_camera(&self, index: u32) -> &CameraProxy {
        self.cameras.get(index)
    }

    pub fn get_light(&self, index: u32) -> &LightProxy {
        self.lights.get(index)
    }

    pub fn get_emitter(&self, index: u32) -> &EmitterProxy {
        self.emitters.get(index)
    }

    pub fn get_canvas_item(&self, index: u32) -> &CanvasItemProxy {
        self.canvas_items.get(index)
    }

    pub fn textures(&self) -> &ProxyPool<TextureProxy> {
        &self.textures
    }

    pub fn materials(&self) -> &ProxyPool<MaterialProxy> {
        &self.materials
    }

    pub fn meshes(&self) -> &ProxyPool<MeshProxy> {
        &self.meshes
    }

    pub fn entities(&self) -> &ProxyPool<EntityProxy> {
        &self.entities
    }

    pub fn mesh_instances(&self) -> &ProxyPool<MeshInstanceProxy> {
        &self.mesh_instances
    }

    pub fn lights(&self) -> &ProxyPool<LightProxy> {
        &self.lights
    }

    pub fn emitters(&self) -> &ProxyPool<EmitterProxy> {
        &self.emitters
    }

    pub fn canvas_items(&self) -> &ProxyPool<CanvasItemProxy> {
        &self.canvas_items
    }

    /// The main camera, if one is set and active.
    pub fn main_camera(&self) -> Option<&CameraProxy> {
        self.main_camera
            .filter(|index| self.cameras.is_active(*index))
            .map(|index| self.cameras.get(index))
    }

    pub fn ambient_light(&self) -> AmbientLight {
        self.ambient
    }

    pub fn debug_lines(&self) -> &[DebugLine] {
        &self.debug_lines.lines
    }

    pub fn destroy_buckets(&self) -> &DestroyBuckets {
        &self.destroy_buckets
    }

    /// Material bind layout used at set 1 by content pipelines.
    pub fn material_layout(&self) -> BindLayoutId {
        self.material_layout
    }

    /// Gpu index of the white fallback texture.
    pub fn fallback_texture_index(&self) -> u32 {
        self.backend.texture_gpu_index(self.fallback_texture)
    }

    /// Find the first shader of `material` whose capabilities include `flags`.
    ///
    /// Materials list their most general variant first, so a request with no
    /// flags resolves to the base shader. Returns [`PipelineId::NULL`] when
    /// no variant qualifies; callers treat that as fatal for the draw.
    pub fn get_shader_variant(&self, material: u32, flags: ShaderFlags) -> PipelineId {
        self.materials
            .get(material)
            .shader_indices()
            .iter()
            .filter(|shader| self.shaders.is_active(**shader))
            .map(|shader| self.shaders.get(*shader))
            .find(|shader| shader.flags.contains(flags))
            .map_or(PipelineId::NULL, |shader| shader.pipeline)
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    fn apply_event(&mut self, event: &RenderEvent<'_>, uploads: &mut UploadQueues) {
        let index = event.index;
        log::trace!("Applying {:?} to slot {}", event.event_type, index);
        match event.event_type {
            RenderEventType::CreateTexture => {
                let proxy = self.create_texture_resources(index, event, uploads);
                *self.textures.activate(index) = proxy;
                // Materials created earlier are still bound to the fallback.
                self.queue_updates_for_texture(index);
            }
            RenderEventType::ReloadTexture => self.reload_texture(index, event, uploads),
            RenderEventType::DestroyTexture => self.destroy_texture(index, Some(uploads)),

            RenderEventType::CreateSampler => self.create_sampler(index, event.read()),
            RenderEventType::DestroySampler => self.destroy_sampler(index),

            RenderEventType::CreateShader => self.create_shader(index, event.read()),
            RenderEventType::DestroyShader => self.destroy_shader(index),

            RenderEventType::CreateMaterial => self.create_material(index, event.read()),
            RenderEventType::UpdateMaterial => self.update_material(index, event.read()),
            RenderEventType::DestroyMaterial => self.destroy_material(index),

            RenderEventType::CreateMesh => self.create_mesh(index, event, uploads),
            RenderEventType::DestroyMesh => self.destroy_mesh(index, Some(uploads)),

            RenderEventType::CreateModel => {
                let payload: ModelPayload = event.read();
                let count = payload.node_count as usize;
                assert!(
                    count <= MAX_MODEL_NODES,
                    "model {index} has {count} nodes (max {MAX_MODEL_NODES})"
                );
                let model = self.models.activate(index);
                model.nodes = payload.nodes;
                model.node_count = count;
            }
            RenderEventType::DestroyModel => {
                self.models.retire(index);
            }

            RenderEventType::CreateEntity => {
                let payload: EntityPayload = event.read();
                let entity = self.entities.activate(index);
                entity.model = payload.model;
                entity.flags = EntityFlags::from_bits_truncate(payload.flags);
                entity.transform = payload.transform.to_mat4();
            }
            RenderEventType::UpdateEntityTransform => {
                self.active_entity(index).transform = event.read::<Transform3x4>().to_mat4();
            }
            RenderEventType::UpdateEntityFlags => {
                self.active_entity(index).flags =
                    EntityFlags::from_bits_truncate(event.read::<u32>());
            }
            RenderEventType::DestroyEntity => {
                self.entities.retire(index);
            }

            RenderEventType::CreateMeshInstance => {
                let payload: MeshInstancePayload = event.read();
                let instance = self.mesh_instances.activate(index);
                instance.mesh = payload.mesh;
                instance.material = payload.material;
                instance.flags = EntityFlags::from_bits_truncate(payload.flags);
                instance.transform = payload.transform.to_mat4();
            }
            RenderEventType::UpdateMeshInstanceTransform => {
                assert!(
                    self.mesh_instances.is_active(index),
                    "mesh instance {index} updated while inactive"
                );
                self.mesh_instances.get_mut(index).transform =
                    event.read::<Transform3x4>().to_mat4();
            }
            RenderEventType::DestroyMeshInstance => {
                self.mesh_instances.retire(index);
            }

            RenderEventType::CreateCamera => {
                let payload: CameraPayload = event.read();
                write_camera(self.cameras.activate(index), &payload);
            }
            RenderEventType::UpdateCamera => {
                assert!(self.cameras.is_active(index), "camera {index} updated while inactive");
                write_camera(self.cameras.get_mut(index), &event.read());
            }
            RenderEventType::SetMainCamera => {
                assert!(
                    self.cameras.is_active(index),
                    "main camera {index} is not active"
                );
                self.main_camera = Some(index);
            }
            RenderEventType::DestroyCamera => {
                self.cameras.retire(index);
                if self.main_camera == Some(index) {
                    self.main_camera = None;
                }
            }

            RenderEventType::CreateLight => {
                let payload: LightPayload = event.read();
                write_light(self.lights.activate(index), &payload);
            }
            RenderEventType::UpdateLight => {
                assert!(self.lights.is_active(index), "light {index} updated while inactive");
                write_light(self.lights.get_mut(index), &event.read());
            }
            RenderEventType::DestroyLight => {
                self.lights.retire(index);
            }
            RenderEventType::SetAmbientLight => {
                let payload: AmbientLightPayload = event.read();
                self.ambient = AmbientLight {
                    color: Vec3::from_array(payload.color),
                    intensity: payload.intensity,
                };
            }

            RenderEventType::CreateEmitter => self.create_emitter(index, event.read()),
            RenderEventType::UpdateEmitter => self.update_emitter(index, event.read()),
            RenderEventType::DestroyEmitter => self.destroy_emitter(index),

            RenderEventType::CreateCanvasItem => {
                write_canvas_item(self.canvas_items.activate(index), &event.read());
            }
            RenderEventType::UpdateCanvasItem => {
                assert!(
                    self.canvas_items.is_active(index),
                    "canvas item {index} updated while inactive"
                );
                write_canvas_item(self.canvas_items.get_mut(index), &event.read());
            }
            RenderEventType::DestroyCanvasItem => {
                self.canvas_items.retire(index);
            }

            RenderEventType::SetPhysicsDebugLines => {
                let count = event.read::<u32>() as usize;
                self.debug_lines.lines = event.trailing_records::<u32, DebugLine>(count);
            }
        }
    }

    fn schedule_destroy(&mut self, entry: DestroyEntry) {
        self.destroy_buckets.schedule(self.render_frame, entry);
    }

    fn active_entity(&mut self, index: u32) -> &mut EntityProxy {
        assert!(self.entities.is_active(index), "entity {index} updated while inactive");
        self.entities.get_mut(index)
    }

    /// Queue a bind group patch for `material` in every frame slot.
    fn queue_material_update(&mut self, material: u32) {
        for slot in 0..BACK_BUFFER_COUNT {
            self.material_updates[slot].push(material);
        }
    }

    fn queue_updates_for_texture(&mut self, texture: u32) {
        let referencing: Vec<u32> = self
            .materials
            .iter_active()
            .filter(|(_, material)| material.references_texture(texture))
            .map(|(index, _)| index)
            .collect();
        for material in referencing {
            self.queue_material_update(material);
        }
    }

    fn queue_updates_for_sampler(&mut self, sampler: u32) {
        let referencing: Vec<u32> = self
            .materials
            .iter_active()
            .filter(|(_, material)| material.sampler != NO_INDEX && material.sampler == sampler)
            .map(|(index, _)| index)
            .collect();
        for material in referencing {
            self.queue_material_update(material);
        }
    }

    // ========================================================================
    // Textures and samplers
    // ========================================================================

    fn create_texture_resources(
        &self,
        index: u32,
        event: &RenderEvent<'_>,
        uploads: &mut UploadQueues,
    ) -> TextureProxy {
        let desc: TexturePayload = event.read();
        let texels = event.trailing::<TexturePayload>();
        let format = TextureFormat::from_raw(desc.format)
            .unwrap_or_else(|| panic!("texture {index}: unknown format {}", desc.format));
        let (regions, size) = texture_regions(
            desc.width,
            desc.height,
            desc.mip_levels,
            desc.array_layers,
            format.block_size(),
        );
        assert!(
            texels.len() as u64 >= size,
            "texture {index}: {} texel bytes, {size} expected",
            texels.len()
        );

        let texture = self
            .backend
            .create_texture(
                &TextureDesc::new_2d(
                    format!("texture[{index}]"),
                    desc.width,
                    desc.height,
                    format,
                    TextureUsage::SAMPLED | TextureUsage::COPY_DST,
                )
                .with_mips(desc.mip_levels)
                .with_layers(desc.array_layers),
            )
            .unwrap_or_else(|err| panic!("texture {index}: {err}"));
        let staging = self
            .backend
            .create_buffer(&BufferDesc::staging(format!("texture[{index}] staging"), size))
            .unwrap_or_else(|err| panic!("texture {index} staging: {err}"));

        self.backend
            .write_buffer(staging, 0, &texels[..size as usize]);
        uploads.textures.push(TextureUpload {
            src: staging,
            dst: texture,
            regions,
            dst_state: ResourceState::ShaderRead,
        });

        TextureProxy {
            texture,
            staging,
            gpu_index: self.backend.texture_gpu_index(texture),
            width: desc.width,
            height: desc.height,
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            format,
        }
    }

    fn reload_texture(&mut self, index: u32, event: &RenderEvent<'_>, uploads: &mut UploadQueues) {
        assert!(self.textures.is_active(index), "texture {index} reloaded while inactive");
        let fresh = self.create_texture_resources(index, event, uploads);
        let old = std::mem::replace(self.textures.get_mut(index), fresh);
        uploads.textures.cancel(old.texture);
        self.schedule_destroy(DestroyEntry::Texture(old.texture));
        self.schedule_destroy(DestroyEntry::Buffer(old.staging));
        self.queue_updates_for_texture(index);
        log::debug!("Reloaded texture {index}");
    }

    fn destroy_texture(&mut self, index: u32, uploads: Option<&mut UploadQueues>) {
        let old = self.textures.retire(index);
        if let Some(uploads) = uploads {
            uploads.textures.cancel(old.texture);
        }
        self.schedule_destroy(DestroyEntry::Texture(old.texture));
        self.schedule_destroy(DestroyEntry::Buffer(old.staging));
        self.queue_updates_for_texture(index);
    }

    fn create_sampler(&mut self, index: u32, payload: SamplerPayload) {
        let desc = SamplerDesc {
            filter: if payload.filter == 0 {
                FilterMode::Nearest
            } else {
                FilterMode::Linear
            },
            address: match payload.address {
                1 => AddressMode::ClampToEdge,
                2 => AddressMode::MirrorRepeat,
                _ => AddressMode::Repeat,
            },
            comparison: payload.comparison != 0,
        };
        let sampler = self
            .backend
            .create_sampler(&desc)
            .unwrap_or_else(|err| panic!("sampler {index}: {err}"));
        let gpu_index = self.backend.sampler_gpu_index(sampler);
        *self.samplers.activate(index) = SamplerProxy { sampler, gpu_index };
        self.queue_updates_for_sampler(index);
    }

    fn destroy_sampler(&mut self, index: u32) {
        let old = self.samplers.retire(index);
        self.schedule_destroy(DestroyEntry::Sampler(old.sampler));
        self.queue_updates_for_sampler(index);
    }

    // ========================================================================
    // Shaders and materials
    // ========================================================================

    fn create_shader(&mut self, index: u32, payload: ShaderPayload) {
        let flags = ShaderFlags::from_bits_truncate(payload.flags);
        let blend = match payload.blend {
            1 => BlendMode::Alpha,
            2 => BlendMode::Additive,
            _ => BlendMode::Opaque,
        };
        let desc = content_pipeline_desc(
            format!("shader[{index}]"),
            payload.asset_hash,
            flags,
            blend,
            self.pipeline_layout,
        );
        let pipeline = self
            .backend
            .create_pipeline(&desc)
            .unwrap_or_else(|err| panic!("shader {index}: {err}"));
        *self.shaders.activate(index) = ShaderProxy {
            pipeline,
            flags,
            blend,
        };
    }

    fn destroy_shader(&mut self, index: u32) {
        let old = self.shaders.retire(index);
        self.schedule_destroy(DestroyEntry::Pipeline(old.pipeline));
    }

    fn write_material(material: &mut MaterialProxy, index: u32, payload: &MaterialPayload) {
        let count = payload.shader_count as usize;
        assert!(
            count <= MAX_MATERIAL_SHADERS,
            "material {index} has {count} shaders (max {MAX_MATERIAL_SHADERS})"
        );
        material.shaders = payload.shaders;
        material.shader_count = count;
        material.textures = payload.textures;
        material.sampler = payload.sampler;
        material.base_color = Vec4::from_array(payload.base_color);
        material.blend = MaterialBlend::from_raw(payload.blend);
        material.priority = payload.priority;
    }

    /// Resolve a material's constants and bind group entries against the
    /// current texture and sampler proxies.
    fn material_bindings(
        &self,
        index: u32,
        frame_index: usize,
    ) -> (MaterialConstants, Vec<(u32, BindEntry)>) {
        let material = self.materials.get(index);
        let mut constants = MaterialConstants {
            base_color: material.base_color.to_array(),
            texture_indices: [0; 4],
        };
        let mut entries = Vec::with_capacity(6);
        entries.push((
            0,
            BindEntry::Buffer {
                buffer: material.constants[frame_index],
                offset: 0,
                size: std::mem::size_of::<MaterialConstants>() as u64,
            },
        ));
        for (slot, texture) in material.textures.iter().enumerate() {
            let (id, gpu_index) = if *texture != NO_INDEX && self.textures.is_active(*texture) {
                let proxy = self.textures.get(*texture);
                (proxy.texture, proxy.gpu_index)
            } else {
                (
                    self.fallback_texture,
                    self.backend.texture_gpu_index(self.fallback_texture),
                )
            };
            constants.texture_indices[slot] = gpu_index;
            entries.push((1 + slot as u32, BindEntry::Texture(id)));
        }
        let sampler = if material.sampler != NO_INDEX && self.samplers.is_active(material.sampler) {
            self.samplers.get(material.sampler).sampler
        } else {
            self.fallback_sampler
        };
        entries.push((5, BindEntry::Sampler(sampler)));
        (constants, entries)
    }

    fn create_material(&mut self, index: u32, payload: MaterialPayload) {
        let backend = Arc::clone(&self.backend);
        let material = self.materials.activate(index);
        Self::write_material(material, index, &payload);
        material.constants = PerFrame::new(|slot| {
            backend
                .create_buffer(&BufferDesc::new(
                    format!("material[{index}] constants[{slot}]"),
                    std::mem::size_of::<MaterialConstants>() as u64,
                    BufferUsage::CONSTANT | BufferUsage::CPU_VISIBLE,
                ))
                .unwrap_or_else(|err| panic!("material {index}: {err}"))
        });

        let mut groups = Vec::with_capacity(BACK_BUFFER_COUNT);
        for slot in 0..BACK_BUFFER_COUNT {
            let (constants, entries) = self.material_bindings(index, slot);
            let material = self.materials.get(index);
            backend.write_buffer(material.constants[slot], 0, bytemuck::bytes_of(&constants));
            let group = backend
                .create_bind_group(&BindGroupDesc {
                    label: format!("material[{index}][{slot}]"),
                    layout: self.material_layout,
                    entries,
                })
                .unwrap_or_else(|err| panic!("material {index}: {err}"));
            groups.push(group);
        }
        self.materials.get_mut(index).bind_groups = PerFrame::new(|slot| groups[slot]);
    }

    fn update_material(&mut self, index: u32, payload: MaterialPayload) {
        assert!(self.materials.is_active(index), "material {index} updated while inactive");
        Self::write_material(self.materials.get_mut(index), index, &payload);
        self.queue_material_update(index);
    }

    fn destroy_material(&mut self, index: u32) {
        let old = self.materials.retire(index);
        for slot in 0..BACK_BUFFER_COUNT {
            self.schedule_destroy(DestroyEntry::BindGroup(old.bind_groups[slot]));
            self.schedule_destroy(DestroyEntry::Buffer(old.constants[slot]));
        }
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    fn create_mesh(&mut self, index: u32, event: &RenderEvent<'_>, uploads: &mut UploadQueues) {
        let payload: MeshPayload = event.read();
        let data = event.trailing::<MeshPayload>();
        let index_format = if payload.index_format == 0 {
            IndexFormat::Uint16
        } else {
            IndexFormat::Uint32
        };
        let vertex_bytes = payload.vertex_count as u64 * payload.vertex_stride as u64;
        let index_bytes = payload.index_count as u64 * index_format.size() as u64;
        let total = vertex_bytes + index_bytes;
        // Empty geometry is a content error, like an out-of-range index.
        assert!(
            vertex_bytes > 0 && index_bytes > 0,
            "mesh {index}: empty geometry ({} vertices, {} indices)",
            payload.vertex_count,
            payload.index_count
        );
        assert!(
            data.len() as u64 >= total,
            "mesh {index}: {} bytes of geometry, {total} expected",
            data.len()
        );

        let create = |label: String, size: u64, usage: BufferUsage| {
            self.backend
                .create_buffer(&BufferDesc::new(label, size, usage))
                .unwrap_or_else(|err| panic!("mesh {index}: {err}"))
        };
        let staging = create(
            format!("mesh[{index}] staging"),
            total,
            BufferUsage::CPU_VISIBLE | BufferUsage::COPY_SRC,
        );
        let vertex_buffer = create(
            format!("mesh[{index}] vertices"),
            vertex_bytes,
            BufferUsage::VERTEX | BufferUsage::COPY_DST,
        );
        let index_buffer = create(
            format!("mesh[{index}] indices"),
            index_bytes,
            BufferUsage::INDEX | BufferUsage::COPY_DST,
        );

        self.backend
            .write_buffer(staging, 0, &data[..total as usize]);
        uploads.buffers.push(BufferUpload {
            src: staging,
            dst: vertex_buffer,
            src_offset: 0,
            dst_offset: 0,
            size: vertex_bytes,
            dst_state: ResourceState::VertexBuffer,
        });
        uploads.buffers.push(BufferUpload {
            src: staging,
            dst: index_buffer,
            src_offset: vertex_bytes,
            dst_offset: 0,
            size: index_bytes,
            dst_state: ResourceState::IndexBuffer,
        });

        *self.meshes.activate(index) = MeshProxy {
            vertex_buffer,
            index_buffer,
            staging,
            vertex_count: payload.vertex_count,
            index_count: payload.index_count,
            vertex_stride: payload.vertex_stride,
            index_format,
            aabb_min: Vec3::from_array(payload.aabb_min),
            aabb_max: Vec3::from_array(payload.aabb_max),
        };
    }

    fn destroy_mesh(&mut self, index: u32, uploads: Option<&mut UploadQueues>) {
        let old = self.meshes.retire(index);
        if let Some(uploads) = uploads {
            uploads.buffers.cancel(old.vertex_buffer);
            uploads.buffers.cancel(old.index_buffer);
        }
        self.schedule_destroy(DestroyEntry::Buffer(old.vertex_buffer));
        self.schedule_destroy(DestroyEntry::Buffer(old.index_buffer));
        self.schedule_destroy(DestroyEntry::Buffer(old.staging));
    }

    // ========================================================================
    // Particles
    // ========================================================================

    fn emitter_state_buffer(&self, index: u32, max_particles: u32) -> (BufferId, u32) {
        let size = max_particles.max(1) as u64 * PARTICLE_STATE_SIZE;
        let buffer = self
            .backend
            .create_buffer(&BufferDesc::new(
                format!("emitter[{index}] state"),
                size,
                BufferUsage::STORAGE,
            ))
            .unwrap_or_else(|err| panic!("emitter {index}: {err}"));
        (buffer, self.backend.buffer_gpu_index(buffer))
    }

    fn create_emitter(&mut self, index: u32, payload: EmitterPayload) {
        let (state_buffer, state_gpu_index) = self.emitter_state_buffer(index, payload.max_particles);
        let emitter = self.emitters.activate(index);
        write_emitter(emitter, &payload);
        emitter.state_buffer = state_buffer;
        emitter.state_gpu_index = state_gpu_index;
    }

    fn update_emitter(&mut self, index: u32, payload: EmitterPayload) {
        assert!(self.emitters.is_active(index), "emitter {index} updated while inactive");
        if self.emitters.get(index).max_particles != payload.max_particles {
            let (buffer, gpu_index) = self.emitter_state_buffer(index, payload.max_particles);
            let emitter = self.emitters.get_mut(index);
            let old = std::mem::replace(&mut emitter.state_buffer, buffer);
            emitter.state_gpu_index = gpu_index;
            self.schedule_destroy(DestroyEntry::Buffer(old));
        }
        write_emitter(self.emitters.get_mut(index), &payload);
    }

    fn destroy_emitter(&mut self, index: u32) {
        let old = self.emitters.retire(index);
        self.schedule_destroy(DestroyEntry::Buffer(old.state_buffer));
    }

    /// Frame slot of the current render frame.
    pub fn frame_index(&self) -> usize {
        frame_slot(self.render_frame)
    }
}

/// Pipeline descriptor for a content shader with the given capabilities.
///
/// The flags decide which pass the pipeline renders in, and therefore its
/// attachment formats and depth mode.
pub fn content_pipeline_desc(
    label: String,
    asset_hash: u64,
    flags: ShaderFlags,
    blend: BlendMode,
    layout: BindLayoutId,
) -> PipelineDesc {
    let shader = ShaderSource::Asset(asset_hash);
    let (colors, depth_format, depth) = if flags.contains(ShaderFlags::SHADOW) {
        (vec![], formats::SHADOW_ATLAS, DepthMode::Write)
    } else if flags.contains(ShaderFlags::DEPTH_ONLY) {
        (vec![], formats::DEPTH, DepthMode::Write)
    } else if flags.contains(ShaderFlags::OBJECT_ID) {
        (vec![formats::OBJECT_ID], formats::DEPTH, DepthMode::ReadOnly)
    } else if flags.contains(ShaderFlags::TRANSPARENT) {
        (vec![formats::HDR], formats::DEPTH, DepthMode::ReadOnly)
    } else {
        (formats::GBUFFER.to_vec(), formats::DEPTH, DepthMode::Equal)
    };
    PipelineDesc::graphics(label, shader, layout, colors, Some(depth_format), depth).with_blend(blend)
}

fn write_camera(camera: &mut CameraProxy, payload: &CameraPayload) {
    camera.transform = payload.transform.to_mat4();
    camera.fov_y = payload.fov_y;
    camera.near = payload.near;
    camera.far = payload.far;
    camera.orthographic = payload.orthographic != 0;
    camera.ortho_height = payload.ortho_height;
}

fn write_light(light: &mut LightProxy, payload: &LightPayload) {
    light.kind = LightKind::from_raw(payload.kind);
    light.transform = payload.transform.to_mat4();
    light.color = Vec3::from_array(payload.color);
    light.intensity = payload.intensity;
    light.range = payload.range;
    light.inner_cone = payload.inner_cone;
    light.outer_cone = payload.outer_cone;
    light.cast_shadows = payload.cast_shadows != 0;
}

fn write_emitter(emitter: &mut EmitterProxy, payload: &EmitterPayload) {
    emitter.transform = payload.transform.to_mat4();
    emitter.color = Vec4::from_array(payload.color);
    emitter.max_particles = payload.max_particles;
    emitter.spawn_rate = payload.spawn_rate;
    emitter.lifetime = payload.lifetime;
    emitter.size = payload.size;
}

fn write_canvas_item(item: &mut CanvasItemProxy, payload: &CanvasItemPayload) {
    item.rect = Vec4::from_array(payload.rect);
    item.color = Vec4::from_array(payload.color);
    item.texture = payload.texture;
    item.layer = payload.layer;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{BindGroupId, DummyBackend, DummyCall};

    struct Fixture {
        backend: Arc<DummyBackend>,
        uploads: UploadQueues,
        stream: EventStream,
        manager: ProxyManager,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(DummyBackend::new());
        let layout = backend
            .create_bind_layout(&BindLayoutDesc::default())
            .unwrap();
        let mut uploads = UploadQueues::new(backend.as_ref()).unwrap();
        let manager = ProxyManager::new(
            backend.clone(),
            &ProxyCapacities::small(),
            layout,
            &mut uploads,
        )
        .unwrap();
        Fixture {
            backend,
            uploads,
            stream: EventStream::new(),
            manager,
        }
    }

    impl Fixture {
        fn apply(&mut self, batch: EventBatchWriter) -> FetchStats {
            self.stream.push_batch(batch.finish());
            self.manager
                .fetch_render_events(&self.stream, &mut self.uploads)
        }
    }

    fn texture_payload() -> TexturePayload {
        TexturePayload {
            width: 2,
            height: 2,
            mip_levels: 1,
            array_layers: 1,
            format: TextureFormat::Rgba8Unorm as u32,
        }
    }

    fn material_payload(shaders: &[u32], texture: u32) -> MaterialPayload {
        let mut payload = MaterialPayload {
            shaders: [NO_INDEX; MAX_MATERIAL_SHADERS],
            shader_count: shaders.len() as u32,
            textures: [texture, NO_INDEX, NO_INDEX, NO_INDEX],
            sampler: NO_INDEX,
            base_color: [1.0; 4],
            blend: 0,
            priority: 0,
        };
        payload.shaders[..shaders.len()].copy_from_slice(shaders);
        payload
    }

    #[test]
    fn test_fallback_texture_uploaded() {
        let fx = fixture();
        assert_eq!(fx.uploads.textures.len(), 1);
        assert!(fx.manager.main_camera().is_none());
        assert!(fx.manager.ambient_light().is_black());
    }

    #[test]
    fn test_create_and_destroy_texture_in_one_batch() {
        let mut fx = fixture();
        fx.manager.begin_frame(4);

        let mut batch = EventBatchWriter::new();
        batch.create_texture(5, &texture_payload(), &[0xAA; 16]);
        batch.destroy_texture(5);
        let stats = fx.apply(batch);
        assert_eq!(stats, FetchStats { batches: 1, events: 2 });

        let bucket = fx.manager.destroy_buckets().bucket(DestroyBuckets::bucket_for(4));
        assert_eq!(bucket.len(), 2);
        let textures = bucket
            .iter()
            .filter(|entry| matches!(entry, DestroyEntry::Texture(_)))
            .count();
        assert_eq!(textures, 1);
        // Only the fallback upload survives.
        assert_eq!(fx.uploads.textures.len(), 1);
        assert!(!fx.manager.textures().is_active(5));
    }

    #[test]
    fn test_destroyed_texture_outlives_in_flight_frames() {
        let mut fx = fixture();
        fx.manager.begin_frame(1);
        let mut batch = EventBatchWriter::new();
        batch.create_texture(0, &texture_payload(), &[0; 16]);
        fx.apply(batch);
        let texture = fx.manager.get_texture(0).texture;

        let mut batch = EventBatchWriter::new();
        batch.destroy_texture(0);
        fx.apply(batch);

        for frame in 1..3 {
            fx.manager.begin_frame(frame);
            fx.manager.flush_destroys(false);
            assert!(fx.backend.is_texture_live(texture), "destroyed at frame {frame}");
        }
        fx.manager.begin_frame(3);
        fx.manager.flush_destroys(false);
        assert!(!fx.backend.is_texture_live(texture));
    }

    #[test]
    fn test_shader_variant_lookup() {
        let mut fx = fixture();
        let mut batch = EventBatchWriter::new();
        batch.create_shader(
            0,
            &ShaderPayload {
                flags: 0,
                blend: 0,
                asset_hash: 11,
            },
        );
        batch.create_shader(
            1,
            &ShaderPayload {
                flags: (ShaderFlags::DEPTH_ONLY | ShaderFlags::SHADOW).bits(),
                blend: 0,
                asset_hash: 12,
            },
        );
        batch.create_material(0, &material_payload(&[0, 1], NO_INDEX));
        fx.apply(batch);

        let base = fx.manager.get_shader(0).pipeline;
        let depth = fx.manager.get_shader(1).pipeline;
        assert_eq!(fx.manager.get_shader_variant(0, ShaderFlags::empty()), base);
        assert_eq!(fx.manager.get_shader_variant(0, ShaderFlags::SHADOW), depth);
        assert!(fx
            .manager
            .get_shader_variant(0, ShaderFlags::OBJECT_ID)
            .is_null());
    }

    #[test]
    fn test_texture_reload_patches_each_slot() {
        let mut fx = fixture();
        let mut batch = EventBatchWriter::new();
        batch.create_texture(2, &texture_payload(), &[1; 16]);
        batch.create_material(7, &material_payload(&[], 2));
        fx.apply(batch);
        let old = fx.manager.get_texture(2).texture;

        let mut batch = EventBatchWriter::new();
        batch.reload_texture(2, &texture_payload(), &[2; 16]);
        fx.apply(batch);
        let fresh = fx.manager.get_texture(2).texture;
        assert_ne!(old, fresh);

        fx.backend.take_calls();
        fx.manager.flush_material_updates(0);
        let patched: Vec<_> = fx
            .backend
            .take_calls()
            .into_iter()
            .filter_map(|call| match call {
                DummyCall::UpdateBindGroup { group, entries } => Some((group, entries)),
                _ => None,
            })
            .collect();
        assert_eq!(patched.len(), 1);
        assert_eq!(patched[0].0, fx.manager.get_material(7).bind_groups[0]);
        assert!(patched[0].1.contains(&(1, BindEntry::Texture(fresh))));

        // Slot 1 is still queued until its own frame comes around.
        fx.manager.flush_material_updates(1);
        assert_eq!(
            fx.backend
                .take_calls()
                .iter()
                .filter(|call| matches!(call, DummyCall::UpdateBindGroup { .. }))
                .count(),
            1
        );
    }

    /// Bind group patches recorded by one `flush_material_updates` call.
    fn flushed_patches(fx: &mut Fixture, slot: usize) -> Vec<(BindGroupId, Vec<(u32, BindEntry)>)> {
        fx.backend.take_calls();
        fx.manager.flush_material_updates(slot);
        fx.backend
            .take_calls()
            .into_iter()
            .filter_map(|call| match call {
                DummyCall::UpdateBindGroup { group, entries } => Some((group, entries)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_recreated_texture_repoints_material() {
        let mut fx = fixture();
        let mut batch = EventBatchWriter::new();
        batch.create_texture(2, &texture_payload(), &[1; 16]);
        batch.create_material(7, &material_payload(&[], 2));
        fx.apply(batch);
        for slot in 0..BACK_BUFFER_COUNT {
            flushed_patches(&mut fx, slot);
        }

        let mut batch = EventBatchWriter::new();
        batch.destroy_texture(2);
        fx.apply(batch);
        for slot in 0..BACK_BUFFER_COUNT {
            let patched = flushed_patches(&mut fx, slot);
            assert_eq!(patched.len(), 1);
            assert!(patched[0].1.contains(&(1, BindEntry::Texture(fx.manager.fallback_texture))));
        }

        let mut batch = EventBatchWriter::new();
        batch.create_texture(2, &texture_payload(), &[2; 16]);
        fx.apply(batch);
        let fresh = fx.manager.get_texture(2).texture;
        for slot in 0..BACK_BUFFER_COUNT {
            let patched = flushed_patches(&mut fx, slot);
            assert_eq!(patched.len(), 1, "slot {slot}");
            assert_eq!(patched[0].0, fx.manager.get_material(7).bind_groups[slot]);
            assert!(patched[0].1.contains(&(1, BindEntry::Texture(fresh))), "slot {slot}");
        }
    }

    #[test]
    fn test_sampler_lifecycle_repoints_material() {
        let mut fx = fixture();
        let sampler = SamplerPayload {
            filter: 1,
            address: 1,
            comparison: 0,
        };
        let mut payload = material_payload(&[], NO_INDEX);
        payload.sampler = 3;
        let mut batch = EventBatchWriter::new();
        batch.create_material(0, &payload);
        fx.apply(batch);
        // Bound to the fallback sampler at creation.
        assert!(flushed_patches(&mut fx, 0).is_empty());

        let mut batch = EventBatchWriter::new();
        batch.create_sampler(3, &sampler);
        fx.apply(batch);
        let created = fx.manager.get_sampler(3).sampler;
        let patched = flushed_patches(&mut fx, 0);
        assert_eq!(patched.len(), 1);
        assert!(patched[0].1.contains(&(5, BindEntry::Sampler(created))));

        let mut batch = EventBatchWriter::new();
        batch.destroy_sampler(3);
        fx.apply(batch);
        let patched = flushed_patches(&mut fx, 0);
        assert_eq!(patched.len(), 1);
        assert!(patched[0].1.contains(&(5, BindEntry::Sampler(fx.manager.fallback_sampler))));
    }

    #[test]
    fn test_mesh_uploads_split_staging() {
        let mut fx = fixture();
        let mesh = MeshPayload {
            vertex_count: 3,
            index_count: 3,
            vertex_stride: 12,
            index_format: 0,
            aabb_min: [-1.0; 3],
            aabb_max: [1.0; 3],
        };
        let mut batch = EventBatchWriter::new();
        batch.create_mesh(0, &mesh, &[0; 36], bytemuck::cast_slice(&[0u16, 1, 2]));
        fx.apply(batch);

        let pending = fx.uploads.buffers.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].src_offset, 36);
        assert_eq!(pending[1].size, 6);
        assert_eq!(fx.manager.get_mesh(0).index_format, IndexFormat::Uint16);
    }

    #[test]
    #[should_panic(expected = "mesh 4: empty geometry (3 vertices, 0 indices)")]
    fn test_mesh_without_indices_panics() {
        let mut fx = fixture();
        let mesh = MeshPayload {
            vertex_count: 3,
            index_count: 0,
            vertex_stride: 12,
            index_format: 0,
            aabb_min: [-1.0; 3],
            aabb_max: [1.0; 3],
        };
        let mut batch = EventBatchWriter::new();
        batch.create_mesh(4, &mesh, &[0; 36], &[]);
        fx.apply(batch);
    }

    #[test]
    fn test_destroying_main_camera_clears_it() {
        let mut fx = fixture();
        let camera = CameraPayload {
            transform: Transform3x4::IDENTITY,
            fov_y: 1.0,
            near: 0.1,
            far: 100.0,
            orthographic: 0,
            ortho_height: 0.0,
        };
        let mut batch = EventBatchWriter::new();
        batch.create_camera(1, &camera);
        batch.set_main_camera(1);
        fx.apply(batch);
        assert!(fx.manager.main_camera().is_some());

        let mut batch = EventBatchWriter::new();
        batch.destroy_camera(1);
        fx.apply(batch);
        assert!(fx.manager.main_camera().is_none());
    }

    #[test]
    #[should_panic(expected = "not active")]
    fn test_main_camera_must_exist() {
        let mut fx = fixture();
        let mut batch = EventBatchWriter::new();
        batch.set_main_camera(0);
        fx.apply(batch);
    }

    #[test]
    fn test_emitter_resize_replaces_state_buffer() {
        let mut fx = fixture();
        let mut emitter = EmitterPayload {
            transform: Transform3x4::IDENTITY,
            color: [1.0; 4],
            max_particles: 64,
            spawn_rate: 10.0,
            lifetime: 1.0,
            size: 0.1,
        };
        let mut batch = EventBatchWriter::new();
        batch.create_emitter(0, &emitter);
        fx.apply(batch);
        let first = fx.manager.get_emitter(0).state_buffer;

        emitter.max_particles = 128;
        let mut batch = EventBatchWriter::new();
        batch.update_emitter(0, &emitter);
        fx.apply(batch);
        assert_ne!(fx.manager.get_emitter(0).state_buffer, first);
        assert_eq!(fx.manager.destroy_buckets().pending(), 1);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut fx = fixture();
        let mut batch = EventBatchWriter::new();
        batch.create_texture(0, &texture_payload(), &[0; 16]);
        batch.create_shader(
            0,
            &ShaderPayload {
                flags: 0,
                blend: 0,
                asset_hash: 1,
            },
        );
        batch.create_material(0, &material_payload(&[0], 0));
        fx.apply(batch);

        fx.manager.shutdown();
        fx.uploads.destroy(fx.backend.as_ref());
        // The pipeline layout passed in is owned by the caller.
        assert_eq!(fx.backend.live_object_count(), 1);
    }
}
