use std::sync::Arc;

use bytemuck::Pod;

use super::wire::*;

/// Builds one batch of render events.
///
/// The simulation side fills a writer per tick and hands the finished batch
/// to [`EventStream::push_batch`](super::EventStream::push_batch). Records are
/// applied in exactly the order they are written.
///
/// ```
/// use render_core::events::{EventBatchWriter, EventStream, Transform3x4};
///
/// let stream = EventStream::new();
/// let mut batch = EventBatchWriter::new();
/// batch.update_entity_transform(3, &Transform3x4::IDENTITY);
/// batch.destroy_entity(4);
/// stream.push_batch(batch.finish());
/// assert_eq!(stream.pending_batches(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct EventBatchWriter {
    bytes: Vec<u8>,
    count: usize,
}

impl EventBatchWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records written.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a record whose payload is the concatenation of `parts`.
    pub fn push_raw(&mut self, event_type: RenderEventType, index: u32, parts: &[&[u8]]) {
        let payload_size: usize = parts.iter().map(|part| part.len()).sum();
        let header = RenderEventHeader {
            event_type: event_type as u16,
            reserved: 0,
            index,
            payload_size: payload_size as u32,
        };
        self.bytes.extend_from_slice(bytemuck::bytes_of(&header));
        for part in parts {
            self.bytes.extend_from_slice(part);
        }
        self.count += 1;
    }

    fn push<T: Pod>(&mut self, event_type: RenderEventType, index: u32, payload: &T) {
        self.push_raw(event_type, index, &[bytemuck::bytes_of(payload)]);
    }

    fn push_empty(&mut self, event_type: RenderEventType, index: u32) {
        self.push_raw(event_type, index, &[]);
    }

    /// Finish the batch.
    pub fn finish(self) -> Arc<[u8]> {
        Arc::from(self.bytes)
    }

    // === Textures and samplers ===

    /// Create a texture. `texels` holds every subresource, layer-major.
    pub fn create_texture(&mut self, index: u32, desc: &TexturePayload, texels: &[u8]) {
        self.push_raw(
            RenderEventType::CreateTexture,
            index,
            &[bytemuck::bytes_of(desc), texels],
        );
    }

    /// Replace a texture's content (hot reload).
    pub fn reload_texture(&mut self, index: u32, desc: &TexturePayload, texels: &[u8]) {
        self.push_raw(
            RenderEventType::ReloadTexture,
            index,
            &[bytemuck::bytes_of(desc), texels],
        );
    }

    pub fn destroy_texture(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyTexture, index);
    }

    pub fn create_sampler(&mut self, index: u32, sampler: &SamplerPayload) {
        self.push(RenderEventType::CreateSampler, index, sampler);
    }

    pub fn destroy_sampler(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroySampler, index);
    }

    // === Shaders and materials ===

    pub fn create_shader(&mut self, index: u32, shader: &ShaderPayload) {
        self.push(RenderEventType::CreateShader, index, shader);
    }

    pub fn destroy_shader(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyShader, index);
    }

    pub fn create_material(&mut self, index: u32, material: &MaterialPayload) {
        self.push(RenderEventType::CreateMaterial, index, material);
    }

    pub fn update_material(&mut self, index: u32, material: &MaterialPayload) {
        self.push(RenderEventType::UpdateMaterial, index, material);
    }

    pub fn destroy_material(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyMaterial, index);
    }

    // === Geometry ===

    /// Create a mesh from raw vertex and index bytes.
    pub fn create_mesh(&mut self, index: u32, mesh: &MeshPayload, vertices: &[u8], indices: &[u8]) {
        self.push_raw(
            RenderEventType::CreateMesh,
            index,
            &[bytemuck::bytes_of(mesh), vertices, indices],
        );
    }

    pub fn destroy_mesh(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyMesh, index);
    }

    pub fn create_model(&mut self, index: u32, model: &ModelPayload) {
        self.push(RenderEventType::CreateModel, index, model);
    }

    pub fn destroy_model(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyModel, index);
    }

    // === Entities ===

    pub fn create_entity(&mut self, index: u32, entity: &EntityPayload) {
        self.push(RenderEventType::CreateEntity, index, entity);
    }

    pub fn update_entity_transform(&mut self, index: u32, transform: &Transform3x4) {
        self.push(RenderEventType::UpdateEntityTransform, index, transform);
    }

    pub fn update_entity_flags(&mut self, index: u32, flags: u32) {
        self.push(RenderEventType::UpdateEntityFlags, index, &flags);
    }

    pub fn destroy_entity(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyEntity, index);
    }

    pub fn create_mesh_instance(&mut self, index: u32, instance: &MeshInstancePayload) {
        self.push(RenderEventType::CreateMeshInstance, index, instance);
    }

    pub fn update_mesh_instance_transform(&mut self, index: u32, transform: &Transform3x4) {
        self.push(RenderEventType::UpdateMeshInstanceTransform, index, transform);
    }

    pub fn destroy_mesh_instance(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyMeshInstance, index);
    }

    // === Cameras and lights ===

    pub fn create_camera(&mut self, index: u32, camera: &CameraPayload) {
        self.push(RenderEventType::CreateCamera, index, camera);
    }

    pub fn update_camera(&mut self, index: u32, camera: &CameraPayload) {
        self.push(RenderEventType::UpdateCamera, index, camera);
    }

    pub fn set_main_camera(&mut self, index: u32) {
        self.push_empty(RenderEventType::SetMainCamera, index);
    }

    pub fn destroy_camera(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyCamera, index);
    }

    pub fn create_light(&mut self, index: u32, light: &LightPayload) {
        self.push(RenderEventType::CreateLight, index, light);
    }

    pub fn update_light(&mut self, index: u32, light: &LightPayload) {
        self.push(RenderEventType::UpdateLight, index, light);
    }

    pub fn destroy_light(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyLight, index);
    }

    pub fn set_ambient_light(&mut self, ambient: &AmbientLightPayload) {
        self.push(RenderEventType::SetAmbientLight, 0, ambient);
    }

    // === Particles, canvas, physics debug ===

    pub fn create_emitter(&mut self, index: u32, emitter: &EmitterPayload) {
        self.push(RenderEventType::CreateEmitter, index, emitter);
    }

    pub fn update_emitter(&mut self, index: u32, emitter: &EmitterPayload) {
        self.push(RenderEventType::UpdateEmitter, index, emitter);
    }

    pub fn destroy_emitter(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyEmitter, index);
    }

    pub fn create_canvas_item(&mut self, index: u32, item: &CanvasItemPayload) {
        self.push(RenderEventType::CreateCanvasItem, index, item);
    }

    pub fn update_canvas_item(&mut self, index: u32, item: &CanvasItemPayload) {
        self.push(RenderEventType::UpdateCanvasItem, index, item);
    }

    pub fn destroy_canvas_item(&mut self, index: u32) {
        self.push_empty(RenderEventType::DestroyCanvasItem, index);
    }

    /// Replace the physics debug line list.
    pub fn set_physics_debug_lines(&mut self, lines: &[DebugLine]) {
        let count = lines.len() as u32;
        self.push_raw(
            RenderEventType::SetPhysicsDebugLines,
            0,
            &[bytemuck::bytes_of(&count), bytemuck::cast_slice(lines)],
        );
    }
}
