//! Object ids, selection outlines and cursor picking for tool mode.
//!
//! Every visible renderable writes its object id into an `R32Uint` target.
//! A fullscreen pass then draws outlines around `SELECTED` objects into the
//! editor target. A left click copies the id under the cursor into a
//! per-slot readback buffer, read back once that slot's frame has retired.

use bytemuck::{Pod, Zeroable};

use super::{
    DrawList, EngineShaders, PassCommandBuffers, PassContext, RenderPass, SlotBuffers,
    SlotTargets, TargetSpec,
};
use crate::config::{BACK_BUFFER_COUNT, RendererConfig, formats};
use crate::error::BackendResult;
use crate::gfx::{
    BindPoint, BufferTextureCopy, BufferUsage, ColorAttachment, CommandBufferId, DepthAttachment,
    GfxBackend, PipelineId, QueueType, RenderPassDesc, ResourceState, TextureId, TextureUsage,
    Viewport,
};
use crate::proxy::{EntityFlags, ProxyManager, ShaderFlags};
use crate::scene::{CollectStats, DrawFilter, MESH_INSTANCE_ID_BIT, View};
use crate::window::{MouseButton, WindowEvent};

const OBJECT_IDS: TargetSpec = TargetSpec::new(
    "object_ids",
    formats::OBJECT_ID,
    TextureUsage::RENDER_TARGET
        .union(TextureUsage::SAMPLED)
        .union(TextureUsage::COPY_SRC),
);

const EDITOR: TargetSpec = TargetSpec::new(
    "editor",
    formats::LDR,
    TextureUsage::RENDER_TARGET.union(TextureUsage::SAMPLED),
);

/// Id written where no object is drawn.
pub const NO_OBJECT: u32 = 0;

/// What a picked object id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickedObject {
    Entity(u32),
    MeshInstance(u32),
}

impl PickedObject {
    /// Decode an object id as written by the collector.
    pub fn from_object_id(id: u32) -> Option<Self> {
        if id == NO_OBJECT {
            return None;
        }
        let index = (id & !MESH_INSTANCE_ID_BIT) - 1;
        if id & MESH_INSTANCE_ID_BIT != 0 {
            Some(Self::MeshInstance(index))
        } else {
            Some(Self::Entity(index))
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OutlineConstants {
    object_ids: u32,
    selection: u32,
    selection_count: u32,
    _pad: u32,
}

pub struct ObjectIdPass {
    outline: PipelineId,
    ids: SlotTargets,
    editor: SlotTargets,
    draws: DrawList,
    selection: SlotBuffers,
    selection_count: u32,
    readback: SlotBuffers,
    cursor: Option<(u32, u32)>,
    pick_requested: bool,
    /// Pixel copied in each slot, waiting for that slot to retire.
    pending_picks: [Option<(u32, u32)>; BACK_BUFFER_COUNT],
    picked: Option<PickedObject>,
    command_buffers: PassCommandBuffers,
}

impl ObjectIdPass {
    pub fn new(
        backend: &dyn GfxBackend,
        config: &RendererConfig,
        shaders: &EngineShaders,
    ) -> BackendResult<Self> {
        let (width, height) = config.resolution;
        let ids = SlotTargets::new(backend, OBJECT_IDS, width, height)?;
        let editor = SlotTargets::new(backend, EDITOR, width, height)
            .inspect_err(|_| ids.destroy(backend))?;
        let draws = DrawList::new(
            backend,
            "object_id instances",
            DrawFilter::All,
            ShaderFlags::OBJECT_ID,
            config.max_draws_per_pass,
            config.frame_arena_size,
        )
        .inspect_err(|_| {
            editor.destroy(backend);
            ids.destroy(backend);
        })?;
        let selectable = config.capacities.entities + config.capacities.mesh_instances;
        let selection = SlotBuffers::new(
            backend,
            "selection",
            (selectable * std::mem::size_of::<u32>()) as u64,
            BufferUsage::STORAGE,
        )
        .inspect_err(|_| {
            draws.destroy(backend);
            editor.destroy(backend);
            ids.destroy(backend);
        })?;
        let readback = SlotBuffers::new(
            backend,
            "pick readback",
            std::mem::size_of::<u32>() as u64,
            BufferUsage::READBACK | BufferUsage::COPY_DST,
        )
        .inspect_err(|_| {
            selection.destroy(backend);
            draws.destroy(backend);
            editor.destroy(backend);
            ids.destroy(backend);
        })?;
        let command_buffers = PassCommandBuffers::new(backend, QueueType::Graphics, "object_id")
            .inspect_err(|_| {
                readback.destroy(backend);
                selection.destroy(backend);
                draws.destroy(backend);
                editor.destroy(backend);
                ids.destroy(backend);
            })?;
        Ok(Self {
            outline: shaders.outline,
            ids,
            editor,
            draws,
            selection,
            selection_count: 0,
            readback,
            cursor: None,
            pick_requested: false,
            pending_picks: [None; BACK_BUFFER_COUNT],
            picked: None,
            command_buffers,
        })
    }

    pub fn editor(&self, frame_index: usize) -> TextureId {
        self.editor.get(frame_index).texture
    }

    pub fn editor_index(&self, frame_index: usize) -> u32 {
        self.editor.get(frame_index).gpu_index
    }

    pub fn object_ids_index(&self, frame_index: usize) -> u32 {
        self.ids.get(frame_index).gpu_index
    }

    /// Object under the cursor at the last resolved click.
    pub fn picked_object(&self) -> Option<PickedObject> {
        self.picked
    }

    pub fn selection_count(&self) -> u32 {
        self.selection_count
    }

    /// Track the cursor and turn left clicks into pick requests.
    pub fn on_window_event(&mut self, event: &WindowEvent) {
        match *event {
            WindowEvent::CursorMoved { x, y } => {
                let (width, height) = self.ids.extent();
                self.cursor = (x >= 0.0 && y >= 0.0 && (x as u32) < width && (y as u32) < height)
                    .then_some((x as u32, y as u32));
            }
            WindowEvent::MouseButton {
                button: MouseButton::Left,
                pressed: true,
            } => {
                self.pick_requested = self.cursor.is_some();
            }
            WindowEvent::Focus(false) => self.cursor = None,
            _ => {}
        }
    }

    /// Read back the pick copied the last time this slot was recorded. Must
    /// run after the slot's frame has retired.
    pub fn resolve_pick(&mut self, backend: &dyn GfxBackend, frame_index: usize) {
        if let Some((x, y)) = self.pending_picks[frame_index].take() {
            let bytes = backend.read_buffer(self.readback.get(frame_index), 0, std::mem::size_of::<u32>());
            let id = bytemuck::pod_read_unaligned::<u32>(&bytes);
            self.picked = PickedObject::from_object_id(id);
            log::debug!("Picked {:?} at ({x}, {y})", self.picked);
        }
    }

    pub fn prepare(
        &mut self,
        backend: &dyn GfxBackend,
        proxies: &ProxyManager,
        view: &View,
        frame_index: usize,
    ) -> CollectStats {
        crate::profile_scope!("object_id::prepare");
        self.resolve_pick(backend, frame_index);

        let entities = proxies
            .entities()
            .iter_active()
            .filter(|(_, entity)| entity.flags.contains(EntityFlags::SELECTED))
            .map(|(index, _)| index + 1);
        let instances = proxies
            .mesh_instances()
            .iter_active()
            .filter(|(_, instance)| instance.flags.contains(EntityFlags::SELECTED))
            .map(|(index, _)| (index + 1) | MESH_INSTANCE_ID_BIT);
        let selection: Vec<u32> = entities.chain(instances).collect();
        self.selection
            .write(backend, frame_index, bytemuck::cast_slice(&selection));
        self.selection_count = selection.len() as u32;

        self.draws.prepare(backend, proxies, view, frame_index)
    }

    /// Record object ids, the pick copy and the outline composite.
    pub fn render(&mut self, ctx: &mut PassContext<'_>, depth: TextureId) -> CommandBufferId {
        crate::profile_scope!("object_id::render");
        let backend = ctx.backend;
        let frame_index = ctx.frame_index;
        let cb = self.command_buffers.begin(backend, frame_index);
        let ids = self.ids.get(frame_index);
        let editor = self.editor.get(frame_index);
        let (width, height) = self.ids.extent();
        let viewport = Viewport::from_dimensions(width, height);

        ctx.tracker
            .texture(ids.texture, ResourceState::RenderTarget)
            .texture(depth, ResourceState::DepthRead);
        ctx.flush_barriers(cb);
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "object_ids",
                color: vec![ColorAttachment::clear(ids.texture, [0.0; 4])],
                depth: Some(DepthAttachment::read_only(depth)),
            },
        );
        backend.cmd_set_viewport(cb, &viewport);
        if !self.draws.is_empty() {
            ctx.bind_globals(cb, BindPoint::Graphics);
            self.draws.record(backend, cb, frame_index, 0);
        }
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(depth);

        let pick = std::mem::take(&mut self.pick_requested);
        if let Some(pixel) = self.cursor.filter(|_| pick) {
            ctx.tracker.texture(ids.texture, ResourceState::CopySrc);
            ctx.flush_barriers(cb);
            backend.cmd_copy_texture_to_buffer(
                cb,
                ids.texture,
                self.readback.get(frame_index),
                &[BufferTextureCopy {
                    buffer_offset: 0,
                    mip_level: 0,
                    array_layer: 0,
                    width: 1,
                    height: 1,
                    origin: pixel,
                }],
            );
            self.pending_picks[frame_index] = Some(pixel);
        }

        ctx.tracker
            .rest_texture(ids.texture)
            .texture(editor.texture, ResourceState::RenderTarget);
        ctx.flush_barriers(cb);
        backend.cmd_begin_render_pass(
            cb,
            &RenderPassDesc {
                label: "outline",
                color: vec![ColorAttachment::clear(editor.texture, [0.0; 4])],
                depth: None,
            },
        );
        backend.cmd_set_viewport(cb, &viewport);
        if self.selection_count > 0 {
            ctx.bind_globals(cb, BindPoint::Graphics);
            backend.cmd_bind_pipeline(cb, self.outline);
            let constants = OutlineConstants {
                object_ids: ids.gpu_index,
                selection: self.selection.gpu_index(frame_index),
                selection_count: self.selection_count,
                _pad: 0,
            };
            backend.cmd_push_constants(cb, bytemuck::bytes_of(&constants));
            backend.cmd_draw(cb, 3, 1, 0, 0);
        }
        backend.cmd_end_render_pass(cb);
        ctx.tracker.rest_texture(editor.texture);
        ctx.flush_barriers(cb);
        backend.end_commands(cb);
        cb
    }
}

impl RenderPass for ObjectIdPass {
    fn name(&self) -> &'static str {
        "object_id"
    }

    fn textures(&self) -> Vec<TextureId> {
        self.ids.textures().chain(self.editor.textures()).collect()
    }

    fn targets(&self, frame_index: usize) -> Vec<(&'static str, u32)> {
        vec![
            ("object_ids", self.object_ids_index(frame_index)),
            ("editor", self.editor_index(frame_index)),
        ]
    }

    fn on_resize(&mut self, backend: &dyn GfxBackend, width: u32, height: u32) -> BackendResult<()> {
        // Picks in flight refer to pixels of the old targets.
        self.pending_picks = [None; BACK_BUFFER_COUNT];
        self.cursor = None;
        self.ids.resize(backend, width, height)?;
        self.editor.resize(backend, width, height)
    }

    fn destroy(&mut self, backend: &dyn GfxBackend) {
        self.command_buffers.destroy(backend);
        self.readback.destroy(backend);
        self.selection.destroy(backend);
        self.draws.destroy(backend);
        self.editor.destroy(backend);
        self.ids.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_decoding() {
        assert_eq!(PickedObject::from_object_id(NO_OBJECT), None);
        assert_eq!(PickedObject::from_object_id(1), Some(PickedObject::Entity(0)));
        assert_eq!(
            PickedObject::from_object_id(8 | MESH_INSTANCE_ID_BIT),
            Some(PickedObject::MeshInstance(7))
        );
    }
}
