use std::collections::HashMap;

use crate::gfx::{Barrier, BufferId, CommandBufferId, GfxBackend, ResourceState, TextureId};

#[derive(Debug, Clone, Copy)]
struct Tracked {
    current: ResourceState,
    resting: ResourceState,
}

/// Explicit transition table for textures and buffers owned by passes.
///
/// Every tracked resource has a *resting* state, the state a pass leaves it in
/// for its successors. A pass requests the state it needs on entry, records
/// the resulting barriers, and returns the resource to rest on exit:
///
/// ```ignore
/// tracker
///     .texture(depth, ResourceState::DepthWrite)
///     .record(backend, cb);
/// // ... draw ...
/// tracker.rest_texture(depth).record(backend, cb);
/// ```
///
/// Transitions are computed in recording order. The world renderer records
/// passes in the same order the queues execute them, so the table matches
/// what the GPU sees.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    textures: HashMap<TextureId, Tracked>,
    buffers: HashMap<BufferId, Tracked>,
    pending: Vec<Barrier>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a texture currently in `current`.
    pub fn register_texture(
        &mut self,
        texture: TextureId,
        current: ResourceState,
        resting: ResourceState,
    ) {
        let previous = self
            .textures
            .insert(texture, Tracked { current, resting });
        debug_assert!(previous.is_none(), "texture {texture:?} registered twice");
    }

    /// Start tracking a buffer currently in `current`.
    pub fn register_buffer(
        &mut self,
        buffer: BufferId,
        current: ResourceState,
        resting: ResourceState,
    ) {
        let previous = self.buffers.insert(buffer, Tracked { current, resting });
        debug_assert!(previous.is_none(), "buffer {buffer:?} registered twice");
    }

    pub fn forget_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    pub fn forget_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    pub fn texture_state(&self, texture: TextureId) -> Option<ResourceState> {
        self.textures.get(&texture).map(|t| t.current)
    }

    pub fn buffer_state(&self, buffer: BufferId) -> Option<ResourceState> {
        self.buffers.get(&buffer).map(|t| t.current)
    }

    /// Request `to` for a tracked texture.
    ///
    /// # Panics
    ///
    /// Panics if the texture is not tracked.
    pub fn texture(&mut self, texture: TextureId, to: ResourceState) -> &mut Self {
        let tracked = self
            .textures
            .get_mut(&texture)
            .unwrap_or_else(|| panic!("texture {texture:?} is not tracked"));
        if tracked.current != to {
            self.pending
                .push(Barrier::texture(texture, tracked.current, to));
            tracked.current = to;
        }
        self
    }

    /// Request `to` for a tracked buffer.
    pub fn buffer(&mut self, buffer: BufferId, to: ResourceState) -> &mut Self {
        let tracked = self
            .buffers
            .get_mut(&buffer)
            .unwrap_or_else(|| panic!("buffer {buffer:?} is not tracked"));
        if tracked.current != to {
            self.pending.push(Barrier::buffer(buffer, tracked.current, to));
            tracked.current = to;
        }
        self
    }

    /// Return a texture to its resting state.
    pub fn rest_texture(&mut self, texture: TextureId) -> &mut Self {
        let resting = self
            .textures
            .get(&texture)
            .map(|t| t.resting)
            .unwrap_or_else(|| panic!("texture {texture:?} is not tracked"));
        self.texture(texture, resting)
    }

    /// Return a buffer to its resting state.
    pub fn rest_buffer(&mut self, buffer: BufferId) -> &mut Self {
        let resting = self
            .buffers
            .get(&buffer)
            .map(|t| t.resting)
            .unwrap_or_else(|| panic!("buffer {buffer:?} is not tracked"));
        self.buffer(buffer, resting)
    }

    /// Barriers requested since the last `record` / `take_pending`.
    pub fn take_pending(&mut self) -> Vec<Barrier> {
        std::mem::take(&mut self.pending)
    }

    /// Record pending barriers into `cb`.
    pub fn record(&mut self, backend: &dyn GfxBackend, cb: CommandBufferId) {
        if !self.pending.is_empty() {
            backend.cmd_barrier(cb, &self.pending);
            self.pending.clear();
        }
    }

    /// Resources not currently in their resting state.
    pub fn unrested(&self) -> usize {
        self.textures
            .values()
            .chain(self.buffers.values())
            .filter(|t| t.current != t.resting)
            .count()
    }

    /// Assert every tracked resource is back at rest. Checked at frame end.
    pub fn assert_all_resting(&self) {
        for (texture, tracked) in &self.textures {
            assert!(
                tracked.current == tracked.resting,
                "texture {texture:?} left in {:?}, expected {:?}",
                tracked.current,
                tracked.resting
            );
        }
        for (buffer, tracked) in &self.buffers {
            assert!(
                tracked.current == tracked.resting,
                "buffer {buffer:?} left in {:?}, expected {:?}",
                tracked.current,
                tracked.resting
            );
        }
        debug_assert!(self.pending.is_empty(), "unrecorded barriers at frame end");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redundant_transition_skipped() {
        let mut tracker = ResourceStateTracker::new();
        let texture = TextureId::from_raw(1);
        tracker.register_texture(texture, ResourceState::ShaderRead, ResourceState::ShaderRead);
        tracker.texture(texture, ResourceState::ShaderRead);
        assert!(tracker.take_pending().is_empty());
    }

    #[test]
    fn test_enter_and_rest() {
        let mut tracker = ResourceStateTracker::new();
        let depth = TextureId::from_raw(7);
        tracker.register_texture(depth, ResourceState::Undefined, ResourceState::DepthRead);
        tracker.texture(depth, ResourceState::DepthWrite);
        tracker.rest_texture(depth);
        assert_eq!(
            tracker.take_pending(),
            vec![
                Barrier::texture(depth, ResourceState::Undefined, ResourceState::DepthWrite),
                Barrier::texture(depth, ResourceState::DepthWrite, ResourceState::DepthRead),
            ]
        );
        tracker.assert_all_resting();
    }

    #[test]
    #[should_panic(expected = "left in")]
    fn test_unrested_resource_detected() {
        let mut tracker = ResourceStateTracker::new();
        let buffer = BufferId::from_raw(3);
        tracker.register_buffer(buffer, ResourceState::ShaderRead, ResourceState::ShaderRead);
        tracker.buffer(buffer, ResourceState::UnorderedAccess);
        tracker.take_pending();
        tracker.assert_all_resting();
    }
}
