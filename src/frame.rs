//! Per-frame replication and frame-scoped allocation.
//!
//! With [`BACK_BUFFER_COUNT`] frames in flight, every resource the CPU writes
//! while the GPU may still be reading an older copy is replicated once per
//! frame slot:
//!
//! ```text
//! render frame:   0   1   2   3   4   5
//! frame slot:     0   1   0   1   0   1
//!                 └───────┘ slot 0 reused only after frame 0 retired
//! ```
//!
//! [`PerFrame`] holds the replicas. [`FrameBumpAllocator`] is a linear arena
//! that packs per-draw data for one slot and uploads it with a single write.

use std::ops::{Index, IndexMut};

use bytemuck::Pod;

use crate::config::BACK_BUFFER_COUNT;
use crate::gfx::{BufferId, GfxBackend};

/// Frame slot used by `render_frame`.
#[inline]
pub fn frame_slot(render_frame: u64) -> usize {
    (render_frame % BACK_BUFFER_COUNT as u64) as usize
}

/// Exactly [`BACK_BUFFER_COUNT`] replicas of `T`, indexed by frame slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PerFrame<T> {
    slots: [T; BACK_BUFFER_COUNT],
}

impl<T> PerFrame<T> {
    /// Build every slot with `f(slot)`.
    pub fn new(mut f: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: std::array::from_fn(&mut f),
        }
    }

    /// Build every slot with a fallible constructor.
    ///
    /// On error the slots already built are passed to `cleanup` in creation
    /// order before the error is returned.
    pub fn try_new<E>(
        mut f: impl FnMut(usize) -> Result<T, E>,
        mut cleanup: impl FnMut(T),
    ) -> Result<Self, E> {
        let mut built = Vec::with_capacity(BACK_BUFFER_COUNT);
        for slot in 0..BACK_BUFFER_COUNT {
            match f(slot) {
                Ok(value) => built.push(value),
                Err(err) => {
                    built.into_iter().for_each(&mut cleanup);
                    return Err(err);
                }
            }
        }
        let mut built = built.into_iter();
        Ok(Self {
            slots: std::array::from_fn(|_| match built.next() {
                Some(value) => value,
                None => unreachable!("every slot was built"),
            }),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }

    /// Map every slot into a new `PerFrame`.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerFrame<U> {
        PerFrame {
            slots: std::array::from_fn(|slot| f(&self.slots[slot])),
        }
    }
}

impl<T: Default> Default for PerFrame<T> {
    fn default() -> Self {
        Self::new(|_| T::default())
    }
}

impl<T> Index<usize> for PerFrame<T> {
    type Output = T;

    fn index(&self, slot: usize) -> &T {
        &self.slots[slot]
    }
}

impl<T> IndexMut<usize> for PerFrame<T> {
    fn index_mut(&mut self, slot: usize) -> &mut T {
        &mut self.slots[slot]
    }
}

impl<T> IntoIterator for PerFrame<T> {
    type Item = T;
    type IntoIter = std::array::IntoIter<T, BACK_BUFFER_COUNT>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

/// A region handed out by [`FrameBumpAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameAllocation {
    /// Byte offset from the start of the arena.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

impl FrameAllocation {
    /// Element index of this allocation when the arena holds `T` records.
    pub fn element_index<T>(&self) -> u32 {
        (self.offset / std::mem::size_of::<T>() as u64) as u32
    }
}

/// Linear allocator over a fixed byte capacity.
///
/// Allocations are packed into a CPU-side arena. [`flush`](Self::flush)
/// copies the used range into a GPU buffer in one `write_buffer` call and
/// [`reset`](Self::reset) rewinds the arena at the start of the slot's next
/// frame. Running out of space is a capacity error and panics.
#[derive(Debug)]
pub struct FrameBumpAllocator {
    label: &'static str,
    data: Vec<u8>,
    capacity: u64,
    offset: u64,
    high_water: u64,
}

impl FrameBumpAllocator {
    pub fn new(label: &'static str, capacity: u64) -> Self {
        Self {
            label,
            data: Vec::new(),
            capacity,
            offset: 0,
            high_water: 0,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes allocated since the last reset.
    pub fn used(&self) -> u64 {
        self.offset
    }

    /// Largest `used()` ever observed.
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    /// Reserve `size` bytes aligned to `alignment` (a power of two).
    ///
    /// # Panics
    ///
    /// Panics when the arena is exhausted.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> FrameAllocation {
        debug_assert!(alignment.is_power_of_two());
        let offset = align_up(self.offset, alignment);
        let end = offset + size;
        assert!(
            end <= self.capacity,
            "frame arena `{}` exhausted: {} of {} bytes used, {} requested",
            self.label,
            self.offset,
            self.capacity,
            size
        );
        if self.data.len() < end as usize {
            self.data.resize(end as usize, 0);
        }
        self.offset = end;
        self.high_water = self.high_water.max(end);
        FrameAllocation { offset, size }
    }

    /// Allocate room for `values` and copy them in.
    ///
    /// The allocation starts on a multiple of `size_of::<T>()`, so
    /// [`FrameAllocation::element_index`] is exact for any stride.
    pub fn push_slice<T: Pod>(&mut self, values: &[T]) -> FrameAllocation {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let stride = std::mem::size_of::<T>().max(1) as u64;
        self.offset = self.offset.div_ceil(stride) * stride;
        let allocation = self.allocate(bytes.len() as u64, 1);
        let start = allocation.offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        allocation
    }

    /// Allocate and copy a single value.
    pub fn push<T: Pod>(&mut self, value: &T) -> FrameAllocation {
        self.push_slice(std::slice::from_ref(value))
    }

    /// Upload everything allocated since the last reset into `buffer`.
    pub fn flush(&self, backend: &dyn GfxBackend, buffer: BufferId) {
        if self.offset > 0 {
            backend.write_buffer(buffer, 0, &self.data[..self.offset as usize]);
        }
    }

    /// Rewind to the start of the arena.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
