//! Fixed-capacity chunk pool shared by all sectors' procedural content.
//!
//! A chunk is a slab of instance slots. The pool never grows; sectors are
//! evicted before it can run dry. All allocation state is mutated on the
//! main thread during the per-frame cache update, so the pool needs no
//! locking.

use crate::hierarchy::NodeId;

/// Instance slots per pool chunk
pub const INSTANCES_PER_CHUNK: usize = 64;

/// Index of an allocated chunk in the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHandle(u32);

impl ChunkHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct ChunkSlot {
    owner: Option<NodeId>,
}

/// The shared chunk pool
pub struct ChunkPool {
    slots: Vec<ChunkSlot>,
    free: Vec<u32>,
}

impl ChunkPool {
    pub fn new(capacity: usize) -> Self {
        log::info!("created procedural chunk pool: {} chunks", capacity);
        Self {
            slots: vec![ChunkSlot::default(); capacity],
            // Popping from the back hands out low indices last.
            free: (0..capacity as u32).rev().collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn used_count(&self) -> usize {
        self.capacity() - self.free_count()
    }

    /// Allocate one chunk for a sector. None when the pool is exhausted;
    /// callers back off and retry after the next eviction pass.
    pub fn allocate(&mut self, owner: NodeId) -> Option<ChunkHandle> {
        let index = self.free.pop()?;
        self.slots[index as usize].owner = Some(owner);
        Some(ChunkHandle(index))
    }

    /// Return a chunk to the free list
    pub fn release(&mut self, handle: ChunkHandle) {
        let slot = &mut self.slots[handle.index()];
        debug_assert!(slot.owner.is_some(), "double release of pool chunk");
        slot.owner = None;
        self.free.push(handle.0);
    }

    /// Owner of an allocated chunk, None for free chunks
    pub fn owner(&self, handle: ChunkHandle) -> Option<NodeId> {
        self.slots[handle.index()].owner
    }
}
