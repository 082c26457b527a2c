//! Sector nodes, stored in one flat array per hierarchy level.
//!
//! Nodes are built once and never individually added or removed; only
//! their content changes at runtime. The fields touched during concurrent
//! culling (per-pass distances, the geometry handle, the dirty flag) are
//! atomic cells so the cull worker can read them while the main thread
//! applies completed rebuilds.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::core::types::IVec2;
use crate::math::Aabb;

/// Distance cache slots per node: general pass, shadow pass and two
/// recursion levels may query the same node within one frame.
pub const MAX_PASS_SLOTS: usize = 4;

/// Identifies a node by hierarchy level and index into that level's array.
/// Level 0 holds the leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub level: u8,
    pub index: u32,
}

/// Opaque handle to renderer-owned sector geometry.
///
/// The renderer creates and destroys the actual mesh; the hierarchy only
/// references it. Zero is reserved for "no geometry".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryHandle(NonZeroU64);

impl GeometryHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

/// A node of the terrain hierarchy covering a square group of sectors.
pub struct SectorNode {
    /// Origin in leaf-sector grid units.
    grid: IVec2,
    /// Side length in leaf sectors (1 << level).
    size_sectors: u32,
    level: u8,
    /// World bounds; the vertical range is tightened from height data and
    /// always contains the union of the children's bounds.
    bounds: Aabb,
    parent: Option<NodeId>,
    children: Option<[NodeId; 4]>,
    /// Camera distance per concurrent pass slot, as f32 bits.
    distances: [AtomicU32; MAX_PASS_SLOTS],
    /// Raw geometry handle, 0 while none is attached.
    geometry: AtomicU64,
    /// Set when authoritative data changed and the geometry needs a rebuild.
    dirty: AtomicBool,
}

impl SectorNode {
    pub(crate) fn new(
        grid: IVec2,
        size_sectors: u32,
        level: u8,
        bounds: Aabb,
        parent: Option<NodeId>,
        children: Option<[NodeId; 4]>,
    ) -> Self {
        Self {
            grid,
            size_sectors,
            level,
            bounds,
            parent,
            children,
            distances: std::array::from_fn(|_| AtomicU32::new(f32::INFINITY.to_bits())),
            geometry: AtomicU64::new(0),
            dirty: AtomicBool::new(true),
        }
    }

    /// Origin in leaf-sector grid units
    pub fn grid_origin(&self) -> IVec2 {
        self.grid
    }

    /// Side length in leaf sectors
    pub fn size_sectors(&self) -> u32 {
        self.size_sectors
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> Option<&[NodeId; 4]> {
        self.children.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Cached camera distance for a pass slot, infinity if never visited
    pub fn distance(&self, slot: usize) -> f32 {
        f32::from_bits(self.distances[slot].load(Ordering::Relaxed))
    }

    pub fn set_distance(&self, slot: usize, distance: f32) {
        self.distances[slot].store(distance.to_bits(), Ordering::Relaxed);
    }

    pub fn geometry(&self) -> Option<GeometryHandle> {
        GeometryHandle::new(self.geometry.load(Ordering::Acquire))
    }

    /// Attach a rebuilt geometry handle, returning the previous one so the
    /// caller can release it with the renderer.
    pub fn swap_geometry(&self, handle: GeometryHandle) -> Option<GeometryHandle> {
        GeometryHandle::new(self.geometry.swap(handle.raw(), Ordering::AcqRel))
    }

    /// Detach the geometry handle without a replacement
    pub fn take_geometry(&self) -> Option<GeometryHandle> {
        GeometryHandle::new(self.geometry.swap(0, Ordering::AcqRel))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    fn leaf() -> SectorNode {
        SectorNode::new(
            IVec2::new(0, 0),
            1,
            0,
            Aabb::new(Vec3::ZERO, Vec3::splat(64.0)),
            None,
            None,
        )
    }

    #[test]
    fn test_new_node_is_dirty_without_geometry() {
        let node = leaf();
        assert!(node.is_dirty());
        assert!(node.geometry().is_none());
        assert!(node.is_leaf());
    }

    #[test]
    fn test_distance_slots_independent() {
        let node = leaf();
        assert_eq!(node.distance(0), f32::INFINITY);

        node.set_distance(0, 10.0);
        node.set_distance(1, 99.0);
        assert_eq!(node.distance(0), 10.0);
        assert_eq!(node.distance(1), 99.0);
        assert_eq!(node.distance(2), f32::INFINITY);
    }

    #[test]
    fn test_geometry_swap_returns_previous() {
        let node = leaf();
        let first = GeometryHandle::new(7).unwrap();
        let second = GeometryHandle::new(8).unwrap();

        assert!(node.swap_geometry(first).is_none());
        assert_eq!(node.swap_geometry(second), Some(first));
        assert_eq!(node.geometry(), Some(second));
        assert_eq!(node.take_geometry(), Some(second));
        assert!(node.geometry().is_none());
    }

    #[test]
    fn test_zero_is_not_a_handle() {
        assert!(GeometryHandle::new(0).is_none());
        assert_eq!(GeometryHandle::new(1).unwrap().raw(), 1);
    }
}
