//! Render pass description shared by culling, distance caching and
//! rebuild prioritization.

use crate::core::types::{Mat4, Vec3};
use crate::hierarchy::MAX_PASS_SLOTS;
use crate::math::Frustum;

/// Kind of render pass walking the hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// The main camera view
    General,
    /// Shadow-map rendering, may overlap the general pass in one frame
    Shadow,
    /// Recursive passes (reflections, portals)
    Recursive,
}

/// Everything a culling run needs to know about the pass it serves.
///
/// Concurrent passes of one frame map to distinct distance slots on the
/// sector nodes, so their distance queries never trample each other.
#[derive(Clone, Copy, Debug)]
pub struct PassInfo {
    pub kind: PassKind,
    /// Recursion depth for `PassKind::Recursive`, zero otherwise.
    pub recursion: u8,
    pub frame_id: u64,
    pub camera_pos: Vec3,
    pub view_proj: Mat4,
    pub frustum: Frustum,
    /// Camera zoom factor; occlusion distance tests scale by its inverse.
    pub zoom_factor: f32,
}

impl PassInfo {
    fn new(kind: PassKind, recursion: u8, frame_id: u64, camera_pos: Vec3, view_proj: Mat4) -> Self {
        Self {
            kind,
            recursion,
            frame_id,
            camera_pos,
            view_proj,
            frustum: Frustum::from_view_projection(&view_proj),
            zoom_factor: 1.0,
        }
    }

    pub fn general(frame_id: u64, camera_pos: Vec3, view_proj: Mat4) -> Self {
        Self::new(PassKind::General, 0, frame_id, camera_pos, view_proj)
    }

    pub fn shadow(frame_id: u64, camera_pos: Vec3, view_proj: Mat4) -> Self {
        Self::new(PassKind::Shadow, 0, frame_id, camera_pos, view_proj)
    }

    pub fn recursive(recursion: u8, frame_id: u64, camera_pos: Vec3, view_proj: Mat4) -> Self {
        Self::new(PassKind::Recursive, recursion.max(1), frame_id, camera_pos, view_proj)
    }

    /// Distance-cache slot for this pass. Recursion levels beyond the slot
    /// count share the last slot.
    pub fn slot(&self) -> usize {
        match self.kind {
            PassKind::General => 0,
            PassKind::Shadow => 1,
            PassKind::Recursive => (1 + self.recursion as usize).min(MAX_PASS_SLOTS - 1),
        }
    }

    pub fn inverse_zoom(&self) -> f32 {
        if self.zoom_factor > 0.0 {
            1.0 / self.zoom_factor
        } else {
            1.0
        }
    }

    pub fn with_zoom(mut self, zoom_factor: f32) -> Self {
        self.zoom_factor = zoom_factor;
        self
    }
}

/// Deterministic draw-order token assigned in walk-discovery order.
///
/// Async production may interleave item kinds arbitrarily between runs;
/// the token pins the submission order the renderer should reproduce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortToken(pub u32);
