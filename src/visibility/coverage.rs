//! Software coverage buffer for occlusion culling.
//!
//! A coarse screen-space grid of depth values written from occluder boxes
//! and queried with candidate boxes. Both sides are conservative: an
//! occluder only darkens cells its projection fully covers, a candidate is
//! reported occluded only when every cell it may touch is covered by
//! geometry nearer than its nearest point. Anything crossing the near
//! plane is treated as visible.

use crate::core::types::{Mat4, Vec3};
use crate::math::Aabb;

const NEAR_EPSILON: f32 = 1e-4;

/// Projected screen-rect of an AABB plus its view-depth range
struct ProjectedRect {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
    near_depth: f32,
    far_depth: f32,
}

/// Coarse depth grid standing in for a z-buffer on the culling thread
pub struct CoverageBuffer {
    width: usize,
    height: usize,
    /// Farthest depth known to be fully covered per cell; 0 = uncovered.
    depth: Vec<f32>,
    view_proj: Mat4,
    frozen: bool,
}

impl CoverageBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            depth: vec![0.0; width * height],
            view_proj: Mat4::IDENTITY,
            frozen: false,
        }
    }

    /// Arm the buffer for a new run. Clears coverage unless frozen (a
    /// debugging aid that keeps the previous run's occlusion).
    pub fn begin(&mut self, view_proj: Mat4) {
        if self.frozen {
            return;
        }
        self.view_proj = view_proj;
        self.depth.fill(0.0);
    }

    /// Keep the current coverage across subsequent `begin` calls
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Rasterize an occluder box. Cells fully inside its projected rect are
    /// marked covered up to the box's farthest depth.
    pub fn add_occluder(&mut self, bounds: &Aabb) {
        let Some(rect) = self.project(bounds) else {
            return;
        };

        // Inner rect only: partially covered border cells stay open.
        let x0 = rect.min_x.ceil().clamp(0.0, self.width as f32) as usize;
        let y0 = rect.min_y.ceil().clamp(0.0, self.height as f32) as usize;
        let x1 = rect.max_x.floor().clamp(0.0, self.width as f32) as usize;
        let y1 = rect.max_y.floor().clamp(0.0, self.height as f32) as usize;

        for y in y0..y1 {
            for x in x0..x1 {
                let cell = &mut self.depth[y * self.width + x];
                *cell = cell.max(rect.far_depth);
            }
        }
    }

    /// Test whether a candidate box may be visible. True unless every cell
    /// its projection touches is covered nearer than the box itself.
    pub fn test_aabb(&self, bounds: &Aabb) -> bool {
        let Some(rect) = self.project(bounds) else {
            return true;
        };

        // Outer rect: any cell the projection touches counts.
        let x0 = rect.min_x.floor().clamp(0.0, self.width as f32) as usize;
        let y0 = rect.min_y.floor().clamp(0.0, self.height as f32) as usize;
        let x1 = rect.max_x.ceil().clamp(0.0, self.width as f32) as usize;
        let y1 = rect.max_y.ceil().clamp(0.0, self.height as f32) as usize;

        if x0 >= x1 || y0 >= y1 {
            // Off-screen for this buffer; leave the verdict to the frustum.
            return true;
        }

        for y in y0..y1 {
            for x in x0..x1 {
                let covered_to = self.depth[y * self.width + x];
                if covered_to <= 0.0 || rect.near_depth < covered_to {
                    return true;
                }
            }
        }
        false
    }

    /// Project a box into buffer cells. None when any corner reaches the
    /// near plane, which callers must treat as visible.
    fn project(&self, bounds: &Aabb) -> Option<ProjectedRect> {
        let mut rect = ProjectedRect {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
            near_depth: f32::INFINITY,
            far_depth: f32::NEG_INFINITY,
        };

        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 != 0 { bounds.max.x } else { bounds.min.x },
                if i & 2 != 0 { bounds.max.y } else { bounds.min.y },
                if i & 4 != 0 { bounds.max.z } else { bounds.min.z },
            );
            let clip = self.view_proj * corner.extend(1.0);
            if clip.w <= NEAR_EPSILON {
                return None;
            }

            let sx = (clip.x / clip.w * 0.5 + 0.5) * self.width as f32;
            let sy = (clip.y / clip.w * 0.5 + 0.5) * self.height as f32;
            rect.min_x = rect.min_x.min(sx);
            rect.min_y = rect.min_y.min(sy);
            rect.max_x = rect.max_x.max(sx);
            rect.max_y = rect.max_y.max(sy);
            rect.near_depth = rect.near_depth.min(clip.w);
            rect.far_depth = rect.far_depth.max(clip.w);
        }

        Some(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at_origin() -> Mat4 {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 1000.0);
        proj * Mat4::IDENTITY
    }

    fn box_at(z: f32, half: f32) -> Aabb {
        Aabb::new(
            Vec3::new(-half, -half, z - 1.0),
            Vec3::new(half, half, z + 1.0),
        )
    }

    #[test]
    fn test_empty_buffer_everything_visible() {
        let mut buf = CoverageBuffer::new(16, 16);
        buf.begin(camera_at_origin());
        assert!(buf.test_aabb(&box_at(-50.0, 1.0)));
    }

    #[test]
    fn test_occluder_hides_box_behind_it() {
        let mut buf = CoverageBuffer::new(32, 32);
        buf.begin(camera_at_origin());

        // Wide wall close to the camera, small box far behind it.
        buf.add_occluder(&box_at(-10.0, 40.0));
        assert!(!buf.test_aabb(&box_at(-200.0, 1.0)));
    }

    #[test]
    fn test_box_in_front_of_occluder_visible() {
        let mut buf = CoverageBuffer::new(32, 32);
        buf.begin(camera_at_origin());

        buf.add_occluder(&box_at(-100.0, 400.0));
        assert!(buf.test_aabb(&box_at(-5.0, 1.0)));
    }

    #[test]
    fn test_near_plane_crossing_is_visible() {
        let mut buf = CoverageBuffer::new(32, 32);
        buf.begin(camera_at_origin());
        buf.add_occluder(&box_at(-10.0, 40.0));

        // Box surrounding the camera projects through the near plane.
        let around_camera = Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0));
        assert!(buf.test_aabb(&around_camera));
    }

    #[test]
    fn test_begin_clears_unless_frozen() {
        let mut buf = CoverageBuffer::new(32, 32);
        buf.begin(camera_at_origin());
        buf.add_occluder(&box_at(-10.0, 40.0));
        assert!(!buf.test_aabb(&box_at(-200.0, 1.0)));

        buf.begin(camera_at_origin());
        assert!(buf.test_aabb(&box_at(-200.0, 1.0)));

        buf.add_occluder(&box_at(-10.0, 40.0));
        buf.set_frozen(true);
        buf.begin(camera_at_origin());
        assert!(!buf.test_aabb(&box_at(-200.0, 1.0)));
    }
}
