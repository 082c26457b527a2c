//! View frustum for culling

use crate::core::types::{Mat4, Vec3, Vec4};
use super::aabb::Aabb;

/// A plane in Hessian normal form (normal, distance from origin)
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// 6-plane frustum extracted from a view-projection matrix
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6], // left, right, bottom, top, near, far
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix.
    /// Uses the Gribb/Hartmann method.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        // Extract rows from the VP matrix (column-major storage)
        let rows = [
            Vec4::new(vp.col(0).x, vp.col(1).x, vp.col(2).x, vp.col(3).x),
            Vec4::new(vp.col(0).y, vp.col(1).y, vp.col(2).y, vp.col(3).y),
            Vec4::new(vp.col(0).z, vp.col(1).z, vp.col(2).z, vp.col(3).z),
            Vec4::new(vp.col(0).w, vp.col(1).w, vp.col(2).w, vp.col(3).w),
        ];

        let raw = [
            rows[3] + rows[0], // left
            rows[3] - rows[0], // right
            rows[3] + rows[1], // bottom
            rows[3] - rows[1], // top
            rows[3] + rows[2], // near
            rows[3] - rows[2], // far
        ];

        let mut planes = [Plane { normal: Vec3::ZERO, d: 0.0 }; 6];
        for (i, r) in raw.iter().enumerate() {
            let len = Vec3::new(r.x, r.y, r.z).length();
            if len > 0.0 {
                planes[i] = Plane {
                    normal: Vec3::new(r.x, r.y, r.z) / len,
                    d: r.w / len,
                };
            }
        }

        Self { planes }
    }

    /// Check if point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if AABB intersects the frustum (conservative test).
    /// Returns true if the AABB is at least partially inside.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Find the corner most aligned with the plane normal (p-vertex)
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            // If the p-vertex is behind the plane, the AABB is fully outside
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}
