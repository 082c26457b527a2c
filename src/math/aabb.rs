//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if point is inside AABB
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if `other` lies entirely inside this AABB
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x && self.max.x >= other.max.x &&
        self.min.y <= other.min.y && self.max.y >= other.max.y &&
        self.min.z <= other.min.z && self.max.z >= other.max.z
    }

    /// Check if `other` lies inside this AABB on the ground plane,
    /// ignoring the vertical axis
    pub fn contains_xz(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x && self.max.x >= other.max.x &&
        self.min.z <= other.min.z && self.max.z >= other.max.z
    }

    /// Check if two AABBs intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Squared distance from a point to the nearest point of the AABB.
    /// Zero when the point is inside.
    pub fn distance_sq_to_point(&self, p: Vec3) -> f32 {
        let nearest = p.clamp(self.min, self.max);
        p.distance_squared(nearest)
    }

    /// Distance from a point to the nearest point of the AABB
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        self.distance_sq_to_point(p).sqrt()
    }

    /// Get child quadrant AABB for quadtree subdivision on the ground plane.
    /// index: 0-3 (bit 0 = x half, bit 1 = z half). The vertical range is
    /// inherited from the parent; callers tighten it from height data.
    pub fn child_quadrant(&self, index: u8) -> Aabb {
        let center = self.center();
        let (min, max) = (self.min, self.max);

        let (min_x, max_x) = if index & 1 != 0 {
            (center.x, max.x)
        } else {
            (min.x, center.x)
        };
        let (min_z, max_z) = if index & 2 != 0 {
            (center.z, max.z)
        } else {
            (min.z, center.z)
        };

        Aabb {
            min: Vec3::new(min_x, min.y, min_z),
            max: Vec3::new(max_x, max.y, max_z),
        }
    }
}
