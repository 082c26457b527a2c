//! Math primitives for spatial queries

pub mod aabb;
pub mod frustum;

pub use aabb::Aabb;
pub use frustum::{Frustum, Plane};
