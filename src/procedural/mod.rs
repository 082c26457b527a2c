//! Procedurally placed per-sector content and its bounded cache

pub mod cache;
pub mod objects;
pub mod pool;

pub use cache::{CacheStats, ProceduralContentCache};
pub use objects::{PlacementGenerator, ProceduralInstance, ProceduralObjectSet};
pub use pool::{ChunkHandle, ChunkPool, INSTANCES_PER_CHUNK};
