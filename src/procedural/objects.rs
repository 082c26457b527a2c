//! Noise-driven placement of per-sector procedural instances.
//!
//! Placement is pure: the same seed, sector and density always produce the
//! same instances, so a sector evicted and later rebuilt comes back
//! identical. Instances live in slots backed by pool chunks.

use noise::{NoiseFn, Perlin};

use crate::core::types::Vec3;
use crate::hierarchy::{NodeId, SectorTree, SurfaceType};

use super::pool::{ChunkHandle, ChunkPool, INSTANCES_PER_CHUNK};

/// World units between placement candidates
const PLACEMENT_SPACING: f32 = 8.0;

/// Noise frequency for the density field
const DENSITY_FREQUENCY: f64 = 0.015;

/// Density-field threshold above which a candidate is placed
const PLACEMENT_THRESHOLD: f32 = 0.5;

/// One procedurally placed instance
#[derive(Clone, Copy, Debug)]
pub struct ProceduralInstance {
    pub position: Vec3,
    pub scale: f32,
    /// Rotation around the vertical axis, radians.
    pub rotation: f32,
    pub archetype: u8,
}

/// A sector's resident procedural content plus the pool chunks backing it
#[derive(Debug)]
pub struct ProceduralObjectSet {
    sector: NodeId,
    chunks: Vec<ChunkHandle>,
    instances: Vec<ProceduralInstance>,
}

impl ProceduralObjectSet {
    pub fn sector(&self) -> NodeId {
        self.sector
    }

    pub fn instances(&self) -> &[ProceduralInstance] {
        &self.instances
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Return all backing chunks to the pool
    pub(crate) fn release_into(self, pool: &mut ChunkPool) {
        for chunk in self.chunks {
            pool.release(chunk);
        }
    }
}

/// Generates sector content from layered noise fields
pub struct PlacementGenerator {
    density_field: Perlin,
    jitter_field: Perlin,
}

impl PlacementGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            density_field: Perlin::new(seed),
            jitter_field: Perlin::new(seed.wrapping_mul(0x9e37_79b9).wrapping_add(1)),
        }
    }

    /// Build a sector's instances and allocate backing chunks.
    ///
    /// None when the pool cannot back the content; nothing is leaked and
    /// the caller retries after the next eviction pass.
    pub fn populate(
        &self,
        tree: &SectorTree,
        sector: NodeId,
        density: f32,
        pool: &mut ChunkPool,
    ) -> Option<ProceduralObjectSet> {
        let node = tree.node(sector);
        let bounds = node.bounds();
        let unit = tree.config().unit_size as f32;

        let mut instances = Vec::new();
        let mut z = bounds.min.z;
        while z < bounds.max.z {
            let mut x = bounds.min.x;
            while x < bounds.max.x {
                if let Some(instance) = self.place_at(tree, x, z, unit, density) {
                    instances.push(instance);
                }
                x += PLACEMENT_SPACING;
            }
            z += PLACEMENT_SPACING;
        }

        let chunks_needed = instances.len().div_ceil(INSTANCES_PER_CHUNK);
        let mut chunks = Vec::with_capacity(chunks_needed);
        for _ in 0..chunks_needed {
            match pool.allocate(sector) {
                Some(chunk) => chunks.push(chunk),
                None => {
                    for chunk in chunks {
                        pool.release(chunk);
                    }
                    log::warn!(
                        "chunk pool exhausted while populating sector {:?} ({} chunks needed)",
                        sector,
                        chunks_needed
                    );
                    return None;
                }
            }
        }

        log::debug!(
            "populated sector {:?}: {} instances in {} chunks",
            sector,
            instances.len(),
            chunks.len()
        );
        Some(ProceduralObjectSet {
            sector,
            chunks,
            instances,
        })
    }

    fn place_at(
        &self,
        tree: &SectorTree,
        x: f32,
        z: f32,
        unit: f32,
        density: f32,
    ) -> Option<ProceduralInstance> {
        let field = self
            .density_field
            .get([x as f64 * DENSITY_FREQUENCY, z as f64 * DENSITY_FREQUENCY]) as f32;
        let field = (field * 0.5 + 0.5) * density;
        if field <= PLACEMENT_THRESHOLD {
            return None;
        }

        // Rock and water carry no vegetation.
        let (gx, gy) = ((x / unit) as u32, (z / unit) as u32);
        match tree.surface_type_at(gx, gy) {
            SurfaceType::Rock | SurfaceType::Water => return None,
            SurfaceType::Soil | SurfaceType::Grass => {}
        }

        let jitter = self
            .jitter_field
            .get([x as f64 * DENSITY_FREQUENCY * 4.0, z as f64 * DENSITY_FREQUENCY * 4.0])
            as f32;
        let offset = jitter * PLACEMENT_SPACING * 0.5;
        let (px, pz) = (x + offset, z + offset);

        Some(ProceduralInstance {
            position: Vec3::new(px, tree.height_at(px, pz), pz),
            scale: 0.75 + field * 0.5,
            rotation: (jitter * 0.5 + 0.5) * std::f32::consts::TAU,
            archetype: ((field * 16.0) as u8) % 4,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TerrainConfig;
    use crate::hierarchy::HeightSample;

    fn tree_of(surface: SurfaceType) -> SectorTree {
        SectorTree::build(&TerrainConfig::default(), |_, _| HeightSample {
            height: 5.0,
            surface,
        })
        .unwrap()
    }

    const SECTOR: NodeId = NodeId { level: 0, index: 0 };

    #[test]
    fn test_populate_places_instances_on_grass() {
        let tree = tree_of(SurfaceType::Grass);
        let generator = PlacementGenerator::new(7);
        let mut pool = ChunkPool::new(64);

        let set = generator.populate(&tree, SECTOR, 2.0, &mut pool).unwrap();
        assert!(!set.instances().is_empty());
        assert_eq!(
            set.chunk_count(),
            set.instances().len().div_ceil(INSTANCES_PER_CHUNK)
        );

        let bounds = tree.node(SECTOR).bounds();
        for instance in set.instances() {
            assert!((instance.position.y - 5.0).abs() < 1e-3);
            // Jitter stays within a spacing of the sector.
            assert!(instance.position.x >= bounds.min.x - PLACEMENT_SPACING);
            assert!(instance.position.x <= bounds.max.x + PLACEMENT_SPACING);
        }
    }

    #[test]
    fn test_water_suppresses_placement() {
        let tree = tree_of(SurfaceType::Water);
        let generator = PlacementGenerator::new(7);
        let mut pool = ChunkPool::new(64);

        let set = generator.populate(&tree, SECTOR, 1.5, &mut pool).unwrap();
        assert!(set.instances().is_empty());
        assert_eq!(set.chunk_count(), 0);
        assert_eq!(pool.free_count(), 64);
    }

    #[test]
    fn test_zero_density_places_nothing() {
        let tree = tree_of(SurfaceType::Grass);
        let generator = PlacementGenerator::new(7);
        let mut pool = ChunkPool::new(64);

        let set = generator.populate(&tree, SECTOR, 0.0, &mut pool).unwrap();
        assert!(set.instances().is_empty());
    }

    #[test]
    fn test_placement_is_deterministic() {
        let tree = tree_of(SurfaceType::Grass);
        let generator = PlacementGenerator::new(42);
        let mut pool = ChunkPool::new(64);

        let first = generator.populate(&tree, SECTOR, 1.5, &mut pool).unwrap();
        let first_positions: Vec<Vec3> =
            first.instances().iter().map(|i| i.position).collect();
        first.release_into(&mut pool);

        let again = generator.populate(&tree, SECTOR, 1.5, &mut pool).unwrap();
        let again_positions: Vec<Vec3> =
            again.instances().iter().map(|i| i.position).collect();
        assert_eq!(first_positions, again_positions);
    }

    #[test]
    fn test_pool_exhaustion_leaks_nothing() {
        let tree = tree_of(SurfaceType::Grass);
        let generator = PlacementGenerator::new(7);
        // No capacity at all: any non-empty sector must fail cleanly.
        let mut pool = ChunkPool::new(0);
        let before = pool.free_count();

        let result = generator.populate(&tree, SECTOR, 2.0, &mut pool);
        if result.is_none() {
            assert_eq!(pool.free_count(), before);
        }
    }

    #[test]
    fn test_release_returns_chunks() {
        let tree = tree_of(SurfaceType::Grass);
        let generator = PlacementGenerator::new(7);
        let mut pool = ChunkPool::new(64);

        let set = generator.populate(&tree, SECTOR, 1.5, &mut pool).unwrap();
        let used = set.chunk_count();
        assert_eq!(pool.used_count(), used);
        set.release_into(&mut pool);
        assert_eq!(pool.used_count(), 0);
    }
}
