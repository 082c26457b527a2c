//! The bounded cache of sectors holding procedural content.
//!
//! Once per frame: refresh every active sector's camera distance, sort
//! nearest-first, evict from the far end while over the configured sector
//! cap, keep evicting while the pool's free-chunk count sits below the
//! safety watermark, then populate not-yet-built sectors front to back
//! within the frame budget. The watermark is re-enforced after building,
//! so the invariants hold whenever `update` returns: active count within
//! the cap, free chunks at or above the watermark.

use crate::core::config::VegetationConfig;
use crate::core::types::Vec3;
use crate::hierarchy::{NodeId, SectorTree};

use super::objects::{PlacementGenerator, ProceduralObjectSet};
use super::pool::ChunkPool;

struct ActiveSector {
    sector: NodeId,
    distance: f32,
    /// None until the build phase reaches this sector.
    content: Option<ProceduralObjectSet>,
}

/// Cache counters, reset each update
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub evicted_over_cap: usize,
    pub evicted_for_watermark: usize,
    pub built: usize,
}

/// Bounded pool-backed cache of per-sector procedural content
pub struct ProceduralContentCache {
    pool: ChunkPool,
    generator: PlacementGenerator,
    active: Vec<ActiveSector>,
    stats: CacheStats,
}

impl ProceduralContentCache {
    pub fn new(pool_capacity: usize, seed: u32) -> Self {
        Self {
            pool: ChunkPool::new(pool_capacity),
            generator: PlacementGenerator::new(seed),
            active: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    /// Note a sector as holding (or about to hold) procedural content.
    /// Idempotent; an already-active sector only has its distance updated.
    pub fn note_visible_sector(&mut self, sector: NodeId, distance: f32) {
        match self.active.iter_mut().find(|a| a.sector == sector) {
            Some(active) => active.distance = distance,
            None => self.active.push(ActiveSector {
                sector,
                distance,
                content: None,
            }),
        }
    }

    /// The per-frame cache update. With `force_complete` set (level load),
    /// the frame build budget is ignored and every surviving sector is
    /// populated before returning.
    pub fn update(
        &mut self,
        tree: &SectorTree,
        cfg: &VegetationConfig,
        camera_pos: Vec3,
        force_complete: bool,
    ) {
        self.stats = CacheStats::default();

        for active in &mut self.active {
            active.distance = tree
                .node(active.sector)
                .bounds()
                .distance_to_point(camera_pos);
        }
        // Stable: equal distances keep their activation order.
        self.active
            .sort_by(|a, b| a.distance.total_cmp(&b.distance));

        self.enforce_bounds(cfg);

        let mut built = 0;
        for index in 0..self.active.len() {
            if self.active[index].content.is_some() {
                continue;
            }
            if !force_complete && built >= cfg.build_budget_per_frame {
                break;
            }
            let sector = self.active[index].sector;
            match self
                .generator
                .populate(tree, sector, cfg.density, &mut self.pool)
            {
                Some(content) => {
                    self.active[index].content = Some(content);
                    built += 1;
                }
                // Pool dry despite the watermark: a burst larger than the
                // margin. Stop building; eviction below restores the margin.
                None => break,
            }
        }
        self.stats.built = built;

        // Builds may have eaten into the margin.
        self.enforce_bounds(cfg);

        debug_assert!(self.active.len() <= cfg.max_active_sectors());
        debug_assert!(
            self.pool.free_count() >= cfg.free_chunk_watermark(self.pool.capacity())
                || self.active.is_empty()
        );

        if self.stats.evicted_over_cap + self.stats.evicted_for_watermark > 0 {
            log::debug!(
                "vegetation cache: {} active, evicted {} over cap, {} for watermark, built {}",
                self.active.len(),
                self.stats.evicted_over_cap,
                self.stats.evicted_for_watermark,
                self.stats.built
            );
        }
    }

    /// Evict farthest-first until both the sector cap and the free-chunk
    /// watermark hold. Assumes `active` is sorted nearest-first.
    fn enforce_bounds(&mut self, cfg: &VegetationConfig) {
        let max_active = cfg.max_active_sectors();
        while self.active.len() > max_active {
            self.evict_farthest();
            self.stats.evicted_over_cap += 1;
        }

        let watermark = cfg.free_chunk_watermark(self.pool.capacity());
        while self.pool.free_count() < watermark && !self.active.is_empty() {
            self.evict_farthest();
            self.stats.evicted_for_watermark += 1;
        }
    }

    fn evict_farthest(&mut self) {
        if let Some(evicted) = self.active.pop() {
            log::debug!(
                "evicting procedural content of sector {:?} at distance {:.1}",
                evicted.sector,
                evicted.distance
            );
            if let Some(content) = evicted.content {
                content.release_into(&mut self.pool);
            }
        }
    }

    /// Drop all content, e.g. at level teardown
    pub fn evict_all(&mut self) {
        while !self.active.is_empty() {
            self.evict_farthest();
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, sector: NodeId) -> bool {
        self.active.iter().any(|a| a.sector == sector)
    }

    /// Resident content for a sector, if already built
    pub fn content(&self, sector: NodeId) -> Option<&ProceduralObjectSet> {
        self.active
            .iter()
            .find(|a| a.sector == sector)
            .and_then(|a| a.content.as_ref())
    }

    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
