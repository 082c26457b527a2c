//! Terrain sizing and vegetation cache configuration.
//!
//! All sizing values are explicit and passed by reference into the
//! hierarchy and cache code. Nothing in the crate reads ambient globals.

use crate::core::error::Error;
use crate::core::types::Result;

/// Terrain sizing configuration, fixed at construction.
///
/// All relationships must be exact powers of two: the hierarchy depth and
/// the world-to-grid bit shifts are derived from them. Validation failure
/// is fatal to initialization, it indicates a misconfigured level.
#[derive(Clone, Copy, Debug)]
pub struct TerrainConfig {
    /// World units per terrain side.
    pub world_size: u32,
    /// World units per leaf sector side.
    pub sector_size: u32,
    /// Leaf sectors per terrain row.
    pub sectors_per_row: u32,
    /// World units per heightmap cell.
    pub unit_size: u32,
    /// Distance-to-size ratio above which an interior node is rendered
    /// in place of its children.
    pub lod_ratio: f32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            world_size: 1024,
            sector_size: 64,
            sectors_per_row: 16,
            unit_size: 2,
            lod_ratio: 2.0,
        }
    }
}

impl TerrainConfig {
    /// Validate the power-of-two and exact-division relationships.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("world_size", self.world_size),
            ("sector_size", self.sector_size),
            ("sectors_per_row", self.sectors_per_row),
            ("unit_size", self.unit_size),
        ] {
            if !value.is_power_of_two() {
                return Err(Error::Config(format!(
                    "{} must be a power of two, got {}",
                    name, value
                )));
            }
        }
        if self.sector_size * self.sectors_per_row != self.world_size {
            return Err(Error::Config(format!(
                "sector_size {} * sectors_per_row {} must equal world_size {}",
                self.sector_size, self.sectors_per_row, self.world_size
            )));
        }
        if self.unit_size > self.sector_size {
            return Err(Error::Config(format!(
                "unit_size {} must not exceed sector_size {}",
                self.unit_size, self.sector_size
            )));
        }
        if !self.lod_ratio.is_finite() || self.lod_ratio <= 0.0 {
            return Err(Error::Config(format!(
                "lod_ratio must be positive, got {}",
                self.lod_ratio
            )));
        }
        Ok(())
    }

    /// Number of hierarchy levels: `log2(sectors_per_row) + 1`.
    pub fn levels(&self) -> u32 {
        self.sectors_per_row.trailing_zeros() + 1
    }

    /// Bit shift from world units to sector-grid units.
    pub fn sector_shift(&self) -> u32 {
        self.sector_size.trailing_zeros()
    }

    /// Bit shift from world units to heightmap-grid units.
    pub fn unit_shift(&self) -> u32 {
        self.unit_size.trailing_zeros()
    }

    /// Heightmap samples per terrain side (cell corners, inclusive).
    pub fn samples_per_side(&self) -> u32 {
        self.world_size / self.unit_size + 1
    }

    /// Heightmap cells per leaf sector side.
    pub fn units_per_sector(&self) -> u32 {
        self.sector_size / self.unit_size
    }
}

/// Vegetation cache tuning, re-read every frame.
///
/// `density` may change at runtime (a quality setting); the derived sector
/// cap follows it on the next cache update.
#[derive(Clone, Copy, Debug)]
pub struct VegetationConfig {
    /// Global density multiplier, 0.0 disables vegetation entirely.
    pub density: f32,
    /// Cached-sector cap at density 1.0.
    pub max_sectors_base: usize,
    /// Free-chunk safety margin, in chunks per cached sector.
    pub margin_chunks_per_sector: usize,
    /// Sectors populated per frame in steady state.
    pub build_budget_per_frame: usize,
    /// Camera distance within which visible sectors keep vegetation.
    pub range: f32,
}

impl Default for VegetationConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            max_sectors_base: 16,
            margin_chunks_per_sector: 4,
            build_budget_per_frame: 2,
            range: 256.0,
        }
    }
}

impl VegetationConfig {
    /// Active-sector cap derived from the density setting. Never below one
    /// while density is positive.
    pub fn max_active_sectors(&self) -> usize {
        if self.density <= 0.0 {
            return 0;
        }
        ((self.max_sectors_base as f32 * self.density).round() as usize).max(1)
    }

    /// Free-chunk watermark for a pool of the given capacity: proportional
    /// to the sector cap, clamped to a quarter of the pool.
    pub fn free_chunk_watermark(&self, capacity: usize) -> usize {
        (self.margin_chunks_per_sector * self.max_active_sectors())
            .min(capacity / 4)
            .max(1)
    }
}
