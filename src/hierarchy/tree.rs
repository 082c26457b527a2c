//! The sector quadtree.
//!
//! The full pyramid of nodes is allocated when terrain dimensions become
//! known: one flat array per level, `(sectors_per_row >> level)^2` nodes
//! each, leaves in level 0. Nodes reference children and parents by index,
//! so teardown is dropping the arrays. Structural state never changes after
//! `build`; concurrent culling only reads.

use crate::core::config::TerrainConfig;
use crate::core::types::{IVec2, Result, Vec3};
use crate::math::{Aabb, Frustum};

use super::node::{NodeId, SectorNode};

/// Terrain surface classification per heightmap sample
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurfaceType {
    #[default]
    Soil,
    Grass,
    Rock,
    Water,
}

/// One heightmap sample
#[derive(Clone, Copy, Debug, Default)]
pub struct HeightSample {
    pub height: f32,
    pub surface: SurfaceType,
}

/// Receives the one-shot heightfield registration used to set up the
/// collision object in the physics engine.
pub trait HeightfieldSink {
    fn register(
        &mut self,
        samples_per_side: u32,
        cell_size: f32,
        sample: &mut dyn FnMut(u32, u32) -> HeightSample,
    );
}

/// Quadtree of terrain sectors plus the height data it was built from.
pub struct SectorTree {
    config: TerrainConfig,
    /// levels[0] holds the leaves, the last level the single root.
    levels: Vec<Vec<SectorNode>>,
    heights: Vec<f32>,
    surfaces: Vec<SurfaceType>,
}

impl SectorTree {
    /// Build the full node pyramid from terrain dimensions and a heightmap
    /// sampler called once per grid sample.
    ///
    /// Fails with `Error::Config` when the size relationships are not exact
    /// powers of two; that is a level-configuration defect, not a runtime
    /// condition to recover from.
    pub fn build<F>(config: &TerrainConfig, mut sampler: F) -> Result<Self>
    where
        F: FnMut(u32, u32) -> HeightSample,
    {
        config.validate()?;

        let samples_per_side = config.samples_per_side();
        let sample_count = (samples_per_side * samples_per_side) as usize;
        let mut heights = Vec::with_capacity(sample_count);
        let mut surfaces = Vec::with_capacity(sample_count);
        for gy in 0..samples_per_side {
            for gx in 0..samples_per_side {
                let s = sampler(gx, gy);
                heights.push(s.height);
                surfaces.push(s.surface);
            }
        }

        let mut tree = Self {
            config: *config,
            levels: Vec::with_capacity(config.levels() as usize),
            heights,
            surfaces,
        };
        tree.build_levels();

        log::info!(
            "built sector tree: {} levels, {} leaf sectors, {} samples",
            tree.levels.len(),
            tree.levels.first().map_or(0, Vec::len),
            sample_count,
        );
        Ok(tree)
    }

    fn build_levels(&mut self) {
        let level_count = self.config.levels() as usize;
        let sector_size = self.config.sector_size as f32;

        for level in 0..level_count {
            let per_row = self.config.sectors_per_row >> level;
            let size_sectors = 1u32 << level;
            let mut nodes = Vec::with_capacity((per_row * per_row) as usize);

            for y in 0..per_row {
                for x in 0..per_row {
                    let grid = IVec2::new((x << level) as i32, (y << level) as i32);

                    let children = if level == 0 {
                        None
                    } else {
                        let child_per_row = self.config.sectors_per_row >> (level - 1);
                        Some(std::array::from_fn(|i| {
                            let (dx, dy) = ((i as u32) & 1, (i as u32) >> 1);
                            NodeId {
                                level: (level - 1) as u8,
                                index: (y * 2 + dy) * child_per_row + (x * 2 + dx),
                            }
                        }))
                    };

                    let (min_h, max_h) = match &children {
                        None => self.leaf_height_range(grid),
                        Some(ids) => ids.iter().fold(
                            (f32::INFINITY, f32::NEG_INFINITY),
                            |(lo, hi), id| {
                                let b = self.levels[id.level as usize][id.index as usize].bounds();
                                (lo.min(b.min.y), hi.max(b.max.y))
                            },
                        ),
                    };

                    let world_origin = grid.as_vec2() * sector_size;
                    let world_size = (size_sectors as f32) * sector_size;
                    let bounds = Aabb::new(
                        Vec3::new(world_origin.x, min_h, world_origin.y),
                        Vec3::new(world_origin.x + world_size, max_h, world_origin.y + world_size),
                    );

                    let parent = if level + 1 < level_count {
                        let parent_per_row = self.config.sectors_per_row >> (level + 1);
                        Some(NodeId {
                            level: (level + 1) as u8,
                            index: (y / 2) * parent_per_row + x / 2,
                        })
                    } else {
                        None
                    };

                    nodes.push(SectorNode::new(
                        grid,
                        size_sectors,
                        level as u8,
                        bounds,
                        parent,
                        children,
                    ));
                }
            }
            self.levels.push(nodes);
        }
    }

    /// Min and max height over one leaf sector's sample region, fence
    /// samples on both edges included.
    fn leaf_height_range(&self, grid: IVec2) -> (f32, f32) {
        let ups = self.config.units_per_sector();
        let samples_per_side = self.config.samples_per_side();
        let (gx0, gy0) = (grid.x as u32 * ups, grid.y as u32 * ups);

        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for gy in gy0..=(gy0 + ups).min(samples_per_side - 1) {
            for gx in gx0..=(gx0 + ups).min(samples_per_side - 1) {
                let h = self.heights[(gy * samples_per_side + gx) as usize];
                lo = lo.min(h);
                hi = hi.max(h);
            }
        }
        (lo, hi)
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level_len(&self, level: usize) -> usize {
        self.levels[level].len()
    }

    pub fn node(&self, id: NodeId) -> &SectorNode {
        &self.levels[id.level as usize][id.index as usize]
    }

    pub fn root(&self) -> Option<NodeId> {
        let top = self.levels.len().checked_sub(1)?;
        Some(NodeId {
            level: top as u8,
            index: 0,
        })
    }

    /// Leaf node covering the given leaf-sector grid coordinate
    pub fn leaf_at(&self, sector: IVec2) -> Option<NodeId> {
        let per_row = self.config.sectors_per_row as i32;
        if sector.x < 0 || sector.y < 0 || sector.x >= per_row || sector.y >= per_row {
            return None;
        }
        Some(NodeId {
            level: 0,
            index: (sector.y * per_row + sector.x) as u32,
        })
    }

    /// Smallest node whose footprint fully contains `bounds` on the ground
    /// plane. Node heights track the terrain surface, so containment is a
    /// sector-grid question, not a vertical one. Read-only, O(depth). None
    /// when the query escapes the terrain.
    pub fn find_containing(&self, bounds: &Aabb) -> Option<NodeId> {
        let mut current = self.root()?;
        if !self.node(current).bounds().contains_xz(bounds) {
            return None;
        }
        'descend: loop {
            let Some(children) = self.node(current).children() else {
                return Some(current);
            };
            for &child in children {
                if self.node(child).bounds().contains_xz(bounds) {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    /// All leaf sectors intersecting `bounds`, in unspecified order
    pub fn intersect_box(&self, bounds: &Aabb) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(root) = self.root() {
            self.intersect_box_from(root, bounds, &mut out);
        }
        out
    }

    fn intersect_box_from(&self, id: NodeId, bounds: &Aabb, out: &mut Vec<NodeId>) {
        let node = self.node(id);
        if !node.bounds().intersects(bounds) {
            return;
        }
        match node.children() {
            None => out.push(id),
            Some(children) => {
                for &child in children {
                    self.intersect_box_from(child, bounds, out);
                }
            }
        }
    }

    /// Sectors intersecting the frustum at the level of detail selected for
    /// the given camera position, in unspecified order. Caches the camera
    /// distance of every visited node in the pass slot.
    ///
    /// An interior node is returned whole once its distance exceeds
    /// `lod_ratio` times its world side length; leaves are always returned
    /// when reached.
    pub fn intersect_frustum(
        &self,
        frustum: &Frustum,
        camera_pos: Vec3,
        pass_slot: usize,
    ) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(root) = self.root() {
            self.intersect_frustum_from(root, frustum, camera_pos, pass_slot, &mut out);
        }
        out
    }

    fn intersect_frustum_from(
        &self,
        id: NodeId,
        frustum: &Frustum,
        camera_pos: Vec3,
        pass_slot: usize,
        out: &mut Vec<NodeId>,
    ) {
        let node = self.node(id);
        if !frustum.intersects_aabb(node.bounds()) {
            return;
        }

        let distance = node.bounds().distance_to_point(camera_pos);
        node.set_distance(pass_slot, distance);

        let world_size = (node.size_sectors() * self.config.sector_size) as f32;
        match node.children() {
            None => out.push(id),
            Some(_) if distance > self.config.lod_ratio * world_size => out.push(id),
            Some(children) => {
                for &child in children {
                    self.intersect_frustum_from(child, frustum, camera_pos, pass_slot, out);
                }
            }
        }
    }

    /// Visit every node exactly once: level-major (leaves first), then
    /// row-major, then column-major. A no-op on a tree with no levels.
    pub fn traverse_all(&self, mut visitor: impl FnMut(NodeId, &SectorNode)) {
        for (level, nodes) in self.levels.iter().enumerate() {
            for (index, node) in nodes.iter().enumerate() {
                visitor(
                    NodeId {
                        level: level as u8,
                        index: index as u32,
                    },
                    node,
                );
            }
        }
    }

    /// Flag every node's geometry for rebuild. Used after bulk edits to the
    /// authoritative height data.
    pub fn mark_all_dirty(&self) {
        self.traverse_all(|_, node| node.mark_dirty());
    }

    /// Heightmap sample at a grid coordinate, clamped to the terrain edge
    pub fn sample(&self, gx: u32, gy: u32) -> HeightSample {
        let sps = self.config.samples_per_side();
        let (gx, gy) = (gx.min(sps - 1), gy.min(sps - 1));
        let idx = (gy * sps + gx) as usize;
        HeightSample {
            height: self.heights[idx],
            surface: self.surfaces[idx],
        }
    }

    /// Bilinearly interpolated terrain height at a world position
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let unit = self.config.unit_size as f32;
        let max_cell = (self.config.samples_per_side() - 2) as f32;
        let fx = (x / unit).clamp(0.0, max_cell);
        let fz = (z / unit).clamp(0.0, max_cell);
        let (cx, cz) = (fx.floor(), fz.floor());
        let (tx, tz) = (fx - cx, fz - cz);
        let (gx, gy) = (cx as u32, cz as u32);

        let h00 = self.sample(gx, gy).height;
        let h10 = self.sample(gx + 1, gy).height;
        let h01 = self.sample(gx, gy + 1).height;
        let h11 = self.sample(gx + 1, gy + 1).height;

        let h0 = h00 + (h10 - h00) * tx;
        let h1 = h01 + (h11 - h01) * tx;
        h0 + (h1 - h0) * tz
    }

    /// Surface type at a grid coordinate
    pub fn surface_type_at(&self, gx: u32, gy: u32) -> SurfaceType {
        self.sample(gx, gy).surface
    }

    /// One-shot heightfield registration for collision setup. Streams every
    /// sample through the sink; the physics engine owns whatever it builds.
    pub fn register_heightfield(&self, sink: &mut dyn HeightfieldSink) {
        let mut sample = |gx: u32, gy: u32| self.sample(gx, gy);
        sink.register(
            self.config.samples_per_side(),
            self.config.unit_size as f32,
            &mut sample,
        );
    }
}
