//! Per-frame driver.
//!
//! The coordinator owns no logic of its own; it pins the ordering contract
//! between the pieces. Each frame: begin the cull run, drain the output
//! queue on the main thread (render submissions go to the sink, visible
//! stale sectors become rebuild jobs, near sectors are noted for
//! vegetation), apply completed rebuilds, then update the vegetation
//! cache. `load_level` is the synchronous variant that blocks until all
//! jobs are applied and all vegetation is built.

use std::sync::Arc;

use crate::core::config::VegetationConfig;
use crate::core::types::{Mat4, Result, Vec3};
use crate::hierarchy::SectorTree;
use crate::math::Aabb;
use crate::procedural::ProceduralContentCache;
use crate::streaming::StreamingDispatcher;
use crate::visibility::{FrameVisibility, PassInfo, RenderSink, VisibilityPipeline};

/// What one frame did, for stats overlays and tests
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSummary {
    pub frame_id: u64,
    pub visible_sectors: usize,
    pub items_submitted: usize,
    pub jobs_queued: usize,
    pub jobs_applied: usize,
    pub vegetation_active: usize,
}

/// Composes the hierarchy, visibility pipeline, dispatcher and vegetation
/// cache into the per-frame sequence.
pub struct FrameCoordinator {
    tree: Arc<SectorTree>,
    pipeline: VisibilityPipeline,
    dispatcher: StreamingDispatcher,
    cache: ProceduralContentCache,
    frame_id: u64,
}

impl FrameCoordinator {
    pub fn new(
        tree: Arc<SectorTree>,
        pipeline: VisibilityPipeline,
        dispatcher: StreamingDispatcher,
        cache: ProceduralContentCache,
    ) -> Self {
        Self {
            tree,
            pipeline,
            dispatcher,
            cache,
            frame_id: 0,
        }
    }

    /// Run one steady-state frame for the general pass. Never blocks beyond
    /// the bounded drain of the cull queue.
    pub fn run_frame(
        &mut self,
        camera_pos: Vec3,
        view_proj: Mat4,
        veg_cfg: &VegetationConfig,
        occluders: Vec<Aabb>,
        sink: &mut dyn RenderSink,
    ) -> Result<FrameSummary> {
        self.frame_id += 1;
        let pass = PassInfo::general(self.frame_id, camera_pos, view_proj);

        let visibility = self.cull(pass, occluders, sink)?;
        let jobs_queued = self.schedule_rebuilds(&visibility, &pass, veg_cfg);
        let jobs_applied = self.dispatcher.drain_completed();
        self.cache.update(&self.tree, veg_cfg, camera_pos, false);

        Ok(FrameSummary {
            frame_id: self.frame_id,
            visible_sectors: visibility.sectors.len(),
            items_submitted: visibility.item_count,
            jobs_queued,
            jobs_applied,
            vegetation_active: self.cache.active_count(),
        })
    }

    /// Run an extra pass (shadow, recursion) within the current frame.
    /// Extra passes only cull and submit; streaming and vegetation remain
    /// the general pass's business.
    pub fn run_extra_pass(
        &mut self,
        pass: PassInfo,
        occluders: Vec<Aabb>,
        sink: &mut dyn RenderSink,
    ) -> Result<FrameVisibility> {
        self.cull(pass, occluders, sink)
    }

    /// Synchronous level-load path: one frame, then block until every
    /// rebuild is applied and every surviving vegetation sector is built.
    /// The one legitimately blocking entry point.
    pub fn load_level(
        &mut self,
        camera_pos: Vec3,
        view_proj: Mat4,
        veg_cfg: &VegetationConfig,
        sink: &mut dyn RenderSink,
    ) -> Result<FrameSummary> {
        let mut summary = self.run_frame(camera_pos, view_proj, veg_cfg, Vec::new(), sink)?;
        self.dispatcher.wait_for_all()?;
        self.cache.update(&self.tree, veg_cfg, camera_pos, true);

        summary.jobs_applied = summary.jobs_queued;
        summary.vegetation_active = self.cache.active_count();
        log::info!(
            "level load complete: {} sectors visible, {} rebuilds applied",
            summary.visible_sectors,
            summary.jobs_applied
        );
        Ok(summary)
    }

    fn cull(
        &mut self,
        pass: PassInfo,
        occluders: Vec<Aabb>,
        sink: &mut dyn RenderSink,
    ) -> Result<FrameVisibility> {
        self.pipeline.begin_culling(pass, occluders)?;
        let result = self.pipeline.drain(sink);
        self.pipeline.end_culling();
        result
    }

    /// Visible + stale sectors get a rebuild job; near visible sectors are
    /// noted for vegetation.
    fn schedule_rebuilds(
        &mut self,
        visibility: &FrameVisibility,
        pass: &PassInfo,
        veg_cfg: &VegetationConfig,
    ) -> usize {
        let mut queued = 0;
        for visible in &visibility.sectors {
            let node = self.tree.node(visible.sector);
            if node.is_dirty() || node.geometry().is_none() {
                if self.dispatcher.queue_rebuild(visible.sector, pass) {
                    queued += 1;
                }
            }
            if node.is_leaf() && visible.distance <= veg_cfg.range {
                self.cache.note_visible_sector(visible.sector, visible.distance);
            }
        }
        queued
    }

    pub fn pipeline(&mut self) -> &mut VisibilityPipeline {
        &mut self.pipeline
    }

    pub fn dispatcher(&self) -> &StreamingDispatcher {
        &self.dispatcher
    }

    pub fn vegetation(&self) -> &ProceduralContentCache {
        &self.cache
    }

    pub fn tree(&self) -> &Arc<SectorTree> {
        &self.tree
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
}
