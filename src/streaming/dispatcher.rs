//! The streaming dispatcher: owns the boundary between "visible" and "has
//! current geometry".
//!
//! One rebuild job per sector, ever. A sector that is already pending or
//! running is never queued again until its result has been applied. Results
//! are applied on the main thread: `drain_completed` in steady state (never
//! blocks), `wait_for_all` at load time (the one blocking call). Jobs are
//! never cancelled; a sector going invisible mid-rebuild still gets its
//! finished geometry applied on a later frame.

use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::hierarchy::{NodeId, SectorTree};
use crate::visibility::PassInfo;

use super::executor::JobExecutor;
use super::job::{JobPriority, JobState, MeshBuilder, RebuildJob, SectorGeometry};

/// Per-frame dispatcher counters
#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchStats {
    pub jobs_queued: u64,
    pub jobs_applied: u64,
    pub duplicate_requests: u64,
}

/// Schedules asynchronous sector rebuilds and applies their results
pub struct StreamingDispatcher {
    tree: Arc<SectorTree>,
    executor: Arc<dyn JobExecutor>,
    builder: Arc<dyn MeshBuilder>,
    /// Outstanding job per sector; absence means no job in flight.
    inflight: HashMap<NodeId, RebuildJob>,
    done_tx: mpsc::Sender<SectorGeometry>,
    done_rx: mpsc::Receiver<SectorGeometry>,
    stats: DispatchStats,
}

impl StreamingDispatcher {
    pub fn new(
        tree: Arc<SectorTree>,
        executor: Arc<dyn JobExecutor>,
        builder: Arc<dyn MeshBuilder>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        Self {
            tree,
            executor,
            builder,
            inflight: HashMap::new(),
            done_tx,
            done_rx,
            stats: DispatchStats::default(),
        }
    }

    /// Queue a rebuild for a visible, stale sector. Idempotent: a sector
    /// with a pending or running job is left alone and `false` is returned.
    ///
    /// Priority derives from the camera distance cached on the node by this
    /// pass's walk.
    pub fn queue_rebuild(&mut self, sector: NodeId, pass: &PassInfo) -> bool {
        if self.inflight.contains_key(&sector) {
            self.stats.duplicate_requests += 1;
            return false;
        }

        let distance = self.tree.node(sector).distance(pass.slot());
        let job = RebuildJob {
            sector,
            priority: JobPriority::from_distance(distance),
            frame_id: pass.frame_id,
        };
        self.inflight.insert(sector, job);
        self.stats.jobs_queued += 1;

        let builder = Arc::clone(&self.builder);
        let done = self.done_tx.clone();
        self.executor.execute(
            job.priority,
            Box::new(move || {
                let handle = builder.rebuild(sector);
                // A dispatcher torn down mid-job just discards the result.
                let _ = done.send(SectorGeometry { sector, handle });
            }),
        );

        log::trace!(
            "queued rebuild for sector {:?} at distance {:.1}",
            sector,
            distance
        );
        true
    }

    /// Apply every rebuild that has completed since the last call. Never
    /// blocks; in-flight jobs keep running. Returns how many geometry
    /// handles were swapped in.
    pub fn drain_completed(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(result) = self.done_rx.try_recv() {
            self.apply(result);
            applied += 1;
        }
        applied
    }

    /// Block until every outstanding job has completed and been applied.
    /// Load-time and editor use only; steady-state frames must use
    /// `drain_completed`.
    pub fn wait_for_all(&mut self) -> Result<()> {
        while !self.inflight.is_empty() {
            match self.done_rx.recv() {
                Ok(result) => self.apply(result),
                Err(mpsc::RecvError) => {
                    return Err(Error::Streaming(
                        "job results channel closed with jobs outstanding".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, result: SectorGeometry) {
        let node = self.tree.node(result.sector);
        let previous = node.swap_geometry(result.handle);
        node.clear_dirty();
        self.inflight.remove(&result.sector);
        self.stats.jobs_applied += 1;

        log::debug!(
            "applied rebuilt geometry for sector {:?} (replaced: {})",
            result.sector,
            previous.is_some()
        );
    }

    /// State of the outstanding job for a sector, if any. A job is Running
    /// from the executor's point of view the moment it is submitted; the
    /// dispatcher only distinguishes "outstanding" from "done and applied".
    pub fn job_state(&self, sector: NodeId) -> Option<JobState> {
        self.inflight.get(&sector).map(|_| JobState::Running)
    }

    pub fn is_inflight(&self, sector: NodeId) -> bool {
        self.inflight.contains_key(&sector)
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}
