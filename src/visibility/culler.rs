//! The visibility pipeline: a dedicated culling thread walking the sector
//! hierarchy and registered object containers against the frustum and the
//! coverage buffer, feeding the per-run output queue.
//!
//! Per frame the pipeline moves `Idle -> Culling -> Draining -> Idle`.
//! `begin_culling` arms a fresh queue and hands the run to the worker;
//! `drain` consumes items on the main thread until the sentinel; and
//! `end_culling` closes the run. The worker never blocks on the consumer,
//! the consumer blocks only until the worker's sentinel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::hierarchy::{NodeId, SectorTree};
use crate::math::Aabb;

use super::coverage::CoverageBuffer;
use super::pass::{PassInfo, SortToken};
use super::queue::{cull_channel, CullConsumer, CullItem, CullProducer, ObjectFlags, ObjectHandle};

/// Candidates nearer than this (after zoom scaling) skip the coverage test
const OCCLUSION_BYPASS_DISTANCE: f32 = 4.0;

const DEFAULT_COVERAGE_SIZE: usize = 64;

/// Kind of a non-terrain cull candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateKind {
    Vegetation,
    DecalRoad,
    Renderable,
}

/// One object offered to the culling walk by a registered container
#[derive(Clone, Copy, Debug)]
pub struct CullCandidate {
    pub kind: CandidateKind,
    pub object: ObjectHandle,
    pub bounds: Aabb,
    pub flags: ObjectFlags,
}

/// A spatial container of renderable objects registered with the pipeline.
/// Called on the culling thread once per run.
pub trait CullSource: Send + Sync {
    fn candidates(&self, pass: &PassInfo, out: &mut Vec<CullCandidate>);
}

/// Receives every visible item during the main-thread drain. The renderer
/// side of the boundary; the pipeline never touches vertex data.
pub trait RenderSink {
    fn submit(&mut self, item: &CullItem);
}

/// Pipeline state over one frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullState {
    Idle,
    Culling,
    Draining,
}

/// A visible terrain sector with its ranking data
#[derive(Clone, Copy, Debug)]
pub struct VisibleSector {
    pub sector: NodeId,
    pub distance: f32,
    pub token: SortToken,
}

/// Result of one culling run
#[derive(Debug, Default)]
pub struct FrameVisibility {
    /// Visible sectors sorted by ascending camera distance.
    pub sectors: Vec<VisibleSector>,
    /// Total items delivered, all kinds.
    pub item_count: usize,
}

impl FrameVisibility {
    /// Sort sectors nearest-first. Ties may land in either order; the sort
    /// ranks streaming relevance, the renderer owns depth correctness.
    pub fn sort_ascending(&mut self) {
        self.sectors
            .sort_unstable_by(|a, b| a.distance.total_cmp(&b.distance));
    }
}

struct CullRequest {
    pass: PassInfo,
    occluders: Vec<Aabb>,
    producer: CullProducer,
}

/// Owner of the culling worker thread and the per-frame run state
pub struct VisibilityPipeline {
    tree: Arc<SectorTree>,
    sources: Arc<Mutex<Vec<Arc<dyn CullSource>>>>,
    freeze_coverage: Arc<AtomicBool>,
    coverage_size: usize,
    request_tx: Option<mpsc::Sender<CullRequest>>,
    worker: Option<JoinHandle<()>>,
    consumer: Option<CullConsumer>,
    state: CullState,
}

impl VisibilityPipeline {
    pub fn new(tree: Arc<SectorTree>) -> Self {
        Self::with_coverage_size(tree, DEFAULT_COVERAGE_SIZE)
    }

    pub fn with_coverage_size(tree: Arc<SectorTree>, coverage_size: usize) -> Self {
        let mut pipeline = Self {
            tree,
            sources: Arc::new(Mutex::new(Vec::new())),
            freeze_coverage: Arc::new(AtomicBool::new(false)),
            coverage_size,
            request_tx: None,
            worker: None,
            consumer: None,
            state: CullState::Idle,
        };
        pipeline.spawn_worker();
        pipeline
    }

    fn spawn_worker(&mut self) {
        let (tx, rx) = mpsc::channel::<CullRequest>();
        let tree = Arc::clone(&self.tree);
        let sources = Arc::clone(&self.sources);
        let freeze = Arc::clone(&self.freeze_coverage);
        let coverage_size = self.coverage_size;

        let handle = std::thread::Builder::new()
            .name("terrasect-cull".into())
            .spawn(move || {
                let mut coverage = CoverageBuffer::new(coverage_size, coverage_size);
                while let Ok(request) = rx.recv() {
                    coverage.set_frozen(freeze.load(Ordering::Relaxed));
                    run_cull(&tree, &sources, &mut coverage, request);
                }
            })
            .expect("failed to spawn culling thread");

        self.request_tx = Some(tx);
        self.worker = Some(handle);
    }

    /// Register another spatial container to walk each run. Setup-time
    /// operation; takes effect from the next `begin_culling`.
    pub fn register_source(&mut self, source: Arc<dyn CullSource>) {
        self.sources.lock().unwrap().push(source);
    }

    /// Keep the previous run's coverage across runs (debugging aid)
    pub fn set_freeze_coverage(&mut self, frozen: bool) {
        self.freeze_coverage.store(frozen, Ordering::Relaxed);
    }

    pub fn state(&self) -> CullState {
        self.state
    }

    /// Arm the output queue for a new run and hand the walk to the worker.
    ///
    /// `occluders` are this frame's occlusion geometry, rasterized into the
    /// coverage buffer before any visibility test.
    pub fn begin_culling(&mut self, pass: PassInfo, occluders: Vec<Aabb>) -> Result<()> {
        if self.state != CullState::Idle {
            return Err(Error::Contract(format!(
                "begin_culling in state {:?}",
                self.state
            )));
        }

        let (producer, consumer) = cull_channel();
        let request = CullRequest {
            pass,
            occluders,
            producer,
        };

        let sent = self
            .request_tx
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok());
        if !sent {
            // The worker died on a previous run. This frame is lost; bring
            // a fresh worker up for the next one.
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
            self.spawn_worker();
            return Err(Error::DroppedFrame(
                "culling worker unavailable, restarted".into(),
            ));
        }

        self.consumer = Some(consumer);
        self.state = CullState::Culling;
        Ok(())
    }

    /// Drain the run on the calling thread, handing every item to `sink`.
    ///
    /// Blocks only between items, bounded by the worker's sentinel. Returns
    /// the terrain visibility result sorted nearest-first. A worker death
    /// before the sentinel surfaces as `Error::DroppedFrame` and the run's
    /// partial output must be discarded by the caller.
    pub fn drain(&mut self, sink: &mut dyn RenderSink) -> Result<FrameVisibility> {
        if self.state != CullState::Culling {
            return Err(Error::Contract(format!("drain in state {:?}", self.state)));
        }
        let Some(mut consumer) = self.consumer.take() else {
            return Err(Error::Contract("drain without an armed queue".into()));
        };
        self.state = CullState::Draining;

        let mut result = FrameVisibility::default();
        loop {
            match consumer.next_blocking() {
                Ok(Some(item)) => {
                    result.item_count += 1;
                    if let CullItem::TerrainSector {
                        sector,
                        distance,
                        token,
                    } = item
                    {
                        result.sectors.push(VisibleSector {
                            sector,
                            distance,
                            token,
                        });
                    }
                    sink.submit(&item);
                }
                Ok(None) => break,
                Err(err) => {
                    self.state = CullState::Idle;
                    return Err(err);
                }
            }
        }

        result.sort_ascending();
        Ok(result)
    }

    /// Close the run and return to idle
    pub fn end_culling(&mut self) {
        if self.state == CullState::Culling {
            log::warn!("end_culling before drain, discarding run output");
        }
        self.consumer = None;
        self.state = CullState::Idle;
    }
}

impl Drop for VisibilityPipeline {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.request_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// One culling run, executed on the worker thread
fn run_cull(
    tree: &SectorTree,
    sources: &Mutex<Vec<Arc<dyn CullSource>>>,
    coverage: &mut CoverageBuffer,
    request: CullRequest,
) {
    let pass = &request.pass;
    coverage.begin(pass.view_proj);
    for occluder in &request.occluders {
        coverage.add_occluder(occluder);
    }

    let mut next_token = 0u32;
    let mut take_token = || {
        let token = SortToken(next_token);
        next_token += 1;
        token
    };

    // Terrain sectors first, in walk-discovery order.
    let slot = pass.slot();
    let visible_nodes = tree.intersect_frustum(&pass.frustum, pass.camera_pos, slot);
    let mut pushed = 0usize;
    for id in visible_nodes {
        let node = tree.node(id);
        let distance = node.distance(slot);
        if occludable(distance, pass) && !coverage.test_aabb(node.bounds()) {
            continue;
        }
        request.producer.push(CullItem::TerrainSector {
            sector: id,
            distance,
            token: take_token(),
        });
        pushed += 1;
    }

    // Then every registered container.
    let sources: Vec<Arc<dyn CullSource>> = sources.lock().unwrap().clone();
    let mut candidates = Vec::new();
    for source in &sources {
        source.candidates(pass, &mut candidates);
    }
    for candidate in &candidates {
        if candidate.flags.contains(ObjectFlags::HIDDEN) {
            continue;
        }
        if !pass.frustum.intersects_aabb(&candidate.bounds) {
            continue;
        }
        let distance = candidate.bounds.distance_to_point(pass.camera_pos);
        let skip_occlusion = candidate.flags.contains(ObjectFlags::SKIP_OCCLUSION);
        if !skip_occlusion
            && occludable(distance, pass)
            && !coverage.test_aabb(&candidate.bounds)
        {
            continue;
        }

        let item = match candidate.kind {
            CandidateKind::Vegetation => CullItem::Vegetation {
                object: candidate.object,
                bounds: candidate.bounds,
                distance,
                flags: candidate.flags,
                token: take_token(),
            },
            CandidateKind::DecalRoad => CullItem::DecalRoad {
                object: candidate.object,
                bounds: candidate.bounds,
                distance,
                token: take_token(),
            },
            CandidateKind::Renderable => CullItem::Renderable {
                object: candidate.object,
                bounds: candidate.bounds,
                distance,
                flags: candidate.flags,
                token: take_token(),
            },
        };
        request.producer.push(item);
        pushed += 1;
    }

    log::trace!(
        "cull run frame {}: {} candidates, {} items",
        pass.frame_id,
        candidates.len(),
        pushed
    );
    request.producer.finish();
}

/// Whether a candidate at this distance is subject to occlusion at all.
/// Very close geometry always passes; the zoom factor widens that bypass
/// when the camera is zoomed in.
fn occludable(distance: f32, pass: &PassInfo) -> bool {
    distance * pass.inverse_zoom() > OCCLUSION_BYPASS_DISTANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TerrainConfig;
    use crate::core::types::{Mat4, Vec3};
    use crate::hierarchy::HeightSample;

    struct Collect {
        items: Vec<CullItem>,
    }

    impl Collect {
        fn new() -> Self {
            Self { items: Vec::new() }
        }
    }

    impl RenderSink for Collect {
        fn submit(&mut self, item: &CullItem) {
            self.items.push(item.clone());
        }
    }

    fn flat_tree() -> Arc<SectorTree> {
        Arc::new(
            SectorTree::build(&TerrainConfig::default(), |_, _| HeightSample {
                height: 0.0,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn pass_overlooking_terrain(frame_id: u64) -> PassInfo {
        let eye = Vec3::new(512.0, 100.0, 512.0);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 4000.0);
        let view = Mat4::look_at_rh(eye, Vec3::new(512.0, 0.0, 100.0), Vec3::Y);
        PassInfo::general(frame_id, eye, proj * view)
    }

    fn pass_facing_away(frame_id: u64) -> PassInfo {
        let eye = Vec3::new(512.0, 100.0, -2000.0);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 500.0);
        let view = Mat4::look_at_rh(eye, Vec3::new(512.0, 100.0, -3000.0), Vec3::Y);
        PassInfo::general(frame_id, eye, proj * view)
    }

    #[test]
    fn test_state_machine_round_trip() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        assert_eq!(pipeline.state(), CullState::Idle);

        pipeline
            .begin_culling(pass_overlooking_terrain(1), Vec::new())
            .unwrap();
        assert_eq!(pipeline.state(), CullState::Culling);

        let mut sink = Collect::new();
        let vis = pipeline.drain(&mut sink).unwrap();
        assert_eq!(pipeline.state(), CullState::Draining);
        assert!(!vis.sectors.is_empty());
        assert_eq!(vis.item_count, sink.items.len());

        pipeline.end_culling();
        assert_eq!(pipeline.state(), CullState::Idle);
    }

    #[test]
    fn test_begin_twice_is_a_contract_violation() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        pipeline
            .begin_culling(pass_overlooking_terrain(1), Vec::new())
            .unwrap();
        let err = pipeline.begin_culling(pass_overlooking_terrain(1), Vec::new());
        assert!(matches!(err, Err(Error::Contract(_))));

        let mut sink = Collect::new();
        pipeline.drain(&mut sink).unwrap();
        pipeline.end_culling();
    }

    #[test]
    fn test_sectors_sorted_nearest_first() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        pipeline
            .begin_culling(pass_overlooking_terrain(1), Vec::new())
            .unwrap();
        let vis = pipeline.drain(&mut Collect::new()).unwrap();
        pipeline.end_culling();

        for pair in vis.sectors.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_empty_run_returns_cleanly() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        pipeline
            .begin_culling(pass_facing_away(1), Vec::new())
            .unwrap();
        let mut sink = Collect::new();
        let vis = pipeline.drain(&mut sink).unwrap();
        pipeline.end_culling();

        assert!(vis.sectors.is_empty());
        assert_eq!(vis.item_count, 0);
        assert!(sink.items.is_empty());
    }

    #[test]
    fn test_consecutive_runs_reuse_the_worker() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        for frame in 1..=3 {
            pipeline
                .begin_culling(pass_overlooking_terrain(frame), Vec::new())
                .unwrap();
            let vis = pipeline.drain(&mut Collect::new()).unwrap();
            pipeline.end_culling();
            assert!(!vis.sectors.is_empty());
        }
    }

    #[test]
    fn test_tokens_increase_in_arrival_order() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        pipeline
            .begin_culling(pass_overlooking_terrain(1), Vec::new())
            .unwrap();
        let mut sink = Collect::new();
        pipeline.drain(&mut sink).unwrap();
        pipeline.end_culling();

        let tokens: Vec<u32> = sink.items.iter().map(|i| i.token().0).collect();
        for pair in tokens.windows(2) {
            assert!(pair[0] < pair[1], "tokens must follow discovery order");
        }
    }

    struct FixedObjects {
        objects: Vec<CullCandidate>,
    }

    impl CullSource for FixedObjects {
        fn candidates(&self, _pass: &PassInfo, out: &mut Vec<CullCandidate>) {
            out.extend_from_slice(&self.objects);
        }
    }

    #[test]
    fn test_source_objects_respect_flags_and_occlusion() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        let in_view = |x: f32| {
            // In front of the test camera, past the occlusion bypass range.
            Aabb::from_center_half_extent(Vec3::new(x, 100.0, 312.0), Vec3::splat(2.0))
        };
        pipeline.register_source(Arc::new(FixedObjects {
            objects: vec![
                CullCandidate {
                    kind: CandidateKind::Renderable,
                    object: ObjectHandle(1),
                    bounds: in_view(512.0),
                    flags: ObjectFlags::NONE,
                },
                CullCandidate {
                    kind: CandidateKind::Vegetation,
                    object: ObjectHandle(2),
                    bounds: in_view(520.0),
                    flags: ObjectFlags::HIDDEN,
                },
                CullCandidate {
                    kind: CandidateKind::DecalRoad,
                    object: ObjectHandle(3),
                    bounds: in_view(504.0),
                    flags: ObjectFlags::NONE,
                },
            ],
        }));

        pipeline
            .begin_culling(pass_overlooking_terrain(1), Vec::new())
            .unwrap();
        let mut sink = Collect::new();
        pipeline.drain(&mut sink).unwrap();
        pipeline.end_culling();

        let handles: Vec<u64> = sink
            .items
            .iter()
            .filter_map(|i| match i {
                CullItem::Renderable { object, .. } => Some(object.0),
                CullItem::DecalRoad { object, .. } => Some(object.0),
                CullItem::Vegetation { object, .. } => Some(object.0),
                CullItem::TerrainSector { .. } => None,
            })
            .collect();
        assert!(handles.contains(&1));
        assert!(handles.contains(&3));
        assert!(!handles.contains(&2), "hidden objects never reach the queue");
    }

    #[test]
    fn test_occluder_suppresses_objects_behind_it() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        // Camera level at y=100, looking straight down -z from (512, 100, 512).
        let eye = Vec3::new(512.0, 100.0, 512.0);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 4000.0);
        let view = Mat4::look_at_rh(eye, Vec3::new(512.0, 100.0, 0.0), Vec3::Y);
        let pass = PassInfo::general(1, eye, proj * view);

        // Object dead-center in view, 400 units out.
        let behind_wall = Aabb::from_center_half_extent(Vec3::new(512.0, 100.0, 112.0), Vec3::ONE);
        pipeline.register_source(Arc::new(FixedObjects {
            objects: vec![
                CullCandidate {
                    kind: CandidateKind::Renderable,
                    object: ObjectHandle(10),
                    bounds: behind_wall,
                    flags: ObjectFlags::NONE,
                },
                CullCandidate {
                    kind: CandidateKind::Renderable,
                    object: ObjectHandle(11),
                    bounds: behind_wall,
                    flags: ObjectFlags::SKIP_OCCLUSION,
                },
            ],
        }));

        // Wall 110 units from the camera, covering the screen center.
        let wall = Aabb::new(
            Vec3::new(412.0, 0.0, 400.0),
            Vec3::new(612.0, 200.0, 402.0),
        );
        pipeline.begin_culling(pass, vec![wall]).unwrap();
        let mut sink = Collect::new();
        pipeline.drain(&mut sink).unwrap();
        pipeline.end_culling();

        let handles: Vec<u64> = sink
            .items
            .iter()
            .filter_map(|i| match i {
                CullItem::Renderable { object, .. } => Some(object.0),
                _ => None,
            })
            .collect();
        assert!(
            !handles.contains(&10),
            "occluded object must not be submitted"
        );
        assert!(
            handles.contains(&11),
            "occlusion opt-out must bypass the coverage test"
        );
    }

    #[test]
    fn test_distance_ranking_orders_mixed_distances() {
        // [10, 50, 5, 100] must come out [5, 10, 50, 100].
        let mut vis = FrameVisibility {
            sectors: [10.0f32, 50.0, 5.0, 100.0]
                .iter()
                .enumerate()
                .map(|(i, &d)| VisibleSector {
                    sector: NodeId {
                        level: 0,
                        index: i as u32,
                    },
                    distance: d,
                    token: SortToken(i as u32),
                })
                .collect(),
            item_count: 4,
        };
        vis.sort_ascending();
        let distances: Vec<f32> = vis.sectors.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![5.0, 10.0, 50.0, 100.0]);
    }

    struct Panicker;

    impl CullSource for Panicker {
        fn candidates(&self, _pass: &PassInfo, _out: &mut Vec<CullCandidate>) {
            panic!("source failure");
        }
    }

    #[test]
    fn test_worker_death_surfaces_as_dropped_frame() {
        let mut pipeline = VisibilityPipeline::new(flat_tree());
        pipeline.register_source(Arc::new(Panicker));

        pipeline
            .begin_culling(pass_overlooking_terrain(1), Vec::new())
            .unwrap();
        let err = pipeline.drain(&mut Collect::new());
        assert!(matches!(err, Err(Error::DroppedFrame(_))));
        pipeline.end_culling();

        // The next begin notices the dead worker and restarts it.
        let err = pipeline.begin_culling(pass_overlooking_terrain(2), Vec::new());
        assert!(matches!(err, Err(Error::DroppedFrame(_))));
        pipeline
            .begin_culling(pass_overlooking_terrain(3), Vec::new())
            .unwrap();
        let err = pipeline.drain(&mut Collect::new());
        assert!(matches!(err, Err(Error::DroppedFrame(_))), "panicking source persists");
        pipeline.end_culling();
    }
}
