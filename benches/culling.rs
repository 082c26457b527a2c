use criterion::{black_box, criterion_group, criterion_main, Criterion};

use terrasect::core::config::TerrainConfig;
use terrasect::core::types::{Mat4, Vec3};
use terrasect::hierarchy::{HeightSample, SectorTree, SurfaceType};
use terrasect::math::Frustum;
use terrasect::visibility::{CullItem, RenderSink, PassInfo, VisibilityPipeline};

use std::sync::Arc;

fn rolling_terrain(gx: u32, gy: u32) -> HeightSample {
    let h = ((gx as f32 * 0.05).sin() + (gy as f32 * 0.07).cos()) * 20.0;
    HeightSample {
        height: h,
        surface: SurfaceType::Grass,
    }
}

fn view_over_terrain() -> (Vec3, Mat4) {
    let eye = Vec3::new(512.0, 150.0, 512.0);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 4000.0);
    let view = Mat4::look_at_rh(eye, Vec3::new(512.0, 0.0, 100.0), Vec3::Y);
    (eye, proj * view)
}

fn bench_tree_build(c: &mut Criterion) {
    let config = TerrainConfig::default();

    c.bench_function("sector_tree_build_16x16", |b| {
        b.iter(|| SectorTree::build(black_box(&config), rolling_terrain).unwrap());
    });
}

fn bench_frustum_walk(c: &mut Criterion) {
    let tree = SectorTree::build(&TerrainConfig::default(), rolling_terrain).unwrap();
    let (eye, vp) = view_over_terrain();
    let frustum = Frustum::from_view_projection(&vp);

    c.bench_function("frustum_walk_16x16", |b| {
        b.iter(|| tree.intersect_frustum(black_box(&frustum), black_box(eye), 0));
    });
}

struct DiscardSink;

impl RenderSink for DiscardSink {
    fn submit(&mut self, item: &CullItem) {
        black_box(item);
    }
}

fn bench_cull_run(c: &mut Criterion) {
    let tree = Arc::new(SectorTree::build(&TerrainConfig::default(), rolling_terrain).unwrap());
    let mut pipeline = VisibilityPipeline::new(Arc::clone(&tree));
    let (eye, vp) = view_over_terrain();

    c.bench_function("cull_run_round_trip", |b| {
        b.iter(|| {
            let pass = PassInfo::general(1, eye, vp);
            pipeline.begin_culling(pass, Vec::new()).unwrap();
            let vis = pipeline.drain(&mut DiscardSink).unwrap();
            pipeline.end_culling();
            black_box(vis.sectors.len())
        });
    });
}

criterion_group!(benches, bench_tree_build, bench_frustum_walk, bench_cull_run);
criterion_main!(benches);
