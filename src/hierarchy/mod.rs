//! Quadtree of terrain sectors and its spatial queries

pub mod node;
pub mod tree;

pub use node::{GeometryHandle, NodeId, SectorNode, MAX_PASS_SLOTS};
pub use tree::{HeightSample, HeightfieldSink, SectorTree, SurfaceType};
