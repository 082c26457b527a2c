//! Asynchronous visibility: render passes, occlusion coverage, the cull
//! output queue and the worker-thread pipeline

pub mod coverage;
pub mod culler;
pub mod pass;
pub mod queue;

pub use coverage::CoverageBuffer;
pub use culler::{
    CandidateKind, CullCandidate, CullSource, CullState, FrameVisibility, RenderSink,
    VisibilityPipeline, VisibleSector,
};
pub use pass::{PassInfo, PassKind, SortToken};
pub use queue::{cull_channel, CullConsumer, CullItem, CullProducer, ObjectFlags, ObjectHandle, Poll};
