//! Asynchronous sector geometry rebuilds

pub mod dispatcher;
pub mod executor;
pub mod job;

pub use dispatcher::{DispatchStats, StreamingDispatcher};
pub use executor::{JobExecutor, ManualExecutor, RayonExecutor, RebuildTask};
pub use job::{JobPriority, JobState, MeshBuilder, RebuildJob, SectorGeometry};
