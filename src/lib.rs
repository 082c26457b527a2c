//! Terrasect - terrain sector hierarchy, visibility and streaming core

pub mod core;
pub mod math;
pub mod hierarchy;
pub mod visibility;
pub mod streaming;
pub mod procedural;
pub mod frame;
