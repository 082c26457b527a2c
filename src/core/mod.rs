//! Core types, configuration, errors and logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{TerrainConfig, VegetationConfig};
pub use error::Error;
pub use types::Result;
