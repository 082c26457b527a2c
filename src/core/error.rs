//! Error types for the terrasect core

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// Terrain dimensions violate the exact power-of-two relationships
    /// required at construction. Not recoverable; initialization must abort.
    #[error("configuration error: {0}")]
    Config(String),

    /// The culling worker died before signalling the end of its run. The
    /// frame's visibility result is incomplete and must not be used.
    #[error("visibility run dropped: {0}")]
    DroppedFrame(String),

    /// A per-frame ordering contract was violated by the caller, such as
    /// starting a culling run while the previous one is still open.
    #[error("contract violation: {0}")]
    Contract(String),

    #[error("streaming error: {0}")]
    Streaming(String),
}
