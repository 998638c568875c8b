//! Error types for reel-vp
//!
//! Start-up errors (`ClockInit`, `InsufficientBuffers`, `Config`, `ThreadSpawn`)
//! abort `PlaybackManager::init`. In steady state `Render` is recoverable (the
//! frame is skipped), `Present` is fatal to the displayer, and `LockTimeout` is
//! returned to callers of the timed manager lock.

use std::time::Duration;
use thiserror::Error;

/// Error reported by a compositor for a single frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("render failed for frame {frame}: {reason}")]
pub struct RenderError {
    pub frame: u64,
    pub reason: String,
}

impl RenderError {
    pub fn new(frame: u64, reason: impl Into<String>) -> Self {
        Self {
            frame,
            reason: reason.into(),
        }
    }
}

/// Error reported by a presentation surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentError {
    /// The display surface no longer exists
    #[error("presentation surface lost: {0}")]
    SurfaceLost(String),

    /// Any other unrecoverable presentation failure
    #[error("presentation failed: {0}")]
    Failed(String),
}

/// Error reported by a buffer allocator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The allocator cannot produce buffers in this format at all
    #[error("pixel format {0} not supported")]
    UnsupportedFormat(String),

    /// The allocator ran out of memory for this buffer
    #[error("out of buffer memory ({requested} bytes requested, {available} available)")]
    OutOfMemory { requested: usize, available: usize },
}

/// Main error type for reel-vp
#[derive(Error, Debug)]
pub enum Error {
    /// The clock thread could not be started or never produced a first tick
    #[error("Clock initialization failed: {0}")]
    ClockInit(String),

    /// Fewer than the minimum number of presentation buffers could be allocated
    #[error("Insufficient presentation buffers: {allocated} allocated, {required} required")]
    InsufficientBuffers { allocated: usize, required: usize },

    /// Compositor failure (recoverable)
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Presentation failure (fatal to the displayer)
    #[error(transparent)]
    Present(#[from] PresentError),

    /// The manager lock could not be acquired in time
    #[error("Manager lock not acquired within {0:?}")]
    LockTimeout(Duration),

    /// The buffer pool was closed while waiting for a slot (shutdown in progress)
    #[error("Buffer pool closed")]
    PoolClosed,

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current engine state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A worker thread could not be spawned
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Errors from the shared library (config loading etc.)
    #[error(transparent)]
    Common(#[from] reel_common::Error),
}

/// Convenience Result type using reel-vp Error
pub type Result<T> = std::result::Result<T, Error>;
