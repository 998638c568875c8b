//! # Reel Common Library
//!
//! Shared code for the reel playback crates including:
//! - Error types
//! - Performance-time tick arithmetic
//! - Configuration loading (TOML + root resolution)
//! - Play mode / playback event types

pub mod config;
pub mod error;
pub mod events;
pub mod timing;

pub use error::{Error, Result};
pub use events::PlayMode;
