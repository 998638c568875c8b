//! Test helper modules for reel-vp integration tests
//!
//! Provides reusable test infrastructure components:
//! - TestEngine: start a manager on fast timing with recording collaborators
//! - SlowCompositor / StallingCompositor / DropGate: backpressure collaborators
//! - QueuedSwitch: hot-start collaborator

#![allow(dead_code)]

pub mod collaborators;
pub mod test_engine;

pub use collaborators::{DropGate, QueuedSwitch, SlowCompositor, StallingCompositor};
pub use test_engine::{fast_config, wait_for, TestEngine, TEST_TICK};
