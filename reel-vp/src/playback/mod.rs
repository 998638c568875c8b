//! Real-time frame scheduling pipeline
//!
//! Two long-lived threads share a [`buffer_pool::BufferPool`]:
//!
//! ```text
//!   FrameGenerator ──render──▶ [slot i] ──handoff──▶ FrameDisplayer ──present──▶ surface
//!        ▲                                                  │
//!        └──────── hurry_up / last displayed frame ─────────┘
//! ```
//!
//! No channel carries frames; the threads coordinate only through slot
//! ownership and the atomics in [`crate::state::PlaybackState`].
//! [`manager::PlaybackManager`] owns everything and is the only public entry
//! point for control.

pub mod allocator;
pub mod buffer_pool;
pub mod displayer;
pub mod generator;
pub mod interfaces;
pub mod listeners;
pub mod manager;
pub mod types;

use crate::clock::Clock;
use crate::state::PlaybackState;
use buffer_pool::BufferPool;
use crossbeam_channel::{Receiver, Sender};
use listeners::ListenerSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Handles shared by both worker threads
#[derive(Debug, Clone)]
pub(crate) struct WorkerContext {
    pub clock: Arc<Clock>,
    pub pool: Arc<BufferPool>,
    pub state: Arc<PlaybackState>,
    pub listeners: Arc<ListenerSet>,
}

impl WorkerContext {
    /// Ask both workers to exit: set `quitting` and wake every slot waiter
    pub fn request_stop(&self) {
        self.state.quitting.store(true, Ordering::Release);
        self.pool.close();
    }
}

/// Start-up handshake between a worker and the manager
///
/// Each worker takes its initial slot, reports ready, and waits for the go
/// signal, so neither can advance before the other holds its starting slot.
#[derive(Debug)]
pub(crate) struct Startup {
    ready: Sender<()>,
    go: Receiver<()>,
}

impl Startup {
    pub fn new(ready: Sender<()>, go: Receiver<()>) -> Self {
        Self { ready, go }
    }

    /// Report ready and wait for go; `false` means start-up was abandoned
    pub fn handshake(self) -> bool {
        if self.ready.send(()).is_err() {
            return false;
        }
        self.go.recv().is_ok()
    }
}
