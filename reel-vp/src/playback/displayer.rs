//! Frame displayer (consumer thread)
//!
//! Trails the generator around the pool, starting on slot N-1. For each slot
//! it takes the frame's deadline from the performance time the generator
//! recorded with it and either presents it on time or drops it when already
//! late. A generator that has fallen behind records later due times, so its
//! frames still reach the screen.
//!
//! **Backpressure:** a frame later than the tolerance is not presented and
//! `hurry_up` is raised so the generator switches to minimal renders; the next
//! on-time frame clears it.
//!
//! **Fatal errors:** a presentation failure records the error, releases the
//! held slot, and asks both workers to stop (pool closed). The manager joins
//! the threads on shutdown.

use super::buffer_pool::{Consumer, SlotGuard};
use super::interfaces::PresentationSurface;
use super::types::SlotFrame;
use super::{Startup, WorkerContext};
use crate::error::{Error, Result};
use crate::state::{DisplayedFrame, PipelineCounters};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Longest single sleep while waiting for a deadline
const DEADLINE_SLEEP_SLICE: Duration = Duration::from_millis(10);

pub struct FrameDisplayer {
    ctx: WorkerContext,
    surface: Arc<dyn PresentationSurface>,
    pause_poll: Duration,
    late_tolerance: Option<Duration>,
}

impl FrameDisplayer {
    pub(crate) fn new(
        ctx: WorkerContext,
        surface: Arc<dyn PresentationSurface>,
        pause_poll: Duration,
        late_tolerance: Option<Duration>,
    ) -> Self {
        Self {
            ctx,
            surface,
            pause_poll,
            late_tolerance,
        }
    }

    pub(crate) fn spawn(self, startup: Startup) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("reel-displayer".to_string())
            .spawn(move || self.run(startup))
            .map_err(|source| Error::ThreadSpawn {
                name: "displayer",
                source,
            })
    }

    fn run(self, startup: Startup) {
        let pool = Arc::clone(&self.ctx.pool);
        let clock = &self.ctx.clock;
        let state = &self.ctx.state;

        let mut held = match pool.acquire::<Consumer>(pool.len() - 1) {
            Ok(guard) => guard,
            Err(e) => {
                debug!("Frame displayer abandoned start-up: {}", e);
                return;
            }
        };
        if !startup.handshake() {
            debug!("Frame displayer abandoned start-up");
            return;
        }
        info!("Frame displayer started");

        loop {
            if state.is_quitting() {
                break;
            }
            if state.is_paused() {
                thread::sleep(self.pause_poll);
                continue;
            }

            held = match held.advance() {
                Ok(next) => next,
                Err(Error::PoolClosed) => break,
                Err(e) => {
                    error!("Frame displayer slot handoff failed: {}", e);
                    break;
                }
            };
            let Some(frame) = held.frame() else {
                continue;
            };
            if frame.sequence < state.start_sequence.load(Ordering::Acquire) {
                // Rendered before the latest resume
                PipelineCounters::incr(&state.counters.frames_dropped);
                continue;
            }

            let deadline = clock.performance_to_real(frame.performance_time);
            let tolerance = self
                .late_tolerance
                .unwrap_or_else(|| clock.time_per_unit(state.frame_rate_scale) / 2);
            let now = clock.now();

            if now > deadline + tolerance {
                if !state.hurry_up.swap(true, Ordering::AcqRel) {
                    debug!(
                        "Sequence {} late by {:?}, dropping frames",
                        frame.sequence,
                        now - deadline
                    );
                }
                PipelineCounters::incr(&state.counters.frames_dropped);
                continue;
            }
            state.hurry_up.store(false, Ordering::Release);

            if !self.sleep_until(deadline) {
                break;
            }

            if let Err(e) = self.present(&held, frame) {
                error!("Presentation failed, stopping playback: {}", e);
                if let Error::Present(cause) = e {
                    state.record_error(cause);
                }
                drop(held);
                self.ctx.request_stop();
                info!("Frame displayer stopped");
                return;
            }
        }

        info!("Frame displayer stopped");
    }

    fn present(&self, held: &SlotGuard<'_, Consumer>, frame: SlotFrame) -> Result<()> {
        let state = &self.ctx.state;
        self.surface.present(&held.buffer(), frame)?;
        state.record_displayed(DisplayedFrame {
            sequence: frame.sequence,
            real_time: self.ctx.clock.now(),
            timeline_frame: frame.timeline_frame,
        });
        PipelineCounters::incr(&state.counters.frames_presented);
        trace!("Presented sequence {} from slot {}", frame.sequence, held.index());
        Ok(())
    }

    /// Sleep until `deadline`; `false` if shutdown was requested meanwhile
    fn sleep_until(&self, deadline: Duration) -> bool {
        loop {
            if self.ctx.state.is_quitting() {
                return false;
            }
            let now = self.ctx.clock.now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(DEADLINE_SLEEP_SLICE));
        }
    }
}
