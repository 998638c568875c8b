//! Frame generator (producer thread)
//!
//! Renders the frame due next into the slot it holds, records the frame's
//! sequence number and due time in the slot, then hands the slot on by
//! acquiring the successor. Starts holding slot 0.
//!
//! **Per iteration:**
//! 1. paused or frame budget used up: sleep one poll interval, re-check
//! 2. no timeline: ask listeners for a pending switch (hot start)
//! 3. estimate when this frame reaches the screen (render cost included), map
//!    that to a timeline frame
//! 4. render it (minimal pass while `hurry_up`), or clear to blank
//! 5. record the slot frame with its due time, bump `frame_count_since_start`,
//!    advance
//!
//! Render failures are counted and logged; the loop carries on.

use super::buffer_pool::{Producer, SlotGuard};
use super::interfaces::Compositor;
use super::types::{RenderPass, SlotFrame, Timeline};
use super::{Startup, WorkerContext};
use crate::error::{Error, Result};
use crate::state::{timeline_frame_at, PipelineCounters};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Tracks the last frame rendered within one timeline assignment
#[derive(Debug, Default)]
struct AssignmentCursor {
    generation: Option<u64>,
    anchor: i64,
    previous: Option<u64>,
}

pub struct FrameGenerator {
    ctx: WorkerContext,
    compositor: Arc<dyn Compositor>,
    pause_poll: Duration,
    frame_limit: Option<u64>,
}

impl FrameGenerator {
    pub(crate) fn new(
        ctx: WorkerContext,
        compositor: Arc<dyn Compositor>,
        pause_poll: Duration,
        frame_limit: Option<u64>,
    ) -> Self {
        Self {
            ctx,
            compositor,
            pause_poll,
            frame_limit,
        }
    }

    pub(crate) fn spawn(self, startup: Startup) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("reel-generator".to_string())
            .spawn(move || self.run(startup))
            .map_err(|source| Error::ThreadSpawn {
                name: "generator",
                source,
            })
    }

    fn run(self, startup: Startup) {
        let pool = Arc::clone(&self.ctx.pool);
        let mut held = match pool.acquire::<Producer>(0) {
            Ok(guard) => guard,
            Err(e) => {
                debug!("Frame generator abandoned start-up: {}", e);
                return;
            }
        };
        if !startup.handshake() {
            debug!("Frame generator abandoned start-up");
            return;
        }
        info!("Frame generator started");

        let mut cursor = AssignmentCursor::default();
        loop {
            if self.ctx.state.is_quitting() {
                break;
            }
            if self.ctx.state.is_paused() || self.budget_used_up() {
                thread::sleep(self.pause_poll);
                continue;
            }

            self.produce(&mut held, &mut cursor);

            held = match held.advance() {
                Ok(next) => next,
                Err(Error::PoolClosed) => break,
                Err(e) => {
                    error!("Frame generator slot handoff failed: {}", e);
                    break;
                }
            };
        }

        info!("Frame generator stopped");
    }

    fn budget_used_up(&self) -> bool {
        self.frame_limit
            .is_some_and(|limit| self.ctx.state.frame_count() >= limit)
    }

    fn produce(&self, held: &mut SlotGuard<'_, Producer>, cursor: &mut AssignmentCursor) {
        let WorkerContext {
            clock,
            state,
            listeners,
            ..
        } = &self.ctx;
        let started = clock.now();
        let sequence = state.frame_count();

        let mut assignment = state.assignment();
        if assignment.timeline.is_none() {
            listeners.notify_check_pending_timeline_switch();
            assignment = state.assignment();
        }

        let display_time = state.estimated_display_real_time(clock, sequence);
        let performance_time = clock.real_to_performance(display_time);
        state.record_due(display_time);

        let timeline_frame = match &assignment.timeline {
            Some(timeline) => {
                if cursor.generation != Some(assignment.generation) {
                    // First frame of this assignment: it defines the anchor
                    cursor.generation = Some(assignment.generation);
                    cursor.previous = None;
                    cursor.anchor = performance_time;
                    state.anchor_assignment(assignment.generation, performance_time);
                }

                let unit_ticks = clock.unit_ticks(state.frame_rate_scale);
                let raw = timeline_frame_at(
                    assignment.start_frame_offset,
                    cursor.anchor,
                    performance_time,
                    unit_ticks,
                    cursor.previous,
                );
                cursor.previous = Some(raw);
                let frame = raw % timeline.duration_frames().max(1);

                listeners.notify_current_frame_changed(frame);

                let pass = if state.hurry_up.load(Ordering::Acquire) {
                    PipelineCounters::incr(&state.counters.hurry_up_renders);
                    RenderPass::Minimal
                } else {
                    RenderPass::Full
                };

                match self.render_frame(&**timeline, frame, held, pass) {
                    Ok(()) => PipelineCounters::incr(&state.counters.frames_rendered),
                    Err(e) => {
                        PipelineCounters::incr(&state.counters.render_failures);
                        warn!("Render of sequence {} failed: {}", sequence, e);
                        held.buffer_mut().clear();
                    }
                }
                Some(frame)
            }
            None => {
                held.buffer_mut().clear();
                PipelineCounters::incr(&state.counters.frames_blank);
                None
            }
        };

        held.record(SlotFrame {
            sequence,
            timeline_frame,
            performance_time,
        });
        state.note_render_cost(clock.now().saturating_sub(started));
        state.frame_count_since_start.fetch_add(1, Ordering::AcqRel);
        PipelineCounters::incr(&state.counters.frames_generated);
        trace!(
            "Generated sequence {} into slot {} (timeline frame {:?})",
            sequence,
            held.index(),
            timeline_frame
        );
    }

    fn render_frame(
        &self,
        timeline: &dyn Timeline,
        frame: u64,
        held: &mut SlotGuard<'_, Producer>,
        pass: RenderPass,
    ) -> Result<()> {
        let mut buffer = held.buffer_mut();
        self.compositor.render(timeline, frame, &mut buffer, pass)?;
        Ok(())
    }
}
