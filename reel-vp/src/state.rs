//! Shared playback state
//!
//! State observed by the manager, the generator and the displayer. Flags and
//! counters are atomics; the timeline assignment and the display anchor sit
//! behind short internal locks that are never held across a callback.
//!
//! **Writers:**
//! - manager (under the manager lock): `paused`, timeline assignment,
//!   `performance_time_base`, `start_sequence`
//! - generator: `frame_count_since_start`, render cost estimate, newest due
//!   time
//! - displayer: last displayed frame, `hurry_up`, `last_error`
//!
//! Invariant: the last displayed sequence is always below
//! `frame_count_since_start`.

use crate::clock::Clock;
use crate::error::PresentError;
use crate::playback::types::Timeline;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Timeline currently played and where it was switched in
#[derive(Clone, Default)]
pub struct TimelineAssignment {
    pub timeline: Option<Arc<dyn Timeline>>,
    /// Timeline frame shown at the switch point
    pub start_frame_offset: u64,
    /// Performance time of the first frame of this assignment
    pub switch_performance_time: i64,
    /// Bumped on every effective switch
    pub generation: u64,
}

impl std::fmt::Debug for TimelineAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineAssignment")
            .field("timeline", &self.timeline.as_ref().map(|t| t.name().to_string()))
            .field("start_frame_offset", &self.start_frame_offset)
            .field("switch_performance_time", &self.switch_performance_time)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Most recently presented frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayedFrame {
    pub sequence: u64,
    /// Real time (since the clock origin) the frame was presented at
    pub real_time: Duration,
    pub timeline_frame: Option<u64>,
}

/// Pipeline counters (relaxed atomics, updated by the worker threads)
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub frames_generated: AtomicU64,
    pub frames_rendered: AtomicU64,
    pub render_failures: AtomicU64,
    pub frames_blank: AtomicU64,
    pub frames_presented: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub hurry_up_renders: AtomicU64,
    pub timeline_switches: AtomicU64,
}

impl PipelineCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_generated: u64,
    pub frames_rendered: u64,
    pub render_failures: u64,
    pub frames_blank: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub hurry_up_renders: u64,
    pub timeline_switches: u64,
    pub last_displayed_frame: Option<u64>,
}

/// State shared between the manager and both worker threads
#[derive(Debug)]
pub struct PlaybackState {
    pub paused: AtomicBool,
    pub quitting: AtomicBool,
    /// Set by the displayer while frames are late
    pub hurry_up: AtomicBool,
    /// Performance time at which sequence `start_sequence` is due
    pub performance_time_base: AtomicI64,
    /// Sequence number produced first after the latest `start_playing`
    pub start_sequence: AtomicU64,
    pub frame_count_since_start: AtomicU64,
    /// Clock ticks per scheduling unit (1 full rate, 2 half rate)
    pub frame_rate_scale: u32,
    /// Smoothed time the generator needs per frame, in nanoseconds
    render_cost_nanos: AtomicU64,
    /// Real time (since the clock origin) the newest frame is due at, in
    /// nanoseconds
    last_due_nanos: AtomicU64,
    assignment: Mutex<TimelineAssignment>,
    last_displayed: Mutex<Option<DisplayedFrame>>,
    last_error: Mutex<Option<PresentError>>,
    pub counters: PipelineCounters,
}

impl PlaybackState {
    /// Initial state: paused, no timeline
    pub fn new(frame_rate_scale: u32) -> Self {
        Self {
            paused: AtomicBool::new(true),
            quitting: AtomicBool::new(false),
            hurry_up: AtomicBool::new(false),
            performance_time_base: AtomicI64::new(0),
            start_sequence: AtomicU64::new(0),
            frame_count_since_start: AtomicU64::new(0),
            frame_rate_scale: frame_rate_scale.max(1),
            render_cost_nanos: AtomicU64::new(0),
            last_due_nanos: AtomicU64::new(0),
            assignment: Mutex::new(TimelineAssignment::default()),
            last_displayed: Mutex::new(None),
            last_error: Mutex::new(None),
            counters: PipelineCounters::default(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::Acquire)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count_since_start.load(Ordering::Acquire)
    }

    pub fn assignment(&self) -> TimelineAssignment {
        self.assignment.lock().clone()
    }

    pub fn set_assignment(&self, assignment: TimelineAssignment) {
        *self.assignment.lock() = assignment;
    }

    /// Move the anchor of assignment `generation` to where its first frame landed
    ///
    /// No-op if the assignment was replaced meanwhile.
    pub fn anchor_assignment(&self, generation: u64, performance_time: i64) {
        let mut assignment = self.assignment.lock();
        if assignment.generation == generation {
            assignment.switch_performance_time = performance_time;
        }
    }

    pub fn last_displayed(&self) -> Option<DisplayedFrame> {
        *self.last_displayed.lock()
    }

    pub fn record_displayed(&self, frame: DisplayedFrame) {
        *self.last_displayed.lock() = Some(frame);
    }

    pub fn last_error(&self) -> Option<PresentError> {
        self.last_error.lock().clone()
    }

    pub fn record_error(&self, error: PresentError) {
        *self.last_error.lock() = Some(error);
    }

    /// Current estimate of how long producing one frame takes
    pub fn render_cost(&self) -> Duration {
        Duration::from_nanos(self.render_cost_nanos.load(Ordering::Relaxed))
    }

    /// Fold one frame's production time into the render cost estimate
    ///
    /// A slower sample is taken at once; a faster one closes an eighth of the
    /// gap. Only the generator calls this.
    pub fn note_render_cost(&self, sample: Duration) {
        let sample = sample.as_nanos().min(u64::MAX as u128) as u64;
        let current = self.render_cost_nanos.load(Ordering::Relaxed);
        let next = if sample >= current {
            sample
        } else {
            current - (current - sample) / 8
        };
        self.render_cost_nanos.store(next, Ordering::Relaxed);
    }

    /// Real time the most recently generated frame is due at
    pub fn last_due(&self) -> Duration {
        Duration::from_nanos(self.last_due_nanos.load(Ordering::Acquire))
    }

    pub fn record_due(&self, due: Duration) {
        let nanos = due.as_nanos().min(u64::MAX as u128) as u64;
        self.last_due_nanos.store(nanos, Ordering::Release);
    }

    /// Performance time at which `sequence` is due on screen
    pub fn scheduled_performance_time(&self, clock: &Clock, sequence: u64) -> i64 {
        let base = self.performance_time_base.load(Ordering::Acquire);
        let start = self.start_sequence.load(Ordering::Acquire);
        let offset = sequence as i64 - start as i64;
        base.saturating_add(offset.saturating_mul(clock.unit_ticks(self.frame_rate_scale)))
    }

    /// Real-time deadline for presenting `sequence`
    pub fn deadline_real_time(&self, clock: &Clock, sequence: u64) -> Duration {
        clock.performance_to_real(self.scheduled_performance_time(clock, sequence))
    }

    /// Best estimate of when `sequence` will actually reach the screen
    ///
    /// The latest of: its scheduled deadline, the last displayed frame
    /// projected forward by the learned unit duration, the earliest moment a
    /// frame started now can be finished, and half a unit after the previous
    /// frame's due time. A pipeline that has fallen behind therefore maps
    /// frames to later content, and the displayer judges each frame against
    /// this estimate rather than against its sequence slot.
    pub fn estimated_display_real_time(&self, clock: &Clock, sequence: u64) -> Duration {
        let unit = clock.time_per_unit(self.frame_rate_scale);
        let ready = clock.now() + self.render_cost();
        let after_previous = self.last_due() + unit / 2;
        let mut estimate = self
            .deadline_real_time(clock, sequence)
            .max(ready)
            .max(after_previous);
        if let Some(last) = self.last_displayed() {
            if sequence > last.sequence {
                let units = (sequence - last.sequence).min(u32::MAX as u64) as u32;
                let projected = last.real_time + unit * units;
                estimate = estimate.max(projected);
            }
        }
        estimate
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            frames_generated: c.frames_generated.load(Ordering::Relaxed),
            frames_rendered: c.frames_rendered.load(Ordering::Relaxed),
            render_failures: c.render_failures.load(Ordering::Relaxed),
            frames_blank: c.frames_blank.load(Ordering::Relaxed),
            frames_presented: c.frames_presented.load(Ordering::Relaxed),
            frames_dropped: c.frames_dropped.load(Ordering::Relaxed),
            hurry_up_renders: c.hurry_up_renders.load(Ordering::Relaxed),
            timeline_switches: c.timeline_switches.load(Ordering::Relaxed),
            last_displayed_frame: self.last_displayed().map(|d| d.sequence),
        }
    }
}

/// Timeline frame for a frame due at `performance_time`
///
/// Counts whole units since `anchor_performance_time`, starting at
/// `start_frame_offset`. The first frame of an assignment (`previous` is
/// `None`) is exactly the offset; later frames never repeat (`previous + 1` at
/// least). The result is not yet wrapped and saturates at `u64::MAX`.
pub fn timeline_frame_at(
    start_frame_offset: u64,
    anchor_performance_time: i64,
    performance_time: i64,
    unit_ticks: i64,
    previous: Option<u64>,
) -> u64 {
    let Some(previous) = previous else {
        return start_frame_offset;
    };
    let elapsed = performance_time.saturating_sub(anchor_performance_time);
    let units = if unit_ticks > 0 && elapsed > 0 {
        // Round to the nearest unit
        (elapsed.saturating_add(unit_ticks / 2) / unit_ticks) as u64
    } else {
        0
    };
    start_frame_offset
        .saturating_add(units)
        .max(previous.saturating_add(1))
}
