//! Playback manager (facade)
//!
//! Owns the clock, the buffer pool, the shared state and both worker threads.
//! Control calls go through the manager lock, obtained as a [`ManagerGuard`]:
//!
//! ```text
//! let mut guard = manager.lock_with_timeout(Duration::from_millis(5))?;
//! guard.set_timeline(Some(timeline), 0);
//! let interval = guard.playback_interval(start);
//! drop(guard); // unlock; queued listener notifications fire here
//! ```
//!
//! The lock is not reentrant. Listener notifications queued by a guard are
//! delivered after the lock is released, so listeners may call back into the
//! manager. The worker threads never take the manager lock.

use super::allocator::HeapAllocator;
use super::buffer_pool::BufferPool;
use super::displayer::FrameDisplayer;
use super::generator::FrameGenerator;
use super::interfaces::{
    AudioPipeline, BufferAllocator, Compositor, PlaybackListener, PresentationSurface,
};
use super::listeners::ListenerSet;
use super::types::{PixelFormat, PlaybackInterval, Timeline};
use super::{Startup, WorkerContext};
use crate::clock::{Clock, ClockConfig};
use crate::config::EngineConfig;
use crate::error::{Error, PresentError, Result};
use crate::state::{
    DisplayedFrame, PipelineCounters, PipelineStats, PlaybackState, TimelineAssignment,
};
use parking_lot::{Mutex, MutexGuard};
use reel_common::PlayMode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long `init` waits for both workers to take their starting slots
const WORKER_START_TIMEOUT: Duration = Duration::from_secs(2);

/// Collaborators and settings for [`PlaybackManager::init`]
pub struct InitOptions {
    pub config: EngineConfig,
    pub compositor: Arc<dyn Compositor>,
    /// External party sharing the manager lock
    pub audio: Option<Arc<dyn AudioPipeline>>,
    /// Defaults to a [`HeapAllocator`] limited by `config.memory_budget`
    pub allocator: Option<Arc<dyn BufferAllocator>>,
}

impl InitOptions {
    pub fn new(config: EngineConfig, compositor: Arc<dyn Compositor>) -> Self {
        Self {
            config,
            compositor,
            audio: None,
            allocator: None,
        }
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioPipeline>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn BufferAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }
}

#[derive(Default)]
struct Workers {
    generator: Option<JoinHandle<()>>,
    displayer: Option<JoinHandle<()>>,
}

/// Facade over the real-time playback pipeline
pub struct PlaybackManager {
    control: Mutex<()>,
    ctx: WorkerContext,
    surface: Arc<dyn PresentationSurface>,
    audio: Option<Arc<dyn AudioPipeline>>,
    allocator: Arc<dyn BufferAllocator>,
    config: EngineConfig,
    workers: Mutex<Workers>,
    shut_down: AtomicBool,
}

impl PlaybackManager {
    /// Allocate buffers, start the clock and both worker threads
    ///
    /// Playback starts paused with no timeline. On error nothing is left
    /// running.
    pub fn init(
        surface: Arc<dyn PresentationSurface>,
        width: u32,
        height: u32,
        options: InitOptions,
    ) -> Result<Self> {
        let InitOptions {
            mut config,
            compositor,
            audio,
            allocator,
        } = options;
        config.normalize();

        let allocator: Arc<dyn BufferAllocator> = match allocator {
            Some(allocator) => allocator,
            None => {
                let heap = HeapAllocator::new();
                Arc::new(match config.memory_budget {
                    Some(budget) => heap.with_budget(budget),
                    None => heap,
                })
            }
        };

        let pool = Arc::new(BufferPool::allocate(
            allocator.as_ref(),
            &config.buffers,
            width,
            height,
        )?);

        let clock = match Clock::start(ClockConfig {
            tick_interval: config.tick_interval,
            start_timeout: config.clock_start_timeout,
        }) {
            Ok(clock) => Arc::new(clock),
            Err(e) => {
                pool.release_buffers(allocator.as_ref());
                return Err(e);
            }
        };
        clock.set_paused(true);

        let ctx = WorkerContext {
            clock,
            pool,
            state: Arc::new(PlaybackState::new(config.rate_scale())),
            listeners: Arc::new(ListenerSet::new()),
        };

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(2);
        let (go_tx, go_rx) = crossbeam_channel::bounded(2);

        let generator = FrameGenerator::new(
            ctx.clone(),
            compositor,
            config.pause_poll,
            config.frame_limit,
        )
        .spawn(Startup::new(ready_tx.clone(), go_rx.clone()));
        let generator = match generator {
            Ok(handle) => handle,
            Err(e) => {
                drop(go_tx);
                abort_start(&ctx, allocator.as_ref(), Vec::new());
                return Err(e);
            }
        };

        let displayer = FrameDisplayer::new(
            ctx.clone(),
            Arc::clone(&surface),
            config.pause_poll,
            config.late_tolerance,
        )
        .spawn(Startup::new(ready_tx, go_rx));
        let displayer = match displayer {
            Ok(handle) => handle,
            Err(e) => {
                drop(go_tx);
                abort_start(&ctx, allocator.as_ref(), vec![generator]);
                return Err(e);
            }
        };

        for _ in 0..2 {
            if ready_rx.recv_timeout(WORKER_START_TIMEOUT).is_err() {
                drop(go_tx);
                abort_start(&ctx, allocator.as_ref(), vec![generator, displayer]);
                return Err(Error::InvalidState(
                    "worker threads did not take their starting slots".to_string(),
                ));
            }
        }
        for _ in 0..2 {
            let _ = go_tx.send(());
        }

        info!(
            "Playback manager ready: {} {} buffers, {}x{}, {} rate",
            ctx.pool.len(),
            ctx.pool.format(),
            width,
            height,
            if config.full_rate { "full" } else { "half" }
        );

        Ok(Self {
            control: Mutex::new(()),
            ctx,
            surface,
            audio,
            allocator,
            config,
            workers: Mutex::new(Workers {
                generator: Some(generator),
                displayer: Some(displayer),
            }),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Take the manager lock, waiting as long as needed
    pub fn lock(&self) -> ManagerGuard<'_> {
        ManagerGuard::new(self, self.control.lock())
    }

    /// Take the manager lock or fail with `LockTimeout`
    pub fn lock_with_timeout(&self, timeout: Duration) -> Result<ManagerGuard<'_>> {
        self.control
            .try_lock_for(timeout)
            .map(|lock| ManagerGuard::new(self, lock))
            .ok_or(Error::LockTimeout(timeout))
    }

    /// See [`ManagerGuard::set_timeline`]
    pub fn set_timeline(
        &self,
        timeline: Option<Arc<dyn Timeline>>,
        start_frame_offset: u64,
    ) -> bool {
        self.lock().set_timeline(timeline, start_frame_offset)
    }

    pub fn start_playing(&self) -> Result<()> {
        self.lock().start_playing()
    }

    pub fn stop_playing(&self) -> Result<()> {
        self.lock().stop_playing()
    }

    /// Audio timing query under the manager lock
    pub fn playback_interval(&self, start: i64, timeout: Duration) -> Result<PlaybackInterval> {
        Ok(self.lock_with_timeout(timeout)?.playback_interval(start))
    }

    pub fn is_playing(&self) -> bool {
        !self.ctx.state.is_paused()
    }

    pub fn current_timeline(&self) -> Option<Arc<dyn Timeline>> {
        self.ctx.state.assignment().timeline
    }

    pub fn add_listener(&self, listener: Arc<dyn PlaybackListener>) {
        self.ctx.listeners.add(listener);
    }

    pub fn remove_listener<L: PlaybackListener + ?Sized>(&self, listener: &Arc<L>) -> bool {
        self.ctx.listeners.remove(listener)
    }

    pub fn stats(&self) -> PipelineStats {
        self.ctx.state.stats()
    }

    pub fn frame_count(&self) -> u64 {
        self.ctx.state.frame_count()
    }

    pub fn last_displayed(&self) -> Option<DisplayedFrame> {
        self.ctx.state.last_displayed()
    }

    pub fn hurry_up(&self) -> bool {
        self.ctx.state.hurry_up.load(Ordering::Acquire)
    }

    /// The presentation failure that stopped the displayer, if any
    pub fn last_error(&self) -> Option<PresentError> {
        self.ctx.state.last_error()
    }

    /// Both worker threads still alive
    pub fn is_running(&self) -> bool {
        self.is_generator_running() && self.is_displayer_running()
    }

    pub fn is_generator_running(&self) -> bool {
        alive(&self.workers.lock().generator)
    }

    pub fn is_displayer_running(&self) -> bool {
        alive(&self.workers.lock().displayer)
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.ctx.clock
    }

    pub fn buffer_count(&self) -> usize {
        self.ctx.pool.len()
    }

    pub fn buffer_format(&self) -> PixelFormat {
        self.ctx.pool.format()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop everything and release all resources
    ///
    /// Idempotent. With `disconnect_audio` the audio side's timeline is
    /// detached as well. Must not be called while holding a [`ManagerGuard`].
    pub fn shutdown(&self, disconnect_audio: bool) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Shutting down playback manager");

        self.ctx.state.paused.store(true, Ordering::Release);
        self.ctx.request_stop();

        let (generator, displayer) = {
            let mut workers = self.workers.lock();
            (workers.generator.take(), workers.displayer.take())
        };
        join_worker("generator", generator);
        join_worker("displayer", displayer);

        if let Some(audio) = &self.audio {
            audio.stop();
            if disconnect_audio {
                audio.set_timeline(None);
            }
        }

        self.ctx.pool.release_buffers(self.allocator.as_ref());
        self.ctx.clock.stop();
        self.surface.idle_clear();

        info!("Playback manager shut down");
        Ok(())
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(false) {
            warn!("Shutdown on drop failed: {}", e);
        }
    }
}

fn join_worker(name: &str, handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            warn!("Frame {} thread panicked", name);
        } else {
            debug!("Frame {} thread joined", name);
        }
    }
}

fn abort_start(ctx: &WorkerContext, allocator: &dyn BufferAllocator, handles: Vec<JoinHandle<()>>) {
    ctx.request_stop();
    for handle in handles {
        let _ = handle.join();
    }
    ctx.clock.stop();
    ctx.pool.release_buffers(allocator);
}

fn alive(handle: &Option<JoinHandle<()>>) -> bool {
    handle.as_ref().is_some_and(|h| !h.is_finished())
}

fn same_timeline(a: &Option<Arc<dyn Timeline>>, b: &Option<Arc<dyn Timeline>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
        _ => false,
    }
}

/// Holder of the manager lock; dropping it unlocks
pub struct ManagerGuard<'a> {
    manager: &'a PlaybackManager,
    lock: Option<MutexGuard<'a, ()>>,
    pending: Vec<PlayMode>,
}

impl<'a> ManagerGuard<'a> {
    fn new(manager: &'a PlaybackManager, lock: MutexGuard<'a, ()>) -> Self {
        Self {
            manager,
            lock: Some(lock),
            pending: Vec::new(),
        }
    }

    fn state(&self) -> &PlaybackState {
        &self.manager.ctx.state
    }

    fn clock(&self) -> &Clock {
        &self.manager.ctx.clock
    }

    fn unit_ticks(&self) -> i64 {
        self.clock().unit_ticks(self.state().frame_rate_scale)
    }

    pub fn is_playing(&self) -> bool {
        !self.state().is_paused()
    }

    pub fn current_timeline(&self) -> Option<Arc<dyn Timeline>> {
        self.state().assignment().timeline
    }

    /// Replace the played timeline without a visible jump
    ///
    /// The frame in flight is the switch point: its estimated display time
    /// becomes the new assignment's anchor and it shows `start_frame_offset`
    /// (reduced modulo the timeline's duration). Returns `false` (no-op) for
    /// the timeline already assigned, or while paused.
    pub fn set_timeline(
        &mut self,
        timeline: Option<Arc<dyn Timeline>>,
        start_frame_offset: u64,
    ) -> bool {
        let state = self.state();
        let current = state.assignment();
        if same_timeline(&current.timeline, &timeline) {
            debug!("set_timeline: timeline already assigned");
            return false;
        }
        if state.is_paused() {
            debug!("set_timeline: ignored while paused");
            return false;
        }

        let start_frame_offset = timeline
            .as_ref()
            .map_or(start_frame_offset, |t| start_frame_offset % t.duration_frames().max(1));

        let clock = self.clock();
        let sequence = state.frame_count();
        let display_time = state.estimated_display_real_time(clock, sequence);
        let switch_performance_time = clock.real_to_performance(display_time);

        info!(
            "Timeline switch to {} at sequence {} (offset {})",
            timeline.as_ref().map_or("<none>", |t| t.name()),
            sequence,
            start_frame_offset
        );
        state.set_assignment(TimelineAssignment {
            timeline: timeline.clone(),
            start_frame_offset,
            switch_performance_time,
            generation: current.generation + 1,
        });
        PipelineCounters::incr(&state.counters.timeline_switches);

        if let Some(audio) = &self.manager.audio {
            audio.set_timeline(timeline);
        }
        true
    }

    /// Timing answer for the audio side, starting at performance time `start`
    ///
    /// Covers one scheduling unit. Without a timeline, or while paused, the
    /// speed is 0 and the content range is empty.
    pub fn playback_interval(&self, start: i64) -> PlaybackInterval {
        let unit = self.unit_ticks();
        let end = start.saturating_add(unit);
        let assignment = self.state().assignment();

        match &assignment.timeline {
            Some(timeline) if !self.state().is_paused() => {
                // Content axis positions can exceed i64 for very long timelines
                let frames = i128::from(timeline.duration_frames().max(1));
                let span = (frames * i128::from(unit)).max(1);
                let elapsed = start
                    .saturating_sub(assignment.switch_performance_time)
                    .max(0);
                let offset = i128::from(assignment.start_frame_offset) * i128::from(unit);
                let position = (offset + i128::from(elapsed)).rem_euclid(span);
                let content_start = i64::try_from(position).unwrap_or(i64::MAX);
                PlaybackInterval {
                    end,
                    content_start,
                    content_end: content_start.saturating_add(end - start),
                    speed: 1.0,
                }
            }
            _ => PlaybackInterval {
                end,
                content_start: 0,
                content_end: 0,
                speed: 0.0,
            },
        }
    }

    /// Start (or resume) playback
    ///
    /// The first frame produced from now on is due `start_lead_units` units
    /// ahead. A resumed timeline continues after the last displayed frame.
    pub fn start_playing(&mut self) -> Result<()> {
        let manager = self.manager;
        let state = &manager.ctx.state;
        if state.is_quitting() {
            return Err(Error::InvalidState("playback manager is stopped".to_string()));
        }
        if !state.is_paused() {
            return Ok(());
        }

        let clock = &manager.ctx.clock;
        let unit = clock.unit_ticks(state.frame_rate_scale);
        let base = clock.performance_time() + unit * manager.config.start_lead_units as i64;
        state.performance_time_base.store(base, Ordering::Release);
        state
            .start_sequence
            .store(state.frame_count(), Ordering::Release);
        state.hurry_up.store(false, Ordering::Release);

        let current = state.assignment();
        if let Some(timeline) = &current.timeline {
            let resume_frame = state
                .last_displayed()
                .and_then(|d| d.timeline_frame)
                .map_or(current.start_frame_offset, |f| {
                    (f + 1) % timeline.duration_frames().max(1)
                });
            state.set_assignment(TimelineAssignment {
                timeline: current.timeline.clone(),
                start_frame_offset: resume_frame,
                switch_performance_time: base,
                generation: current.generation + 1,
            });
        }

        if let Some(audio) = &manager.audio {
            audio.start(base);
        }
        clock.set_paused(false);
        state.paused.store(false, Ordering::Release);
        self.pending.push(PlayMode::Playing);
        info!("Playback started at performance time {}", base);
        Ok(())
    }

    /// Pause playback (both workers idle, clock publication suspended)
    pub fn stop_playing(&mut self) -> Result<()> {
        let manager = self.manager;
        let state = &manager.ctx.state;
        if state.is_quitting() {
            return Err(Error::InvalidState("playback manager is stopped".to_string()));
        }
        if state.is_paused() {
            return Ok(());
        }

        if let Some(audio) = &manager.audio {
            audio.stop();
        }
        state.paused.store(true, Ordering::Release);
        manager.ctx.clock.set_paused(true);
        self.pending.push(PlayMode::Paused);
        info!("Playback paused");
        Ok(())
    }
}

impl Drop for ManagerGuard<'_> {
    fn drop(&mut self) {
        // Unlock first; listeners may take the lock again
        drop(self.lock.take());
        for mode in self.pending.drain(..) {
            self.manager.ctx.listeners.notify_play_mode_changed(mode);
        }
    }
}
