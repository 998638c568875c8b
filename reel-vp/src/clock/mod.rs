//! Drift-compensated time source
//!
//! The clock maps wall-clock real time onto the performance time axis shared by
//! the video scheduler and the audio side. A background thread ticks at a
//! nominal interval; every tick it learns the *observed* tick duration and
//! recomputes a drift factor (`estimated / observed`) that converts real-time
//! spans into nominal (performance) spans:
//!
//! ```text
//! observed_tick   = (last_tick_real - first_tick_real) / tick_count
//! drift_factor    = estimated_tick / observed_tick
//! performance(t)  = seek_perf + ticks(t - seek_real) * drift_factor
//! time_per_unit   = (last_tick_real - first_tick_real) * scale / tick_count
//! ```
//!
//! One scheduling unit is one nominal tick, so a frame that is `n` units after
//! a performance-time base is due `n * time_per_unit` of real time later.
//!
//! **Thread Safety:** all state lives behind one mutex written only by the tick
//! thread (plus `seek`/`set_paused` from callers); readers take short snapshots.
//! The clock is shared as `Arc<Clock>`; there is no process-wide instance.

pub mod ticker;

pub use ticker::{IntervalTicker, SleepTicker, TickSource};

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use reel_common::timing::{duration_to_ticks, scale_ticks, ticks_to_duration};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Drift factors outside this range are treated as measurement noise
const DRIFT_FACTOR_MIN: f64 = 0.01;
const DRIFT_FACTOR_MAX: f64 = 100.0;

/// Clock start-up parameters
#[derive(Debug, Clone, Copy)]
pub struct ClockConfig {
    /// Nominal tick interval (the prior for the drift estimate)
    pub tick_interval: Duration,
    /// How long `start` waits for the first tick
    pub start_timeout: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_micros(16_667),
            start_timeout: Duration::from_secs(1),
        }
    }
}

/// One published (real time, performance time, drift factor) triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    /// Real time since the clock origin
    pub real_time: Duration,
    /// Performance time in ticks
    pub performance_time: i64,
    /// Current drift factor (estimated / observed tick duration)
    pub drift_factor: f64,
    /// Intervals observed since the first tick
    pub tick_count: u64,
}

/// Snapshot of the clock record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    pub first_tick_real_time: Duration,
    pub last_tick_real_time: Duration,
    pub last_tick_performance_time: i64,
    pub last_seek_real_time: Duration,
    pub last_seek_performance_time: i64,
    /// Intervals observed since the first tick (monotonic)
    pub tick_count: u64,
    pub estimated_tick_duration: Duration,
    /// Always finite and > 0
    pub drift_factor: f64,
    /// Publication suspended (ticking continues)
    pub paused: bool,
    /// Running on the sleep-loop fallback
    pub degraded: bool,
    started: bool,
}

impl ClockState {
    fn new(estimated_tick_duration: Duration) -> Self {
        Self {
            first_tick_real_time: Duration::ZERO,
            last_tick_real_time: Duration::ZERO,
            last_tick_performance_time: 0,
            last_seek_real_time: Duration::ZERO,
            last_seek_performance_time: 0,
            tick_count: 0,
            estimated_tick_duration,
            drift_factor: 1.0,
            paused: false,
            degraded: false,
            started: false,
        }
    }

    /// Fold one tick observed at `real_time` into the record
    fn record_tick(&mut self, real_time: Duration) -> ClockSample {
        if !self.started {
            self.started = true;
            self.first_tick_real_time = real_time;
            self.last_tick_real_time = real_time;
            self.last_seek_real_time = real_time;
            self.last_tick_performance_time = self.last_seek_performance_time;
            return self.sample();
        }

        self.tick_count += 1;
        self.last_tick_real_time = real_time;

        let elapsed = real_time.saturating_sub(self.first_tick_real_time);
        let observed_tick = elapsed.as_secs_f64() / self.tick_count as f64;
        if observed_tick > 0.0 {
            let drift = self.estimated_tick_duration.as_secs_f64() / observed_tick;
            if drift.is_finite() {
                self.drift_factor = drift.clamp(DRIFT_FACTOR_MIN, DRIFT_FACTOR_MAX);
            }
        }

        let since_seek = signed_ticks(real_time, self.last_seek_real_time);
        let extrapolated =
            self.last_seek_performance_time + scale_ticks(since_seek, self.drift_factor);
        // A shrinking drift factor must not pull performance time backwards
        self.last_tick_performance_time = extrapolated.max(self.last_tick_performance_time);

        self.sample()
    }

    fn sample(&self) -> ClockSample {
        ClockSample {
            real_time: self.last_tick_real_time,
            performance_time: self.last_tick_performance_time,
            drift_factor: self.drift_factor,
            tick_count: self.tick_count,
        }
    }

    /// Performance time at an arbitrary real time, extrapolated from the last tick
    pub fn real_to_performance(&self, real_time: Duration) -> i64 {
        let delta = signed_ticks(real_time, self.last_tick_real_time);
        self.last_tick_performance_time + scale_ticks(delta, self.drift_factor)
    }

    /// Real time at which the clock reaches `performance_time`
    ///
    /// Saturates at the clock origin for performance times before it.
    pub fn performance_to_real(&self, performance_time: i64) -> Duration {
        let delta = performance_time - self.last_tick_performance_time;
        let real_delta = scale_ticks(delta, 1.0 / self.drift_factor);
        if real_delta >= 0 {
            self.last_tick_real_time + ticks_to_duration(real_delta)
        } else {
            self.last_tick_real_time
                .saturating_sub(ticks_to_duration(real_delta.saturating_neg()))
        }
    }

    /// Learned real duration of one scheduling unit (`scale` ticks)
    pub fn time_per_unit(&self, scale: u32) -> Duration {
        if self.tick_count == 0 {
            return self.estimated_tick_duration * scale;
        }
        let span = self
            .last_tick_real_time
            .saturating_sub(self.first_tick_real_time);
        let nanos = span.as_nanos() * scale as u128 / self.tick_count as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

/// `a - b` in ticks, signed
fn signed_ticks(a: Duration, b: Duration) -> i64 {
    if a >= b {
        duration_to_ticks(a - b)
    } else {
        -duration_to_ticks(b - a)
    }
}

struct ClockShared {
    origin: Instant,
    state: Mutex<ClockState>,
    stop: AtomicBool,
    subscribers: Mutex<Vec<Sender<ClockSample>>>,
}

impl ClockShared {
    fn publish(&self, sample: ClockSample) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(sample) {
            Ok(()) => true,
            // Slow consumer: drop this sample, keep the subscription
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// Drift-compensated clock with its own tick thread
pub struct Clock {
    shared: Arc<ClockShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Clock {
    /// Start the clock on an [`IntervalTicker`]
    ///
    /// Blocks until the first tick has been observed.
    pub fn start(config: ClockConfig) -> Result<Self> {
        let primary = IntervalTicker::new(config.tick_interval)
            .map(|t| Box::new(t) as Box<dyn TickSource>);
        Self::start_with_source(config, primary)
    }

    /// Start the clock on a caller-provided tick source
    ///
    /// `None` means the periodic primitive is unavailable; the clock degrades to
    /// a sleep loop at the nominal interval instead of failing. Failing to spawn
    /// the thread, or the first tick not arriving within `start_timeout`, is a
    /// `ClockInit` error.
    pub fn start_with_source(
        config: ClockConfig,
        primary: Option<Box<dyn TickSource>>,
    ) -> Result<Self> {
        let mut state = ClockState::new(config.tick_interval);
        let source: Box<dyn TickSource> = match primary {
            Some(source) => source,
            None => {
                warn!(
                    "Periodic tick source unavailable, degrading to {:?} sleep loop",
                    config.tick_interval
                );
                state.degraded = true;
                Box::new(SleepTicker::new(config.tick_interval))
            }
        };

        let shared = Arc::new(ClockShared {
            origin: Instant::now(),
            state: Mutex::new(state),
            stop: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        });

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("reel-clock".to_string())
            .spawn(move || tick_loop(thread_shared, source, ready_tx))
            .map_err(|e| Error::ClockInit(format!("failed to spawn clock thread: {}", e)))?;

        if ready_rx.recv_timeout(config.start_timeout).is_err() {
            shared.stop.store(true, Ordering::Release);
            let _ = handle.join();
            return Err(Error::ClockInit(format!(
                "no tick observed within {:?}",
                config.start_timeout
            )));
        }

        info!(
            "Clock started: estimated tick {:?}",
            config.tick_interval
        );

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Real time since the clock origin
    pub fn now(&self) -> Duration {
        self.shared.origin.elapsed()
    }

    /// Copy of the clock record
    pub fn snapshot(&self) -> ClockState {
        *self.shared.state.lock()
    }

    /// Performance time right now
    pub fn performance_time(&self) -> i64 {
        let now = self.now();
        self.shared.state.lock().real_to_performance(now)
    }

    pub fn real_to_performance(&self, real_time: Duration) -> i64 {
        self.shared.state.lock().real_to_performance(real_time)
    }

    pub fn performance_to_real(&self, performance_time: i64) -> Duration {
        self.shared.state.lock().performance_to_real(performance_time)
    }

    /// Learned real duration of one scheduling unit of `scale` ticks
    pub fn time_per_unit(&self, scale: u32) -> Duration {
        self.shared.state.lock().time_per_unit(scale)
    }

    /// Nominal length of one scheduling unit on the performance axis
    pub fn unit_ticks(&self, scale: u32) -> i64 {
        let estimated = self.shared.state.lock().estimated_tick_duration;
        duration_to_ticks(estimated) * scale.max(1) as i64
    }

    pub fn drift_factor(&self) -> f64 {
        self.shared.state.lock().drift_factor
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.state.lock().tick_count
    }

    /// Running on the sleep-loop fallback
    pub fn is_degraded(&self) -> bool {
        self.shared.state.lock().degraded
    }

    /// Re-anchor performance time so that "now" maps to `performance_time`
    ///
    /// Drift learning (`tick_count`, first tick) is preserved across seeks.
    pub fn seek(&self, performance_time: i64) {
        let now = self.now();
        let mut state = self.shared.state.lock();
        state.last_seek_real_time = now;
        state.last_seek_performance_time = performance_time;
        // Keep the between-tick extrapolation consistent with the new anchor
        let since_tick = signed_ticks(now, state.last_tick_real_time);
        state.last_tick_performance_time =
            performance_time - scale_ticks(since_tick, state.drift_factor);
        debug!("Clock seek to performance time {}", performance_time);
    }

    /// Suspend or resume publication to subscribers (ticking continues)
    pub fn set_paused(&self, paused: bool) {
        self.shared.state.lock().paused = paused;
    }

    /// Register a consumer of published clock samples
    ///
    /// Publication never blocks the tick thread: a full receiver misses samples,
    /// a dropped receiver is unsubscribed on the next tick.
    pub fn subscribe(&self, capacity: usize) -> Receiver<ClockSample> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Stop the tick thread and wait for it to exit
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!("Clock thread panicked during shutdown");
            }
            debug!("Clock thread joined");
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("state", &*self.shared.state.lock())
            .finish()
    }
}

fn tick_loop(shared: Arc<ClockShared>, mut source: Box<dyn TickSource>, ready: Sender<()>) {
    debug!("Clock thread started ({} source)", source.name());
    let mut ready = Some(ready);

    while !shared.stop.load(Ordering::Acquire) {
        if !source.wait_tick() {
            warn!(
                "Tick source '{}' stopped delivering, degrading to sleep loop",
                source.name()
            );
            source = Box::new(SleepTicker::new(source.nominal_interval()));
            shared.state.lock().degraded = true;
            continue;
        }
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        let real_time = shared.origin.elapsed();
        let (sample, paused) = {
            let mut state = shared.state.lock();
            let sample = state.record_tick(real_time);
            (sample, state.paused)
        };
        trace!(
            "tick {} real={:?} perf={} drift={:.5}",
            sample.tick_count,
            sample.real_time,
            sample.performance_time,
            sample.drift_factor
        );

        if let Some(tx) = ready.take() {
            let _ = tx.send(());
        }
        if !paused {
            shared.publish(sample);
        }
    }

    debug!("Clock thread exiting");
}
