//! Tick sources driving the clock thread
//!
//! The clock consumes ticks from a [`TickSource`]. The preferred source is an
//! [`IntervalTicker`], which schedules ticks on absolute deadlines so sleep
//! overshoot never accumulates. When no periodic source is available (or one
//! stops delivering ticks) the clock degrades to a [`SleepTicker`], a plain
//! fixed-interval sleep loop whose period is only an estimate.

use std::time::{Duration, Instant};

/// Source of periodic ticks for the clock thread
pub trait TickSource: Send {
    /// Block until the next tick
    ///
    /// Returns `false` when the source can no longer deliver ticks; the clock
    /// then falls back to a sleep loop.
    fn wait_tick(&mut self) -> bool;

    /// Nominal interval between ticks
    fn nominal_interval(&self) -> Duration;

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Periodic ticker on absolute deadlines
///
/// If the thread falls behind by more than one interval the missed ticks are
/// skipped (the next deadline is re-anchored) rather than delivered in a burst.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl IntervalTicker {
    /// Returns `None` for a zero interval, which no periodic source can honour
    pub fn new(interval: Duration) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }
        Some(Self {
            interval,
            next_deadline: None,
        })
    }
}

impl TickSource for IntervalTicker {
    fn wait_tick(&mut self) -> bool {
        let now = Instant::now();
        let deadline = match self.next_deadline {
            // First tick fires immediately
            None => now,
            Some(deadline) => deadline,
        };

        if deadline > now {
            std::thread::sleep(deadline - now);
        }

        let fired = Instant::now();
        let mut next = deadline + self.interval;
        if next <= fired {
            // Fell behind: skip the missed ticks
            next = fired + self.interval;
        }
        self.next_deadline = Some(next);
        true
    }

    fn nominal_interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &'static str {
        "interval"
    }
}

/// Fallback ticker: sleeps a fixed interval between ticks
///
/// Sleep overshoot accumulates, which is exactly what the clock's drift factor
/// learns and compensates for.
#[derive(Debug)]
pub struct SleepTicker {
    interval: Duration,
    first: bool,
}

impl SleepTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            // A zero interval would spin; one millisecond is the floor
            interval: interval.max(Duration::from_millis(1)),
            first: true,
        }
    }
}

impl TickSource for SleepTicker {
    fn wait_tick(&mut self) -> bool {
        if self.first {
            self.first = false;
        } else {
            std::thread::sleep(self.interval);
        }
        true
    }

    fn nominal_interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &'static str {
        "sleep"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_ticker_rejects_zero_interval() {
        assert!(IntervalTicker::new(Duration::ZERO).is_none());
        assert!(IntervalTicker::new(Duration::from_millis(5)).is_some());
    }

    #[test]
    fn test_interval_ticker_first_tick_is_immediate() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(200)).unwrap();
        let start = Instant::now();
        assert!(ticker.wait_tick());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_interval_ticker_paces_ticks() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(5)).unwrap();
        let start = Instant::now();
        for _ in 0..5 {
            assert!(ticker.wait_tick());
        }
        // First tick immediate, then four intervals
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_ticker_floor() {
        let ticker = SleepTicker::new(Duration::ZERO);
        assert_eq!(ticker.nominal_interval(), Duration::from_millis(1));
        assert_eq!(ticker.name(), "sleep");
    }
}
