//! Tick-based performance time arithmetic
//!
//! Performance time is the logical clock axis shared by the video scheduler and
//! the audio side. It is represented as an `i64` tick count at 28,224,000 Hz,
//! a rate that divides evenly into every common audio sample rate and into the
//! common video frame rates (24, 25, 30, 50, 60 Hz).
//!
//! # Representations
//!
//! 1. **Ticks (performance axis)**: `i64` at 28,224,000 Hz
//! 2. **Durations (real time)**: `std::time::Duration` measured from a clock origin
//! 3. **Milliseconds**: `i64`, for configuration and log output
//!
//! # Examples
//!
//! ```rust
//! use reel_common::timing::*;
//! use std::time::Duration;
//!
//! assert_eq!(ms_to_ticks(1000), TICK_RATE);
//! assert_eq!(ticks_to_ms(ms_to_ticks(40)), 40);
//! assert_eq!(duration_to_ticks(Duration::from_millis(20)), ms_to_ticks(20));
//! ```
//!
//! # Precision and Overflow
//!
//! - i64::MAX ticks = ~10.36 years
//! - Duration conversions go through i128 so nanosecond inputs never overflow
//! - Negative tick values are legal for relative arithmetic; converting a
//!   negative tick count to a `Duration` saturates at zero

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Tick rate: 28,224,000 Hz
pub const TICK_RATE: i64 = 28_224_000;

/// Ticks per millisecond: 28,224
pub const TICKS_PER_MS: i64 = 28_224;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

// ============================================================================
// Core Conversion Functions
// ============================================================================

/// Convert milliseconds to ticks
///
/// ```rust
/// use reel_common::timing::ms_to_ticks;
///
/// assert_eq!(ms_to_ticks(0), 0);
/// assert_eq!(ms_to_ticks(1), 28_224);
/// assert_eq!(ms_to_ticks(-1000), -28_224_000);
/// ```
pub fn ms_to_ticks(milliseconds: i64) -> i64 {
    milliseconds * TICKS_PER_MS
}

/// Convert ticks to milliseconds (truncating division)
///
/// ```rust
/// use reel_common::timing::ticks_to_ms;
///
/// assert_eq!(ticks_to_ms(28_224), 1);
/// assert_eq!(ticks_to_ms(28_223), 0);
/// ```
pub fn ticks_to_ms(ticks: i64) -> i64 {
    ticks / TICKS_PER_MS
}

/// Convert a real-time duration to ticks (rounded to nearest tick)
pub fn duration_to_ticks(duration: Duration) -> i64 {
    let nanos = duration.as_nanos() as i128;
    let ticks = (nanos * TICK_RATE as i128 + NANOS_PER_SECOND / 2) / NANOS_PER_SECOND;
    ticks.min(i64::MAX as i128) as i64
}

/// Convert ticks to a real-time duration
///
/// Negative tick counts saturate to `Duration::ZERO`.
pub fn ticks_to_duration(ticks: i64) -> Duration {
    if ticks <= 0 {
        return Duration::ZERO;
    }
    let nanos = ticks as i128 * NANOS_PER_SECOND / TICK_RATE as i128;
    Duration::from_nanos(nanos.min(u64::MAX as i128) as u64)
}

/// Multiply a tick count by a floating-point factor, rounding to nearest tick
pub fn scale_ticks(ticks: i64, factor: f64) -> i64 {
    (ticks as f64 * factor).round() as i64
}
