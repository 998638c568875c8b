//! Engine configuration
//!
//! `EngineConfig` is the validated runtime form of the `[engine]` and
//! `[buffers]` sections of the TOML file (see `reel_common::config`).
//!
//! **Validation rules:**
//! - `tick_interval_us` must be > 0
//! - buffer counts above 64 are clamped (warning); counts below 3 are kept and
//!   fail at pool allocation with `InsufficientBuffers`
//! - the preferred format must name a known pixel format
//! - unknown fallback format names are skipped when `ignore_missing_fallback`
//!   is set and rejected otherwise

use crate::error::{Error, Result};
use crate::playback::buffer_pool::MAX_BUFFERS;
use crate::playback::types::PixelFormat;
use reel_common::config::TomlConfig;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Presentation buffer pool request
#[derive(Debug, Clone, PartialEq)]
pub struct BufferConfig {
    /// Requested slot count
    pub count: usize,
    pub preferred_format: PixelFormat,
    /// Tried in order when the preferred format yields fewer than 3 buffers
    pub fallback_formats: Vec<PixelFormat>,
    /// Skip fallback formats the allocator does not support instead of failing
    pub ignore_missing_fallback: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            count: 4,
            preferred_format: PixelFormat::Rgba8,
            fallback_formats: vec![PixelFormat::Rgb565],
            ignore_missing_fallback: false,
        }
    }
}

/// Validated engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Nominal clock tick (one scheduling unit at full rate)
    pub tick_interval: Duration,
    /// Present every tick, or every second tick when false
    pub full_rate: bool,
    /// Lateness beyond which a frame is dropped; `None` means half a unit
    pub late_tolerance: Option<Duration>,
    pub pause_poll: Duration,
    pub clock_start_timeout: Duration,
    /// Generator idles after this many frames
    pub frame_limit: Option<u64>,
    /// Scheduling units between `start_playing` and the first deadline
    pub start_lead_units: u32,
    pub buffers: BufferConfig,
    /// Byte budget for the default heap allocator
    pub memory_budget: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_micros(16_667),
            full_rate: true,
            late_tolerance: None,
            pause_poll: Duration::from_millis(10),
            clock_start_timeout: Duration::from_secs(1),
            frame_limit: None,
            start_lead_units: 2,
            buffers: BufferConfig::default(),
            memory_budget: None,
        }
    }
}

impl EngineConfig {
    /// Build from a parsed TOML file
    pub fn from_toml(config: &TomlConfig) -> Result<Self> {
        let engine = &config.engine;
        let buffers = &config.buffers;

        if engine.tick_interval_us == 0 {
            return Err(Error::Config("tick_interval_us must be > 0".to_string()));
        }

        let preferred_format = buffers
            .preferred_format
            .parse::<PixelFormat>()
            .map_err(|e| Error::Config(format!("preferred_format: {}", e)))?;

        let mut fallback_formats = Vec::with_capacity(buffers.fallback_formats.len());
        for name in &buffers.fallback_formats {
            match name.parse::<PixelFormat>() {
                Ok(format) => fallback_formats.push(format),
                Err(e) if buffers.ignore_missing_fallback => {
                    warn!("Ignoring fallback format: {}", e);
                }
                Err(e) => return Err(Error::Config(format!("fallback_formats: {}", e))),
            }
        }

        let mut cfg = Self {
            tick_interval: Duration::from_micros(engine.tick_interval_us),
            full_rate: engine.full_rate,
            late_tolerance: engine.late_tolerance_ms.map(Duration::from_millis),
            pause_poll: Duration::from_millis(engine.pause_poll_ms),
            clock_start_timeout: Duration::from_millis(engine.clock_start_timeout_ms),
            frame_limit: engine.frame_limit,
            start_lead_units: engine.start_lead_units,
            buffers: BufferConfig {
                count: buffers.count,
                preferred_format,
                fallback_formats,
                ignore_missing_fallback: buffers.ignore_missing_fallback,
            },
            memory_budget: buffers
                .memory_budget_mb
                .map(|mb| (mb as usize).saturating_mul(1024 * 1024)),
        };
        cfg.normalize();
        Ok(cfg)
    }

    /// Load and validate a TOML file (missing file means defaults)
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml(&TomlConfig::load(path)?)
    }

    /// Clamp values that have a safe nearest setting
    pub fn normalize(&mut self) {
        if self.buffers.count > MAX_BUFFERS {
            warn!(
                "Buffer count {} exceeds maximum, clamping to {}",
                self.buffers.count, MAX_BUFFERS
            );
            self.buffers.count = MAX_BUFFERS;
        }
        if self.pause_poll.is_zero() {
            self.pause_poll = Duration::from_millis(1);
        }
        if self.clock_start_timeout.is_zero() {
            self.clock_start_timeout = Duration::from_millis(1);
        }
    }

    /// Clock ticks per scheduling unit (1 at full rate, 2 at half rate)
    pub fn rate_scale(&self) -> u32 {
        if self.full_rate {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let cfg = EngineConfig::from_toml(&TomlConfig::default()).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.rate_scale(), 1);
    }

    #[test]
    fn test_half_rate_scale() {
        let mut toml = TomlConfig::default();
        toml.engine.full_rate = false;
        assert_eq!(EngineConfig::from_toml(&toml).unwrap().rate_scale(), 2);
    }

    #[test]
    fn test_buffer_count_clamped_above_max() {
        let mut toml = TomlConfig::default();
        toml.buffers.count = 500;
        assert_eq!(EngineConfig::from_toml(&toml).unwrap().buffers.count, MAX_BUFFERS);
    }

    #[test]
    fn test_small_buffer_count_is_kept() {
        let mut toml = TomlConfig::default();
        toml.buffers.count = 2;
        assert_eq!(EngineConfig::from_toml(&toml).unwrap().buffers.count, 2);
    }

    #[test]
    fn test_unknown_fallback_format() {
        let mut toml = TomlConfig::default();
        toml.buffers.fallback_formats = vec!["yuv420".into(), "gray8".into()];
        assert!(matches!(
            EngineConfig::from_toml(&toml),
            Err(Error::Config(_))
        ));

        toml.buffers.ignore_missing_fallback = true;
        let cfg = EngineConfig::from_toml(&toml).unwrap();
        assert_eq!(cfg.buffers.fallback_formats, vec![PixelFormat::Gray8]);
    }

    #[test]
    fn test_invalid_preferred_format_and_tick() {
        let mut toml = TomlConfig::default();
        toml.buffers.preferred_format = "cmyk".into();
        assert!(EngineConfig::from_toml(&toml).is_err());

        let mut toml = TomlConfig::default();
        toml.engine.tick_interval_us = 0;
        assert!(EngineConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn test_memory_budget_in_bytes() {
        let mut toml = TomlConfig::default();
        toml.buffers.memory_budget_mb = Some(3);
        let cfg = EngineConfig::from_toml(&toml).unwrap();
        assert_eq!(cfg.memory_budget, Some(3 * 1024 * 1024));
    }
}
