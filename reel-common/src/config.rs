//! Configuration loading and config file resolution
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`REEL_CONFIG`)
//! 3. Platform config file (`<config_dir>/reel/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing or unreadable file is never fatal: a warning is logged and the
//! compiled defaults are used. A file that exists but does not parse is a
//! configuration error, since silently ignoring a typo'd setting would be worse.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "REEL_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub engine: EngineSection,
    pub buffers: BufferSection,
    pub logging: LoggingConfig,
}

/// `[engine]` section: scheduling and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Nominal clock tick interval in microseconds (one scheduling unit)
    pub tick_interval_us: u64,
    /// Present every tick (true) or every second tick (false)
    pub full_rate: bool,
    /// How late a frame may be before it is dropped; defaults to half a unit
    pub late_tolerance_ms: Option<u64>,
    /// Poll interval while paused
    pub pause_poll_ms: u64,
    /// How long clock start-up may wait for its first tick
    pub clock_start_timeout_ms: u64,
    /// Stop generating after this many frames (bounded runs)
    pub frame_limit: Option<u64>,
    /// Scheduling units between `start_playing` and the first frame deadline
    pub start_lead_units: u32,
    /// Presentation buffer width in pixels
    pub width: u32,
    /// Presentation buffer height in pixels
    pub height: u32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_interval_us: 16_667,
            full_rate: true,
            late_tolerance_ms: None,
            pause_poll_ms: 10,
            clock_start_timeout_ms: 1000,
            frame_limit: None,
            start_lead_units: 2,
            width: 640,
            height: 360,
        }
    }
}

/// `[buffers]` section: presentation buffer pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSection {
    /// Requested number of presentation buffers (3..=64)
    pub count: usize,
    /// Preferred pixel format name
    pub preferred_format: String,
    /// Fallback pixel format names, tried in order
    pub fallback_formats: Vec<String>,
    /// Skip fallback formats the allocator does not support instead of failing
    pub ignore_missing_fallback: bool,
    /// Optional memory budget for the default heap allocator (MiB)
    pub memory_budget_mb: Option<u64>,
}

impl Default for BufferSection {
    fn default() -> Self {
        Self {
            count: 4,
            preferred_format: "rgba8".to_string(),
            fallback_formats: vec!["rgb565".to_string()],
            ignore_missing_fallback: false,
            memory_budget_mb: None,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a file
    ///
    /// Missing or unreadable files fall back to defaults with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!("Loading config from {}", path.display());
                Self::from_toml_str(&text)
            }
            Err(e) => {
                warn!(
                    "Config file {} not readable ({}), using compiled defaults",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Serialize configuration back to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Resolves which config file (if any) should be loaded
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    app_name: String,
    env_var: String,
}

impl ConfigResolver {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            env_var: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Use a different environment variable than `REEL_CONFIG`
    pub fn with_env_var(mut self, env_var: &str) -> Self {
        self.env_var = env_var.to_string();
        self
    }

    /// Resolve the config file path following the priority order
    ///
    /// Returns `None` when no candidate exists (compiled defaults apply).
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config file
        self.platform_config_file().filter(|p| p.exists())
    }

    /// Resolve and load, falling back to compiled defaults
    pub fn load(&self, cli_arg: Option<&Path>) -> Result<TomlConfig> {
        match self.resolve(cli_arg) {
            Some(path) => TomlConfig::load(&path),
            None => {
                debug!("No config file found for {}, using compiled defaults", self.app_name);
                Ok(TomlConfig::default())
            }
        }
    }

    /// Platform config file location, e.g. `~/.config/reel/config.toml`
    pub fn platform_config_file(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(&self.app_name).join("config.toml"))
    }
}
