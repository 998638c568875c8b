//! # Reel Video Playback Engine (reel-vp)
//!
//! Real-time frame scheduling for timeline ("playlist") playback.
//!
//! **Purpose:** Render a dynamic timeline into a rotating pool of presentation
//! buffers on a producer thread while a consumer thread hands finished buffers
//! to a display surface, paced by a drift-compensated clock. Timelines can be
//! hot-swapped with no visible discontinuity.
//!
//! **Architecture:** three OS threads (clock, generator, displayer) coordinated
//! by per-slot ownership handoff; no async runtime. Pixel work, audio output
//! and the display API stay behind the traits in [`playback::interfaces`].

pub mod clock;
pub mod config;
pub mod error;
pub mod playback;
pub mod sim;
pub mod state;

pub use clock::{Clock, ClockConfig, ClockSample};
pub use config::{BufferConfig, EngineConfig};
pub use error::{Error, Result};
pub use playback::interfaces::{
    AudioPipeline, BufferAllocator, Compositor, PlaybackListener, PresentationSurface,
};
pub use playback::manager::{InitOptions, ManagerGuard, PlaybackManager};
pub use playback::types::{
    FrameBuffer, PixelFormat, PlaybackInterval, RenderPass, SlotFrame, Timeline,
};
pub use state::PipelineStats;
