//! Collaborator traits at the engine boundary
//!
//! The engine never renders pixels, mixes audio, or talks to a display API
//! itself. Those jobs belong to the implementations of these traits, shared
//! with the engine as `Arc<dyn Trait>`.

use super::types::{FrameBuffer, PixelFormat, RenderPass, SlotFrame, Timeline};
use crate::error::{AllocError, PresentError, RenderError};
use reel_common::PlayMode;
use std::sync::Arc;

/// Renders timeline content into presentation buffers (generator thread)
pub trait Compositor: Send + Sync {
    fn render(
        &self,
        timeline: &dyn Timeline,
        frame: u64,
        target: &mut FrameBuffer,
        pass: RenderPass,
    ) -> Result<(), RenderError>;
}

/// Puts finished buffers on screen (displayer thread)
pub trait PresentationSurface: Send + Sync {
    /// Show `buffer`; any error stops the displayer
    fn present(&self, buffer: &FrameBuffer, frame: SlotFrame) -> Result<(), PresentError>;

    /// Blank the surface after shutdown
    fn idle_clear(&self);
}

/// External audio side sharing the manager lock
///
/// Calls arrive with the manager lock held; implementations must not call
/// back into the manager from them.
pub trait AudioPipeline: Send + Sync {
    /// Begin output with performance time `performance_time_base` as origin
    fn start(&self, performance_time_base: i64);

    fn stop(&self);

    /// Follow the video side's timeline (`None` detaches)
    fn set_timeline(&self, timeline: Option<Arc<dyn Timeline>>);
}

/// Produces presentation buffers for the pool
pub trait BufferAllocator: Send + Sync {
    fn allocate(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<FrameBuffer, AllocError>;

    /// Return a buffer obtained from `allocate`
    fn release(&self, buffer: FrameBuffer) {
        drop(buffer);
    }
}

/// Observer of playback progress
///
/// Callbacks run synchronously on the notifying thread with no engine lock
/// held; they may call back into the manager. All methods default to no-ops.
pub trait PlaybackListener: Send + Sync {
    fn on_play_mode_changed(&self, _mode: PlayMode) {}

    /// Called by the generator for every timeline frame it renders
    fn on_current_frame_changed(&self, _frame: u64) {}

    /// Called by the generator while no timeline is assigned
    fn on_check_pending_timeline_switch(&self) {}
}
