//! Reference collaborators
//!
//! Minimal implementations of the collaborator traits that drive the engine
//! without a real display, compositor or audio device. Used by the `reel-vp`
//! binary and by the tests.

use crate::error::{PresentError, RenderError};
use crate::playback::interfaces::{AudioPipeline, Compositor, PlaybackListener, PresentationSurface};
use crate::playback::types::{FrameBuffer, RenderPass, SlotFrame, Timeline};
use parking_lot::Mutex;
use reel_common::events::PlaybackEvent;
use reel_common::PlayMode;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Timeline of a fixed number of frames that loops forever
#[derive(Debug, Clone)]
pub struct LoopingTimeline {
    id: Uuid,
    name: String,
    duration_frames: u64,
}

impl LoopingTimeline {
    pub fn new(name: impl Into<String>, duration_frames: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            duration_frames,
        }
    }

    /// Same, ready to hand to the manager
    pub fn shared(name: impl Into<String>, duration_frames: u64) -> Arc<dyn Timeline> {
        Arc::new(Self::new(name, duration_frames))
    }
}

impl Timeline for LoopingTimeline {
    fn id(&self) -> Uuid {
        self.id
    }

    fn duration_frames(&self) -> u64 {
        self.duration_frames
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fills each frame with a colour derived from the frame number
///
/// A full pass fills the whole buffer; a minimal pass only repaints row 0.
/// Frames listed in `fail_frames` report a render error instead.
#[derive(Debug, Default)]
pub struct TestPatternCompositor {
    fail_frames: HashSet<u64>,
    full_passes: AtomicU64,
    minimal_passes: AtomicU64,
}

impl TestPatternCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a render error for `frame`
    pub fn failing_on(mut self, frame: u64) -> Self {
        self.fail_frames.insert(frame);
        self
    }

    pub fn full_passes(&self) -> u64 {
        self.full_passes.load(Ordering::Relaxed)
    }

    pub fn minimal_passes(&self) -> u64 {
        self.minimal_passes.load(Ordering::Relaxed)
    }

    /// Colour used for `frame`
    pub fn color_for(frame: u64) -> [u8; 4] {
        let f = frame as u8;
        [f, f.wrapping_mul(3), f.wrapping_mul(7), 255]
    }
}

impl Compositor for TestPatternCompositor {
    fn render(
        &self,
        timeline: &dyn Timeline,
        frame: u64,
        target: &mut FrameBuffer,
        pass: RenderPass,
    ) -> Result<(), RenderError> {
        if self.fail_frames.contains(&frame) {
            return Err(RenderError::new(
                frame,
                format!("test pattern refused frame of '{}'", timeline.name()),
            ));
        }
        let color = Self::color_for(frame);
        match pass {
            RenderPass::Full => {
                target.fill(color);
                self.full_passes.fetch_add(1, Ordering::Relaxed);
            }
            RenderPass::Minimal => {
                target.fill_row(0, color);
                self.minimal_passes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

/// Surface that records every presented frame
///
/// With `failing_after(n)` the (n+1)-th present reports `SurfaceLost`.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    presented: Mutex<Vec<SlotFrame>>,
    fail_after: Option<usize>,
    idle_clears: AtomicUsize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(presents: usize) -> Self {
        Self {
            fail_after: Some(presents),
            ..Self::default()
        }
    }

    pub fn presented(&self) -> Vec<SlotFrame> {
        self.presented.lock().clone()
    }

    pub fn presented_count(&self) -> usize {
        self.presented.lock().len()
    }

    pub fn idle_clears(&self) -> usize {
        self.idle_clears.load(Ordering::Relaxed)
    }
}

impl PresentationSurface for RecordingSurface {
    fn present(&self, _buffer: &FrameBuffer, frame: SlotFrame) -> Result<(), PresentError> {
        let mut presented = self.presented.lock();
        if self.fail_after.is_some_and(|n| presented.len() >= n) {
            return Err(PresentError::SurfaceLost("recording surface closed".to_string()));
        }
        presented.push(frame);
        Ok(())
    }

    fn idle_clear(&self) {
        self.idle_clears.fetch_add(1, Ordering::Relaxed);
    }
}

/// Audio call as seen by [`NullAudio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCall {
    Start(i64),
    Stop,
    SetTimeline(Option<Uuid>),
}

/// Audio pipeline that only records what it was asked to do
#[derive(Debug, Default)]
pub struct NullAudio {
    calls: Mutex<Vec<AudioCall>>,
}

impl NullAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AudioCall> {
        self.calls.lock().clone()
    }
}

impl AudioPipeline for NullAudio {
    fn start(&self, performance_time_base: i64) {
        self.calls.lock().push(AudioCall::Start(performance_time_base));
    }

    fn stop(&self) {
        self.calls.lock().push(AudioCall::Stop);
    }

    fn set_timeline(&self, timeline: Option<Arc<dyn Timeline>>) {
        self.calls
            .lock()
            .push(AudioCall::SetTimeline(timeline.map(|t| t.id())));
    }
}

/// Listener that records every notification as a [`PlaybackEvent`]
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<PlaybackEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().clone()
    }

    /// Timeline frames reported through `on_current_frame_changed`
    pub fn frames(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::CurrentFrameChanged { frame } => Some(*frame),
                _ => None,
            })
            .collect()
    }

    pub fn play_modes(&self) -> Vec<PlayMode> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::PlayModeChanged { mode } => Some(*mode),
                _ => None,
            })
            .collect()
    }
}

impl PlaybackListener for EventRecorder {
    fn on_play_mode_changed(&self, mode: PlayMode) {
        self.events.lock().push(PlaybackEvent::PlayModeChanged { mode });
    }

    fn on_current_frame_changed(&self, frame: u64) {
        self.events
            .lock()
            .push(PlaybackEvent::CurrentFrameChanged { frame });
    }

    fn on_check_pending_timeline_switch(&self) {
        let mut events = self.events.lock();
        // Asked once per blank frame; one record per run of requests
        if events.last() != Some(&PlaybackEvent::CheckPendingTimelineSwitch) {
            events.push(PlaybackEvent::CheckPendingTimelineSwitch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::types::PixelFormat;

    #[test]
    fn test_compositor_passes() {
        let compositor = TestPatternCompositor::new().failing_on(9);
        let timeline = LoopingTimeline::new("pattern", 10);
        let mut buffer = FrameBuffer::new(PixelFormat::Rgba8, 2, 2);

        compositor
            .render(&timeline, 2, &mut buffer, RenderPass::Full)
            .unwrap();
        assert_eq!(buffer.pixel(1, 1).unwrap(), &TestPatternCompositor::color_for(2));

        compositor
            .render(&timeline, 3, &mut buffer, RenderPass::Minimal)
            .unwrap();
        assert_eq!(buffer.pixel(0, 0).unwrap(), &TestPatternCompositor::color_for(3));
        assert_eq!(buffer.pixel(1, 1).unwrap(), &TestPatternCompositor::color_for(2));

        assert!(compositor
            .render(&timeline, 9, &mut buffer, RenderPass::Full)
            .is_err());
        assert_eq!(compositor.full_passes(), 1);
        assert_eq!(compositor.minimal_passes(), 1);
    }

    #[test]
    fn test_surface_failure_injection() {
        let surface = RecordingSurface::failing_after(1);
        let buffer = FrameBuffer::new(PixelFormat::Gray8, 1, 1);
        let frame = SlotFrame {
            sequence: 0,
            timeline_frame: None,
            performance_time: 0,
        };
        assert!(surface.present(&buffer, frame).is_ok());
        assert!(matches!(
            surface.present(&buffer, frame),
            Err(PresentError::SurfaceLost(_))
        ));
        assert_eq!(surface.presented_count(), 1);
    }

    #[test]
    fn test_event_recorder_collapses_switch_checks() {
        let recorder = EventRecorder::new();
        recorder.on_check_pending_timeline_switch();
        recorder.on_check_pending_timeline_switch();
        recorder.on_current_frame_changed(4);
        recorder.on_play_mode_changed(PlayMode::Playing);
        assert_eq!(recorder.events().len(), 3);
        assert_eq!(recorder.frames(), vec![4]);
        assert_eq!(recorder.play_modes(), vec![PlayMode::Playing]);
    }
}
