//! Collaborators with test-specific behaviour

use parking_lot::Mutex;
use reel_vp::error::RenderError;
use reel_vp::sim::TestPatternCompositor;
use reel_vp::{Compositor, FrameBuffer, PlaybackListener, PlaybackManager, RenderPass, Timeline};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Compositor that takes `delay` per render
pub struct SlowCompositor {
    pub inner: TestPatternCompositor,
    pub delay: Duration,
}

impl SlowCompositor {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: TestPatternCompositor::new(),
            delay,
        }
    }
}

impl Compositor for SlowCompositor {
    fn render(
        &self,
        timeline: &dyn Timeline,
        frame: u64,
        target: &mut FrameBuffer,
        pass: RenderPass,
    ) -> Result<(), RenderError> {
        std::thread::sleep(self.delay);
        self.inner.render(timeline, frame, target, pass)
    }
}

/// Compositor that stalls once, on the first frame at or past `stall_frame`,
/// and records every pass it is asked for
pub struct StallingCompositor {
    inner: TestPatternCompositor,
    stall_frame: u64,
    stall: Duration,
    stalled: AtomicBool,
    passes: Mutex<Vec<(u64, RenderPass)>>,
}

impl StallingCompositor {
    pub fn new(stall_frame: u64, stall: Duration) -> Self {
        Self {
            inner: TestPatternCompositor::new(),
            stall_frame,
            stall,
            stalled: AtomicBool::new(false),
            passes: Mutex::new(Vec::new()),
        }
    }

    pub fn has_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    /// (timeline frame, pass) per render call, in call order
    pub fn passes(&self) -> Vec<(u64, RenderPass)> {
        self.passes.lock().clone()
    }
}

impl Compositor for StallingCompositor {
    fn render(
        &self,
        timeline: &dyn Timeline,
        frame: u64,
        target: &mut FrameBuffer,
        pass: RenderPass,
    ) -> Result<(), RenderError> {
        self.passes.lock().push((frame, pass));
        if frame >= self.stall_frame && !self.has_stalled() {
            std::thread::sleep(self.stall);
            self.stalled.store(true, Ordering::Release);
        }
        self.inner.render(timeline, frame, target, pass)
    }
}

/// Listener that holds the generator once, right after the stalled render,
/// until the displayer has dropped that frame and raised `hurry_up`
///
/// Makes "the render after a drop" a well-defined render. Holds the manager
/// weakly, like [`QueuedSwitch`].
pub struct DropGate {
    manager: Mutex<Weak<PlaybackManager>>,
    compositor: Arc<StallingCompositor>,
    drops_before_stall: AtomicU64,
    opened: AtomicBool,
}

impl DropGate {
    pub fn new(manager: &Arc<PlaybackManager>, compositor: Arc<StallingCompositor>) -> Self {
        Self {
            manager: Mutex::new(Arc::downgrade(manager)),
            compositor,
            drops_before_stall: AtomicU64::new(0),
            opened: AtomicBool::new(false),
        }
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }
}

impl PlaybackListener for DropGate {
    fn on_current_frame_changed(&self, _frame: u64) {
        let Some(manager) = self.manager.lock().upgrade() else {
            return;
        };
        if !self.compositor.has_stalled() {
            self.drops_before_stall
                .store(manager.stats().frames_dropped, Ordering::Release);
            return;
        }
        if self.opened.swap(true, Ordering::AcqRel) {
            return;
        }
        let before = self.drops_before_stall.load(Ordering::Acquire);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if manager.hurry_up() && manager.stats().frames_dropped > before {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Listener that performs a queued timeline switch when the generator asks
///
/// Holds the manager weakly; the test must shut the manager down before
/// dropping its last handle.
pub struct QueuedSwitch {
    manager: Mutex<Weak<PlaybackManager>>,
    pending: Mutex<Option<(Arc<dyn Timeline>, u64)>>,
}

impl QueuedSwitch {
    pub fn new(manager: &Arc<PlaybackManager>) -> Self {
        Self {
            manager: Mutex::new(Arc::downgrade(manager)),
            pending: Mutex::new(None),
        }
    }

    pub fn queue(&self, timeline: Arc<dyn Timeline>, start_frame_offset: u64) {
        *self.pending.lock() = Some((timeline, start_frame_offset));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl PlaybackListener for QueuedSwitch {
    fn on_check_pending_timeline_switch(&self) {
        let Some(manager) = self.manager.lock().upgrade() else {
            return;
        };
        let Some((timeline, offset)) = self.pending.lock().take() else {
            return;
        };
        manager.set_timeline(Some(timeline), offset);
    }
}
