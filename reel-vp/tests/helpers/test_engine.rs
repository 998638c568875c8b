//! Programmatic engine start-up for integration tests

use reel_vp::sim::{EventRecorder, NullAudio, RecordingSurface, TestPatternCompositor};
use reel_vp::{Compositor, EngineConfig, InitOptions, PlaybackManager, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock tick used by the tests (one scheduling unit at full rate)
pub const TEST_TICK: Duration = Duration::from_millis(5);

/// Engine settings tuned for quick, load-tolerant test runs
///
/// The late tolerance is generous so an overloaded test machine does not drop
/// frames unless a test asks for it.
pub fn fast_config(buffers: usize) -> EngineConfig {
    let mut config = EngineConfig {
        tick_interval: TEST_TICK,
        late_tolerance: Some(Duration::from_millis(250)),
        pause_poll: Duration::from_millis(1),
        clock_start_timeout: Duration::from_secs(2),
        ..EngineConfig::default()
    };
    config.buffers.count = buffers;
    config
}

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Manager plus the recording collaborators it was started with
pub struct TestEngine {
    pub manager: Arc<PlaybackManager>,
    pub surface: Arc<RecordingSurface>,
    pub audio: Arc<NullAudio>,
    pub recorder: Arc<EventRecorder>,
}

impl TestEngine {
    pub fn start(config: EngineConfig) -> Result<Self> {
        Self::start_with(config, Arc::new(TestPatternCompositor::new()), RecordingSurface::new())
    }

    pub fn start_with(
        config: EngineConfig,
        compositor: Arc<dyn Compositor>,
        surface: RecordingSurface,
    ) -> Result<Self> {
        let surface = Arc::new(surface);
        let audio = Arc::new(NullAudio::new());
        let recorder = Arc::new(EventRecorder::new());

        let manager = PlaybackManager::init(
            surface.clone(),
            32,
            18,
            InitOptions::new(config, compositor).with_audio(audio.clone()),
        )?;
        manager.add_listener(recorder.clone());

        Ok(Self {
            manager: Arc::new(manager),
            surface,
            audio,
            recorder,
        })
    }

    /// Timeline frames presented so far, in presentation order
    pub fn presented_timeline_frames(&self) -> Vec<u64> {
        self.surface
            .presented()
            .iter()
            .filter_map(|f| f.timeline_frame)
            .collect()
    }

    /// Wait until at least `count` frames were generated
    pub fn wait_for_frames(&self, count: u64, timeout: Duration) -> bool {
        wait_for(timeout, || self.manager.frame_count() >= count)
    }
}

impl Drop for TestEngine {
    fn drop(&mut self) {
        let _ = self.manager.shutdown(true);
    }
}
