//! Playback mode and event types shared between the engine and its callers

use serde::{Deserialize, Serialize};

/// Play mode reported to playback listeners
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    Playing,
    Paused,
}

impl PlayMode {
    pub fn is_playing(self) -> bool {
        matches!(self, PlayMode::Playing)
    }
}

impl std::fmt::Display for PlayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayMode::Playing => write!(f, "playing"),
            PlayMode::Paused => write!(f, "paused"),
        }
    }
}

/// Playback event as observed by a listener
///
/// Listeners receive these notifications through dedicated callbacks; this
/// enum is the serializable record form used for event logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// Play mode changed (start/stop playing)
    PlayModeChanged { mode: PlayMode },
    /// The generator moved to a new timeline frame
    CurrentFrameChanged { frame: u64 },
    /// The generator has no timeline and asks whether a queued switch is pending
    CheckPendingTimelineSwitch,
}
