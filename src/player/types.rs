//! Playback-related small types.
//!
//! Repeat policy, the controller's state machine states and the progress
//! snapshot handed to the UI.

use crate::config::RepeatModeSetting;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RepeatMode {
    /// Stop after the last track.
    #[default]
    None = 0,
    /// Replay the current track when it ends.
    RepeatOne = 1,
    /// Wrap around to the first track (or a random one when shuffling).
    RepeatAll = 2,
}

impl RepeatMode {
    pub(super) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::RepeatOne,
            2 => Self::RepeatAll,
            _ => Self::None,
        }
    }
}

impl From<RepeatModeSetting> for RepeatMode {
    fn from(s: RepeatModeSetting) -> Self {
        match s {
            RepeatModeSetting::None => Self::None,
            RepeatModeSetting::RepeatOne => Self::RepeatOne,
            RepeatModeSetting::RepeatAll => Self::RepeatAll,
        }
    }
}

/// `Stopped → Preparing → Playing ⇄ Paused`, with `Stopped` and `Error` as
/// the idle states.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlayerState {
    #[default]
    Stopped = 0,
    /// A playback thread has been requested but has not started decoding.
    Preparing = 1,
    Playing = 2,
    Paused = 3,
    /// The last track could not be opened or decoded.
    Error = 4,
}

impl PlayerState {
    pub(super) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Preparing,
            2 => Self::Playing,
            3 => Self::Paused,
            4 => Self::Error,
            _ => Self::Stopped,
        }
    }

    /// Anything but the two idle states.
    pub fn is_playing(self) -> bool {
        !matches!(self, Self::Stopped | Self::Error)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TrackProgress {
    pub position_ms: u64,
    /// Zero until known.
    pub duration_ms: u64,
}

/// `MM:SS`, or `HH:MM:SS` from one hour on.
pub fn format_ms(ms: u64) -> String {
    let total = ms / 1000;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
