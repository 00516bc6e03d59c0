//! Narrow capability interfaces onto the rest of the device.
//!
//! The playback core never reaches for process-wide singletons. Everything it
//! needs from the board (storage, audio codec, interaction coordinator and the
//! visualization display) is injected through these traits at construction.
//! All methods take `&self`; implementations are shared with the playback
//! thread and handle their own interior mutability.

use std::path::PathBuf;
use std::sync::Arc;

/// Removable storage mount.
pub trait StorageMount: Send + Sync {
    fn is_mounted(&self) -> bool;
    fn mount_point(&self) -> PathBuf;
}

/// Audio output codec.
pub trait AudioCodec: Send + Sync {
    fn output_sample_rate(&self) -> u32;
    /// `None` restores the codec's original rate.
    fn set_output_sample_rate(&self, rate: Option<u32>);
    fn original_output_sample_rate(&self) -> u32;
    fn output_enabled(&self) -> bool;
    fn enable_output(&self, enabled: bool);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Unknown,
    Starting,
    Idle,
    Connecting,
    Listening,
    Speaking,
    Upgrading,
}

/// One block of mono PCM handed to the audio service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStreamPacket {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub timestamp: u32,
    pub pcm: Vec<i16>,
}

/// Application-level coordinator (voice chat, wake word, audio service).
pub trait DeviceCoordinator: Send + Sync {
    fn device_state(&self) -> DeviceState;
    fn set_device_state(&self, state: DeviceState);
    fn add_audio_data(&self, packet: AudioStreamPacket);
    fn toggle_chat_state(&self);
    fn stop_listening(&self);
    fn enable_wake_word_detection(&self, enabled: bool);
}

/// Handle to a visualization buffer owned by the display.
///
/// Not `Clone`: releasing consumes the handle, so a buffer can only be
/// released once and never used afterwards.
#[derive(Debug, PartialEq, Eq)]
pub struct FftBuffer {
    id: u64,
    len: usize,
}

impl FftBuffer {
    pub fn new(id: u64, len: usize) -> Self {
        Self { id, len }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Capacity in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// "Now playing" text and spectrum visualization.
pub trait Display: Send + Sync {
    fn set_music_info(&self, text: &str);
    fn start_fft(&self);
    fn stop_fft(&self);
    fn make_fft_buffer(&self, bytes: usize) -> Option<FftBuffer>;
    fn feed_fft(&self, buffer: &FftBuffer, pcm: &[i16]);
    fn release_fft_buffer(&self, buffer: FftBuffer);
}

/// Bundle of the collaborators handed to the player.
#[derive(Clone)]
pub struct Host {
    pub mount: Arc<dyn StorageMount>,
    pub codec: Arc<dyn AudioCodec>,
    pub coordinator: Arc<dyn DeviceCoordinator>,
    /// Boards without a screen run headless.
    pub display: Option<Arc<dyn Display>>,
}
