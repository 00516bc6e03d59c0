use std::time::Duration;

use tracing::{error, info};

use crate::config::DecodeSettings;
use crate::error::{Error, Result};
use crate::host::{AudioCodec, AudioStreamPacket, DeviceCoordinator, DeviceState};
use crate::library::{AudioFormat, TrackInfo};

use super::fft::FftFeed;
use super::{DecoderFactory, Progress, Transport};

/// Outcome of the per-block gate.
pub(super) enum Gate {
    Go,
    Retry,
    Stop,
}

/// One track's worth of decode context.
///
/// Borrowed from the playback thread for the duration of [`play`](Self::play);
/// nothing here outlives the track.
pub struct Pipeline<'a> {
    pub codec: &'a dyn AudioCodec,
    pub coordinator: &'a dyn DeviceCoordinator,
    pub decoders: &'a dyn DecoderFactory,
    pub transport: &'a dyn Transport,
    pub progress: &'a Progress,
    pub fft: &'a mut FftFeed,
    pub settings: &'a DecodeSettings,
    /// Back-off while voice interaction holds the device.
    pub interrupt_backoff: Duration,
    /// Back-off while the device is busy otherwise.
    pub busy_backoff: Duration,
}

impl Pipeline<'_> {
    /// Decode `track` to the end, or until stop is requested.
    ///
    /// `on_stats(duration_ms, bitrate_kbps)` fires at most once, when the real
    /// values are first known. Failing to open or recognize the file is an
    /// error and nothing is written to the sinks; mid-stream trouble is not.
    pub fn play(&mut self, track: &TrackInfo, on_stats: &mut dyn FnMut(u64, u32)) -> Result<()> {
        if !self.codec.output_enabled() {
            self.codec.enable_output(true);
        }
        self.progress.reset();

        let format = AudioFormat::detect(&track.path);
        match format {
            AudioFormat::Wav => self.play_wav(track),
            AudioFormat::Mp3 => self.play_mp3(track, on_stats),
            AudioFormat::Aac | AudioFormat::Flac => self.play_stream(track, format),
            AudioFormat::Ogg | AudioFormat::Opus | AudioFormat::Unknown => {
                error!(path = %track.path.display(), ?format, "format not supported by the decoder");
                Err(Error::UnsupportedFormat {
                    format,
                    path: track.path.clone(),
                })
            }
        }
    }

    /// Stop, pause and device-state check run before every block.
    pub(super) fn gate(&self) -> Gate {
        if self.transport.stop_requested() || !self.transport.wait_while_paused() {
            return Gate::Stop;
        }
        match self.coordinator.device_state() {
            DeviceState::Idle => Gate::Go,
            DeviceState::Listening | DeviceState::Speaking => {
                self.coordinator.toggle_chat_state();
                self.transport.backoff(self.interrupt_backoff);
                Gate::Retry
            }
            _ => {
                self.transport.backoff(self.busy_backoff);
                Gate::Retry
            }
        }
    }

    pub(super) fn stopped(&self) -> bool {
        self.transport.stop_requested()
    }

    pub(super) fn ensure_sample_rate(&self, rate: u32) {
        if rate > 0 && self.codec.output_sample_rate() != rate {
            info!(rate, "switching output sample rate");
            self.codec.set_output_sample_rate(Some(rate));
        }
    }

    /// Push one mono block to the audio service and the FFT view.
    pub(super) fn emit(&mut self, mono: &[i16], sample_rate: u32, frame_ms: u32) {
        self.progress.advance(frame_ms);
        self.coordinator.add_audio_data(AudioStreamPacket {
            sample_rate,
            frame_duration_ms: frame_ms,
            timestamp: 0,
            pcm: mono.to_vec(),
        });
        self.fft.feed(mono);
    }
}
