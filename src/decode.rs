//! Streaming decode pipeline.
//!
//! Turns one track into 16-bit mono PCM packets for the audio service and the
//! FFT display, one block at a time. Three loops share the same gate (stop,
//! pause, device-state back-off) and the same emit step:
//!
//! - WAV: canonical PCM16 passthrough,
//! - MP3: own frame synchronizer feeding one frame at a time to a
//!   [`Mp3FrameDecoder`],
//! - AAC/FLAC: a stateful [`StreamDecoder`] with grow-and-retry output.
//!
//! Codecs come from a [`DecoderFactory`]; [`SymphoniaDecoders`] is the default.

mod backend;
mod fft;
mod mp3;
mod pcm;
mod pipeline;
mod stream;
mod wav;

use std::fs::File;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::library::AudioFormat;

pub use backend::{SymphoniaDecoders, SymphoniaMp3Frames, SymphoniaStream};
pub use fft::FftFeed;
pub use mp3::{FrameHeader, FrameReader, find_sync};
pub use pcm::{downmix_in_place, downmix_to, frame_duration_ms};
pub use pipeline::Pipeline;

/// Codec-level failure, mapped to `Error::Decode` at the pipeline boundary.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The output buffer cannot hold the next block; retry with `needed` samples.
    #[error("output buffer too small, {needed} samples needed")]
    BufferTooSmall { needed: usize },

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("unsupported stream: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream parameters latched from the first decoded block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl StreamInfo {
    /// Fill unreported fields: 2 channels, 16 bits.
    pub fn normalized(self) -> Self {
        Self {
            sample_rate: self.sample_rate,
            bits_per_sample: if self.bits_per_sample == 0 { 16 } else { self.bits_per_sample },
            channels: if self.channels == 0 { 2 } else { self.channels },
        }
    }
}

/// One block of interleaved samples written to the front of the caller's buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    pub samples: usize,
    pub info: StreamInfo,
}

/// Decodes exactly one synchronized MPEG audio frame per call.
pub trait Mp3FrameDecoder: Send {
    /// Append the frame's interleaved PCM to `out`.
    fn decode_frame(&mut self, frame: &[u8], header: &FrameHeader, out: &mut Vec<i16>) -> Result<(), DecodeError>;
}

/// Stateful pull decoder for containerized streams (AAC, FLAC).
pub trait StreamDecoder: Send {
    /// Decode the next block into `out`. `Ok(None)` is end of stream.
    ///
    /// On [`DecodeError::BufferTooSmall`] the block is kept and handed out by
    /// the next call once `out` is large enough.
    fn decode(&mut self, out: &mut [i16]) -> Result<Option<DecodedBlock>, DecodeError>;
}

pub trait DecoderFactory: Send + Sync {
    fn mp3_frame_decoder(&self) -> Result<Box<dyn Mp3FrameDecoder>, DecodeError>;
    fn open_stream(&self, format: AudioFormat, file: File) -> Result<Box<dyn StreamDecoder>, DecodeError>;
}

/// Cooperative control surface the decode loops poll once per block.
pub trait Transport: Send + Sync {
    fn stop_requested(&self) -> bool;
    /// Block while a pause is pending. Returns `false` if stop was requested meanwhile.
    fn wait_while_paused(&self) -> bool;
    /// Sleep for up to `d`, returning early when stop is requested.
    fn backoff(&self, d: Duration);
}

/// Position, duration and bitrate of the track being decoded.
#[derive(Debug, Default)]
pub struct Progress {
    position_ms: AtomicU64,
    duration_ms: AtomicU64,
    bitrate_kbps: AtomicU32,
}

impl Progress {
    pub fn reset(&self) {
        self.position_ms.store(0, Ordering::Relaxed);
        self.duration_ms.store(0, Ordering::Relaxed);
        self.bitrate_kbps.store(0, Ordering::Relaxed);
    }

    pub fn reset_position(&self) {
        self.position_ms.store(0, Ordering::Relaxed);
    }

    pub fn advance(&self, ms: u32) {
        self.position_ms.fetch_add(u64::from(ms), Ordering::Relaxed);
    }

    pub fn set_duration_ms(&self, ms: u64) {
        self.duration_ms.store(ms, Ordering::Relaxed);
    }

    pub fn set_bitrate_kbps(&self, kbps: u32) {
        self.bitrate_kbps.store(kbps, Ordering::Relaxed);
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::Relaxed)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms.load(Ordering::Relaxed)
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps.load(Ordering::Relaxed)
    }
}
