//! MPEG audio Layer III frame synchronization.
//!
//! [`FrameReader`] keeps a fixed-size input window over the file, refilled
//! only when it runs low, skips a leading ID3v2 tag once, and hands out one
//! complete frame at a time. Frame decoding itself lives behind
//! [`Mp3FrameDecoder`](super::Mp3FrameDecoder).

use std::fs::File;
use std::io::{self, ErrorKind, Read};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::library::TrackInfo;
use crate::library::tags::id3v2_tag_len;

use super::pcm::{downmix_in_place, frame_duration_ms};
use super::pipeline::{Gate, Pipeline};

const HEADER_LEN: usize = 4;

const BITRATES_V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L3: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MpegVersion {
    V1,
    V2,
    V25,
}

/// Decoded 4-byte Layer III frame header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub padding: bool,
    /// Whole frame, header included.
    pub frame_len: usize,
    pub samples_per_channel: usize,
}

impl FrameHeader {
    /// Parse a Layer III header. Free-format and reserved values are rejected.
    pub fn parse(b: &[u8]) -> Option<Self> {
        if b.len() < HEADER_LEN || b[0] != 0xFF || b[1] & 0xE0 != 0xE0 {
            return None;
        }
        let version = match (b[1] >> 3) & 0x03 {
            0 => MpegVersion::V25,
            2 => MpegVersion::V2,
            3 => MpegVersion::V1,
            _ => return None,
        };
        if (b[1] >> 1) & 0x03 != 0x01 {
            return None;
        }

        let bitrate_idx = usize::from(b[2] >> 4);
        let rate_idx = usize::from((b[2] >> 2) & 0x03);
        if bitrate_idx == 0 || bitrate_idx == 15 || rate_idx == 3 {
            return None;
        }

        let (bitrate_kbps, sample_rate, samples_per_channel, coeff) = match version {
            MpegVersion::V1 => (BITRATES_V1_L3[bitrate_idx], [44_100, 48_000, 32_000][rate_idx], 1152, 144),
            MpegVersion::V2 => (BITRATES_V2_L3[bitrate_idx], [22_050, 24_000, 16_000][rate_idx], 576, 72),
            MpegVersion::V25 => (BITRATES_V2_L3[bitrate_idx], [11_025, 12_000, 8_000][rate_idx], 576, 72),
        };
        let padding = (b[2] >> 1) & 0x01 == 1;
        let channels = if b[3] >> 6 == 0x03 { 1 } else { 2 };
        let frame_len = (coeff * bitrate_kbps * 1000 / sample_rate) as usize + usize::from(padding);

        Some(Self {
            version,
            bitrate_kbps,
            sample_rate,
            channels,
            padding,
            frame_len,
            samples_per_channel,
        })
    }

    pub fn bitrate_bps(&self) -> u64 {
        u64::from(self.bitrate_kbps) * 1000
    }
}

/// Offset of the first 11-bit frame sync in `data`.
pub fn find_sync(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w[0] == 0xFF && w[1] & 0xE0 == 0xE0)
}

/// Sliding input window over an MP3 byte stream.
pub struct FrameReader<R> {
    src: R,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    refill_threshold: usize,
    eof: bool,
    id3_checked: bool,
    pending_skip: usize,
    discarded: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(src: R, capacity: usize, refill_threshold: usize) -> Self {
        Self {
            src,
            buf: vec![0; capacity.max(HEADER_LEN)],
            start: 0,
            end: 0,
            refill_threshold,
            eof: false,
            id3_checked: false,
            pending_skip: 0,
            discarded: 0,
        }
    }

    fn available(&self) -> usize {
        self.end - self.start
    }

    /// Bytes dropped while hunting for frames, ID3 tag excluded.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn refill(&mut self) -> io::Result<()> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        while !self.eof && self.end < self.buf.len() {
            match self.src.read(&mut self.buf[self.end..]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.end += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        if !self.id3_checked && (self.available() >= 10 || self.eof) {
            self.id3_checked = true;
            if let Some(len) = id3v2_tag_len(&self.buf[self.start..self.end]) {
                debug!(bytes = len, "skipping ID3v2 tag");
                self.pending_skip = len;
            }
        }
        if self.pending_skip > 0 {
            let n = self.pending_skip.min(self.available());
            self.start += n;
            self.pending_skip -= n;
        }
        Ok(())
    }

    /// Drop `n` bytes at the front of the window.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.available());
        self.start += n;
        self.discarded += n as u64;
    }

    /// Mark a decoded frame as used.
    pub fn consume(&mut self, header: &FrameHeader) {
        self.start += header.frame_len.min(self.available());
    }

    /// Bytes of the frame at the front of the window, as returned by the last
    /// [`next_frame`](Self::next_frame).
    pub fn frame(&self, header: &FrameHeader) -> &[u8] {
        &self.buf[self.start..self.start + header.frame_len.min(self.available())]
    }

    /// Synchronize on the next complete frame. `None` at end of stream,
    /// including a frame cut short by the end of the file.
    pub fn next_frame(&mut self) -> io::Result<Option<FrameHeader>> {
        loop {
            if (self.available() < self.refill_threshold || self.pending_skip > 0) && !self.eof {
                self.refill()?;
            }

            let window = &self.buf[self.start..self.end];
            match find_sync(window) {
                Some(0) => {}
                Some(off) => {
                    self.discard(off);
                    continue;
                }
                None => {
                    if self.eof {
                        self.discard(self.available());
                        return Ok(None);
                    }
                    // A sync word may straddle the window edge.
                    let keep = self.available().min(1);
                    self.discard(self.available() - keep);
                    self.refill()?;
                    continue;
                }
            }

            if self.available() < HEADER_LEN {
                if self.eof {
                    return Ok(None);
                }
                self.refill()?;
                continue;
            }

            let Some(header) = FrameHeader::parse(&self.buf[self.start..self.start + HEADER_LEN]) else {
                self.discard(1);
                continue;
            };

            if header.frame_len > self.available() {
                if self.eof {
                    debug!(need = header.frame_len, have = self.available(), "truncated final frame");
                    return Ok(None);
                }
                if self.start == 0 && self.end == self.buf.len() {
                    // Larger than the whole window; cannot be a real frame.
                    self.discard(1);
                    continue;
                }
                self.refill()?;
                continue;
            }

            return Ok(Some(header));
        }
    }
}

impl Pipeline<'_> {
    pub(super) fn play_mp3(&mut self, track: &TrackInfo, on_stats: &mut dyn FnMut(u64, u32)) -> Result<()> {
        let path = &track.path;
        let mut frames = self.decoders.mp3_frame_decoder().map_err(|e| {
            error!(error = %e, "cannot create MP3 decoder");
            Error::Decode(e.to_string())
        })?;
        let file = File::open(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot open MP3 file");
            Error::Io(e)
        })?;
        let file_size = file.metadata().map(|m| m.len()).unwrap_or(track.file_size);

        let mut reader = FrameReader::new(file, self.settings.mp3_input_buffer, self.settings.mp3_refill_threshold);
        let mut pcm: Vec<i16> = Vec::with_capacity(1152 * 2);
        let mut duration_known = false;

        loop {
            match self.gate() {
                Gate::Stop => break,
                Gate::Retry => continue,
                Gate::Go => {}
            }

            let header = match reader.next_frame() {
                Ok(Some(h)) => h,
                Ok(None) => {
                    info!(path = %path.display(), "end of MP3 stream");
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "MP3 read failed, ending track");
                    break;
                }
            };
            if self.stopped() {
                break;
            }

            pcm.clear();
            if let Err(e) = frames.decode_frame(reader.frame(&header), &header, &mut pcm) {
                debug!(error = %e, "frame decode failed, resyncing");
                reader.discard(1);
                continue;
            }
            reader.consume(&header);
            if self.stopped() {
                break;
            }
            if pcm.is_empty() {
                continue;
            }

            self.ensure_sample_rate(header.sample_rate);
            if !self.codec.output_enabled() {
                warn!("audio output disabled, re-enabling");
                self.codec.enable_output(true);
            }

            let spc = pcm.len() / usize::from(header.channels);
            let frame_ms = frame_duration_ms(spc, header.sample_rate);
            self.progress.set_bitrate_kbps(header.bitrate_kbps);

            if !duration_known && file_size > 0 {
                duration_known = true;
                let duration_ms = file_size * 8 * 1000 / header.bitrate_bps();
                self.progress.set_duration_ms(duration_ms);
                on_stats(duration_ms, header.bitrate_kbps);
                debug!(duration_ms, bitrate_kbps = header.bitrate_kbps, "estimated MP3 duration");
            }

            let n = downmix_in_place(&mut pcm, header.channels);
            self.emit(&pcm[..n], header.sample_rate, frame_ms);
        }

        if reader.discarded() > 0 {
            debug!(path = %path.display(), bytes = reader.discarded(), "bytes skipped while resyncing");
        }
        Ok(())
    }
}
