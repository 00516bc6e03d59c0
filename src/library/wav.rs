//! Canonical PCM16 WAV header.
//!
//! Only the 44-byte `RIFF`/`WAVE`/`fmt `/`data` layout is accepted. Files with
//! `LIST`, `fact` or other chunks before `data` are rejected rather than parsed.

use std::io::Read;

use thiserror::Error;

pub const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub channels: u16,
    pub data_offset: u64,
    pub data_size: u32,
}

impl WavHeader {
    /// Duration implied by the data chunk size.
    pub fn duration_ms(&self) -> u64 {
        let frames = u64::from(self.data_size) / (u64::from(self.channels) * 2);
        frames * 1000 / u64::from(self.sample_rate)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WavError {
    #[error("header shorter than 44 bytes")]
    Truncated,
    #[error("missing RIFF/WAVE magic")]
    NotRiffWave,
    #[error("missing fmt chunk at offset 12")]
    MissingFmt,
    #[error("only PCM 16-bit is supported (format {format}, {bits} bits)")]
    NotPcm16 { format: u16, bits: u16 },
    #[error("zero channels or sample rate")]
    EmptyStream,
    #[error("expected data chunk at offset 36, found {0:?}")]
    UnexpectedChunk(String),
}

pub fn parse_wav_header<R: Read>(r: &mut R) -> Result<WavHeader, WavError> {
    let mut h = [0u8; WAV_HEADER_LEN];
    r.read_exact(&mut h).map_err(|_| WavError::Truncated)?;

    if &h[0..4] != b"RIFF" || &h[8..12] != b"WAVE" {
        return Err(WavError::NotRiffWave);
    }
    if &h[12..16] != b"fmt " {
        return Err(WavError::MissingFmt);
    }

    let le16 = |i: usize| u16::from_le_bytes([h[i], h[i + 1]]);
    let le32 = |i: usize| u32::from_le_bytes([h[i], h[i + 1], h[i + 2], h[i + 3]]);

    let format = le16(20);
    let channels = le16(22);
    let sample_rate = le32(24);
    let bits = le16(34);

    if format != 1 || bits != 16 {
        return Err(WavError::NotPcm16 { format, bits });
    }
    if channels == 0 || sample_rate == 0 {
        return Err(WavError::EmptyStream);
    }
    if &h[36..40] != b"data" {
        return Err(WavError::UnexpectedChunk(
            String::from_utf8_lossy(&h[36..40]).into_owned(),
        ));
    }

    Ok(WavHeader {
        sample_rate,
        channels,
        data_offset: WAV_HEADER_LEN as u64,
        data_size: le32(40),
    })
}

/// Build a canonical 44-byte header. Handy for fixtures and for tools writing
/// recordings back to the card.
pub fn canonical_header(sample_rate: u32, channels: u16, bits: u16, data_size: u32) -> Vec<u8> {
    let block_align = channels * (bits / 8).max(1);
    let mut h = Vec::with_capacity(WAV_HEADER_LEN);
    h.extend_from_slice(b"RIFF");
    h.extend_from_slice(&(36 + data_size).to_le_bytes());
    h.extend_from_slice(b"WAVE");
    h.extend_from_slice(b"fmt ");
    h.extend_from_slice(&16u32.to_le_bytes());
    h.extend_from_slice(&1u16.to_le_bytes());
    h.extend_from_slice(&channels.to_le_bytes());
    h.extend_from_slice(&sample_rate.to_le_bytes());
    h.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    h.extend_from_slice(&block_align.to_le_bytes());
    h.extend_from_slice(&bits.to_le_bytes());
    h.extend_from_slice(b"data");
    h.extend_from_slice(&data_size.to_le_bytes());
    h
}
