//! Default codecs, backed by symphonia.

use std::fs::File;
use std::io::ErrorKind;

use symphonia::core::audio::{AudioBufferRef, Channels, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_MP3, CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::library::AudioFormat;

use super::mp3::FrameHeader;
use super::{DecodeError, DecodedBlock, DecoderFactory, Mp3FrameDecoder, StreamDecoder, StreamInfo};

/// Copy a decoded buffer into `buf` as interleaved i16, reallocating only when it grows.
fn interleave(decoded: AudioBufferRef<'_>, buf: &mut Option<SampleBuffer<i16>>) -> usize {
    let spec = *decoded.spec();
    let needed = decoded.capacity() * spec.channels.count();
    let fits = buf.as_ref().is_some_and(|b| b.capacity() >= needed);
    if !fits {
        *buf = Some(SampleBuffer::<i16>::new(decoded.capacity() as u64, spec));
    }
    match buf.as_mut() {
        Some(b) => {
            b.copy_interleaved_ref(decoded);
            b.len()
        }
        None => 0,
    }
}

fn channel_layout(channels: u16) -> Channels {
    if channels == 1 {
        Channels::FRONT_LEFT
    } else {
        Channels::FRONT_LEFT | Channels::FRONT_RIGHT
    }
}

/// MPEG audio decoder fed one synchronized frame per packet.
#[derive(Default)]
pub struct SymphoniaMp3Frames {
    decoder: Option<Box<dyn Decoder>>,
    layout: (u32, u16),
    samples: Option<SampleBuffer<i16>>,
    ts: u64,
}

impl SymphoniaMp3Frames {
    fn ensure_decoder(&mut self, header: &FrameHeader) -> Result<(), DecodeError> {
        let layout = (header.sample_rate, header.channels);
        if self.decoder.is_some() && self.layout == layout {
            return Ok(());
        }
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_MP3)
            .with_sample_rate(header.sample_rate)
            .with_channels(channel_layout(header.channels));
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
        self.decoder = Some(decoder);
        self.layout = layout;
        Ok(())
    }
}

impl Mp3FrameDecoder for SymphoniaMp3Frames {
    fn decode_frame(&mut self, frame: &[u8], header: &FrameHeader, out: &mut Vec<i16>) -> Result<(), DecodeError> {
        self.ensure_decoder(header)?;
        let Some(decoder) = self.decoder.as_mut() else {
            return Err(DecodeError::Unsupported("no MP3 decoder".into()));
        };

        let dur = header.samples_per_channel as u64;
        let packet = Packet::new_from_slice(0, self.ts, dur, frame);
        self.ts += dur;

        let decoded = decoder
            .decode(&packet)
            .map(|decoded| interleave(decoded, &mut self.samples));
        match decoded {
            Ok(n) => {
                if let Some(b) = &self.samples {
                    out.extend_from_slice(&b.samples()[..n]);
                }
                Ok(())
            }
            Err(SymphoniaError::ResetRequired) => {
                self.decoder = None;
                Err(DecodeError::Corrupt("decoder reset required".into()))
            }
            Err(e) => Err(DecodeError::Corrupt(e.to_string())),
        }
    }
}

/// Containerized AAC or FLAC stream: probe, pick the first audio track, pull packets.
pub struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    bits_per_sample: u16,
    samples: Option<SampleBuffer<i16>>,
    /// Decoded samples not yet handed out.
    pending: Option<(usize, StreamInfo)>,
}

impl SymphoniaStream {
    pub fn open(format: AudioFormat, file: File) -> Result<Self, DecodeError> {
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        match format {
            AudioFormat::Aac => {
                hint.with_extension("aac");
            }
            AudioFormat::Flac => {
                hint.with_extension("flac");
            }
            other => return Err(DecodeError::Unsupported(format!("{other:?}"))),
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("no audio track".into()))?;
        let track_id = track.id;
        let bits_per_sample = track.codec_params.bits_per_sample.unwrap_or(0) as u16;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        Ok(Self {
            format: reader,
            decoder,
            track_id,
            bits_per_sample,
            samples: None,
            pending: None,
        })
    }

    fn decode_next_packet(&mut self) -> Result<Option<(usize, StreamInfo)>, DecodeError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
            let spec = *decoded.spec();
            let info = StreamInfo {
                sample_rate: spec.rate,
                bits_per_sample: self.bits_per_sample,
                channels: spec.channels.count() as u16,
            };
            let n = interleave(decoded, &mut self.samples);
            return Ok(Some((n, info)));
        }
    }
}

impl StreamDecoder for SymphoniaStream {
    fn decode(&mut self, out: &mut [i16]) -> Result<Option<DecodedBlock>, DecodeError> {
        if self.pending.is_none() {
            match self.decode_next_packet()? {
                Some(p) => self.pending = Some(p),
                None => return Ok(None),
            }
        }
        let Some((n, info)) = self.pending else {
            return Ok(None);
        };
        if n > out.len() {
            debug!(needed = n, have = out.len(), "output buffer too small");
            return Err(DecodeError::BufferTooSmall { needed: n });
        }
        if let Some(b) = &self.samples {
            out[..n].copy_from_slice(&b.samples()[..n]);
        }
        self.pending = None;
        Ok(Some(DecodedBlock { samples: n, info }))
    }
}

/// Symphonia-backed codecs for every format the pipeline plays.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoders;

impl DecoderFactory for SymphoniaDecoders {
    fn mp3_frame_decoder(&self) -> Result<Box<dyn Mp3FrameDecoder>, DecodeError> {
        Ok(Box::new(SymphoniaMp3Frames::default()))
    }

    fn open_stream(&self, format: AudioFormat, file: File) -> Result<Box<dyn StreamDecoder>, DecodeError> {
        Ok(Box::new(SymphoniaStream::open(format, file)?))
    }
}
