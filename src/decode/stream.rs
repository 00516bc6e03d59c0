use std::fs::File;

use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::library::{AudioFormat, TrackInfo};

use super::pcm::{downmix_to, frame_duration_ms};
use super::pipeline::{Gate, Pipeline};
use super::{DecodeError, DecodedBlock, StreamDecoder, StreamInfo};

/// Decode one block, growing `out` and retrying once if the decoder asks for more room.
pub(super) fn decode_with_growth(
    decoder: &mut dyn StreamDecoder,
    out: &mut Vec<i16>,
) -> std::result::Result<Option<DecodedBlock>, DecodeError> {
    match decoder.decode(out) {
        Err(DecodeError::BufferTooSmall { needed }) => {
            out.resize(needed.max(out.len() + 1), 0);
            decoder.decode(out)
        }
        other => other,
    }
}

impl Pipeline<'_> {
    pub(super) fn play_stream(&mut self, track: &TrackInfo, format: AudioFormat) -> Result<()> {
        let path = &track.path;
        let file = File::open(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot open file");
            Error::Io(e)
        })?;
        let mut decoder = self.decoders.open_stream(format, file).map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot open decoder");
            Error::Decode(e.to_string())
        })?;

        let mut out = vec![0i16; self.settings.stream_output_samples.max(1)];
        let mut mono: Vec<i16> = Vec::new();
        let mut info: Option<StreamInfo> = None;

        loop {
            match self.gate() {
                Gate::Stop => break,
                Gate::Retry => continue,
                Gate::Go => {}
            }

            let block = match decode_with_growth(decoder.as_mut(), &mut out) {
                Ok(Some(block)) => block,
                Ok(None) => {
                    info!(path = %path.display(), "end of stream");
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "decode error, ending track");
                    break;
                }
            };
            if self.stopped() {
                break;
            }
            if block.samples == 0 {
                continue;
            }

            let si = match info {
                Some(si) => si,
                None => {
                    let si = block.info.normalized();
                    info!(
                        rate = si.sample_rate,
                        bits = si.bits_per_sample,
                        channels = si.channels,
                        "stream info"
                    );
                    self.ensure_sample_rate(si.sample_rate);
                    info = Some(si);
                    si
                }
            };

            downmix_to(&out[..block.samples], si.channels, &mut mono);
            if mono.is_empty() {
                continue;
            }
            let frame_ms = frame_duration_ms(mono.len(), si.sample_rate);
            self.emit(&mono, si.sample_rate, frame_ms);
        }

        Ok(())
    }
}
