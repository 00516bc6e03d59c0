use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::library::{TrackInfo, parse_wav_header};

use super::pcm::{downmix_to, frame_duration_ms};
use super::pipeline::{Gate, Pipeline};

/// Read until `buf` is full or the reader is exhausted.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl Pipeline<'_> {
    pub(super) fn play_wav(&mut self, track: &TrackInfo) -> Result<()> {
        let path = &track.path;
        let file = File::open(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot open WAV file");
            Error::Io(e)
        })?;
        let mut reader = BufReader::new(file);

        let header = parse_wav_header(&mut reader).map_err(|e| {
            error!(path = %path.display(), error = %e, "unsupported WAV layout");
            Error::InvalidWav(path.clone())
        })?;
        reader.seek(SeekFrom::Start(header.data_offset))?;

        self.ensure_sample_rate(header.sample_rate);
        self.progress.set_duration_ms(header.duration_ms());
        info!(
            path = %path.display(),
            rate = header.sample_rate,
            channels = header.channels,
            duration_ms = header.duration_ms(),
            "playing WAV"
        );

        // Whole frames per read so no block ends between two channels.
        let channels = usize::from(header.channels);
        let block_bytes = (self.settings.wav_block_samples / channels).max(1) * channels * 2;
        let mut raw = vec![0u8; block_bytes];
        let mut samples: Vec<i16> = Vec::with_capacity(self.settings.wav_block_samples);
        let mut mono: Vec<i16> = Vec::with_capacity(self.settings.wav_block_samples);
        let data_size = u64::from(header.data_size);
        let mut consumed: u64 = 0;

        while consumed < data_size {
            match self.gate() {
                Gate::Stop => break,
                Gate::Retry => continue,
                Gate::Go => {}
            }

            let want = (data_size - consumed).min(block_bytes as u64) as usize;
            let n = match read_full(&mut reader, &mut raw[..want]) {
                Ok(n) => n,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "WAV read failed, ending track");
                    break;
                }
            };
            if n == 0 {
                debug!(path = %path.display(), "WAV data ended early");
                break;
            }
            consumed += n as u64;

            samples.clear();
            samples.extend(raw[..n].chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])));
            if samples.is_empty() {
                continue;
            }

            downmix_to(&samples, header.channels, &mut mono);
            let frame_ms = frame_duration_ms(mono.len(), header.sample_rate);
            self.emit(&mono, header.sample_rate, frame_ms);
        }

        debug!(path = %path.display(), bytes = consumed, "WAV finished");
        Ok(())
    }
}
