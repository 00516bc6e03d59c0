use std::sync::Arc;

use tracing::debug;

use crate::host::{Display, FftBuffer};

/// Single-buffer feed into the display's spectrum view.
///
/// Holds at most one buffer. The previous buffer is always released before a
/// new one is requested, and whatever is held is released on
/// [`stop`](Self::stop) or drop.
pub struct FftFeed {
    display: Option<Arc<dyn Display>>,
    buffer: Option<FftBuffer>,
}

impl FftFeed {
    pub fn new(display: Option<Arc<dyn Display>>) -> Self {
        Self { display, buffer: None }
    }

    pub fn start(&self) {
        if let Some(d) = &self.display {
            d.start_fft();
        }
    }

    pub fn feed(&mut self, pcm: &[i16]) {
        let Some(display) = &self.display else {
            return;
        };
        if let Some(old) = self.buffer.take() {
            display.release_fft_buffer(old);
        }
        match display.make_fft_buffer(std::mem::size_of_val(pcm)) {
            Some(buffer) => {
                display.feed_fft(&buffer, pcm);
                self.buffer = Some(buffer);
            }
            None => debug!(bytes = std::mem::size_of_val(pcm), "no FFT buffer available"),
        }
    }

    pub fn release(&mut self) {
        if let (Some(display), Some(buffer)) = (&self.display, self.buffer.take()) {
            display.release_fft_buffer(buffer);
        }
    }

    pub fn stop(&mut self) {
        if let Some(d) = &self.display {
            d.stop_fft();
        }
        self.release();
    }

    pub fn holds_buffer(&self) -> bool {
        self.buffer.is_some()
    }
}

impl Drop for FftFeed {
    fn drop(&mut self) {
        self.release();
    }
}
