//! Track model and metadata extraction.
//!
//! Everything here is stateless: format detection, the ID3 subset readers,
//! the strict WAV header check and the directory scanner that turns a tree of
//! files into `TrackInfo` records.

mod display;
mod format;
mod model;
mod scan;
pub mod tags;
pub mod wav;

pub use display::now_playing_line;
pub use format::AudioFormat;
pub use model::{TrackInfo, base_name_no_ext};
pub use scan::{read_track_info, scan};
pub use wav::{WavError, WavHeader, parse_wav_header};
