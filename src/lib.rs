//! Music playback core for a device with a removable storage card.
//!
//! Scans the card into a cached track catalog, keeps the playlist cursor,
//! shuffle and repeat policy, history and genre sub-lists, and runs a single
//! playback thread that streams WAV, MP3, AAC and FLAC as 16-bit mono PCM
//! packets to the device's audio service.
//!
//! The board itself is reached only through the traits in [`host`].
//!
//! ```no_run
//! # fn host() -> sdmusic::Host { unimplemented!() }
//! use sdmusic::{MusicPlayer, RepeatMode, Settings};
//!
//! let settings = Settings::load()?;
//! sdmusic::logging::init(&settings.log);
//!
//! let player = MusicPlayer::new(host(), &settings);
//! player.load_track_list()?;
//! player.set_repeat(RepeatMode::RepeatAll);
//! player.play()?;
//! # Ok::<(), sdmusic::Error>(())
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod host;
pub mod library;
pub mod logging;
pub mod player;
pub mod playlist;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use error::{Error, Result};
pub use host::Host;
pub use library::{AudioFormat, TrackInfo};
pub use player::{MusicPlayer, PlayerState, RepeatMode, TrackProgress};
pub use playlist::PlaylistStore;
