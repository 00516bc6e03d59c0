//! Error types for the playback core.
//!
//! Catalog problems are mostly recovered internally (rescan, empty result);
//! the variants here are what escapes to callers of the public operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::library::AudioFormat;

#[derive(Error, Debug)]
pub enum Error {
    /// File or directory I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Playlist cache could not be (de)serialized.
    #[error("playlist cache error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("storage is not mounted")]
    NotMounted,

    #[error("not a directory: {}", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("playlist is empty")]
    EmptyPlaylist,

    #[error("track index {index} out of range (playlist has {len} tracks)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no track matches '{0}'")]
    NoMatch(String),

    #[error("unsupported audio format {format:?}: {}", path.display())]
    UnsupportedFormat { format: AudioFormat, path: PathBuf },

    /// WAV layout other than canonical 44-byte PCM16.
    #[error("unsupported WAV layout: {}", .0.display())]
    InvalidWav(PathBuf),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("failed to spawn playback thread: {0}")]
    ThreadSpawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
