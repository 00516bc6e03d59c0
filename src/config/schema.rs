use serde::Deserialize;

/// Top-level settings for the playback core.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/sdmusic/config.toml` or `~/.config/sdmusic/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `SDMUSIC__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library: LibrarySettings,
    pub playback: PlaybackSettings,
    pub decode: DecodeSettings,
    pub display: DisplaySettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Name of the JSON catalog cache written into the playlist root.
    pub cache_file_name: String,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Read container properties (duration, bitrate) while scanning.
    ///
    /// Off by default: it touches every file body, which is slow on SD cards.
    pub probe_properties: bool,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            cache_file_name: "playlist.json".to_string(),
            follow_links: false,
            include_hidden: true,
            probe_properties: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Whether shuffle starts enabled.
    pub shuffle: bool,
    /// Default repeat mode.
    pub repeat: RepeatModeSetting,
    /// How long `play()`/`stop()` wait for the previous playback thread (milliseconds).
    pub join_timeout_ms: u64,
    /// Stack size of the playback thread in bytes.
    pub thread_stack_size: usize,
    pub thread_name: String,
    /// Back-off while voice interaction holds the device (milliseconds).
    pub interrupt_backoff_ms: u64,
    /// Back-off while the device is busy for any other reason (milliseconds).
    pub busy_backoff_ms: u64,
    /// Number of played indices remembered for suggestions.
    pub history_capacity: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            shuffle: false,
            repeat: RepeatModeSetting::None,
            join_timeout_ms: 120,
            thread_stack_size: 256 * 1024,
            thread_name: "sd_music_play".to_string(),
            interrupt_backoff_ms: 300,
            busy_backoff_ms: 50,
            history_capacity: 200,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatModeSetting {
    #[serde(alias = "no_repeat", alias = "no-repeat", alias = "off")]
    None,
    #[serde(
        alias = "repeatone",
        alias = "repeat_one",
        alias = "loop-one",
        alias = "one"
    )]
    RepeatOne,
    #[serde(
        alias = "repeatall",
        alias = "repeat_all",
        alias = "loop-all",
        alias = "all"
    )]
    RepeatAll,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecodeSettings {
    /// Interleaved samples read per WAV block.
    pub wav_block_samples: usize,
    /// Size of the MP3 input ring in bytes.
    pub mp3_input_buffer: usize,
    /// Refill the MP3 input ring when fewer bytes than this remain.
    pub mp3_refill_threshold: usize,
    /// Initial PCM capacity (samples) handed to the AAC/FLAC decoder.
    pub stream_output_samples: usize,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            wav_block_samples: 1152 * 2,
            mp3_input_buffer: 4096,
            mp3_refill_threshold: 1024,
            stream_output_samples: 4096 * 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Which track fields make up the "now playing" line, and in what order.
    ///
    /// Example: ["artist", "title"] -> "Artist - Title"
    pub now_playing_fields: Vec<TrackDisplayField>,
    /// Separator used to join `now_playing_fields`.
    pub now_playing_separator: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            now_playing_fields: vec![TrackDisplayField::Artist, TrackDisplayField::Title],
            now_playing_separator: " - ".to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackDisplayField {
    /// Catalog display name (tag title or file stem).
    Name,
    /// Tag title, falling back to the display name.
    Title,
    Artist,
    Album,
    Genre,
    Filename,
    Path,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "sdmusic=info".to_string(),
        }
    }
}
