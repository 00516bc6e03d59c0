use std::path::{Path, PathBuf};

/// One catalog entry.
///
/// `path` is the key: unique within a root and stable for the lifetime of a
/// catalog snapshot. Callers outside the playlist store only ever get clones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    /// Display name: tag title, or the file stem when untagged.
    pub name: String,
    pub path: PathBuf,

    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub comment: String,
    pub year: String,
    pub track_number: u32,

    /// Updated in place once decoding discovers the real values.
    pub duration_ms: u64,
    pub bitrate_kbps: u32,
    pub file_size: u64,

    /// Never parsed nor persisted; kept so consumers of the record shape keep working.
    pub cover_size: u32,
    pub cover_mime: String,
}

impl TrackInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Fill `name` from the title tag, or from the file stem.
    pub fn derive_name(&mut self) {
        self.name = if self.title.is_empty() {
            base_name_no_ext(&self.path.to_string_lossy())
        } else {
            self.title.clone()
        };
    }

    /// Parent directory of the track, if any.
    pub fn directory(&self) -> Option<&Path> {
        self.path.parent()
    }
}

/// Last path component without its extension.
///
/// Works on plain strings because display names may contain dots or slashes
/// that are not path separators on the card.
pub fn base_name_no_ext(name_or_path: &str) -> String {
    let start = name_or_path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let end = match name_or_path.rfind('.') {
        Some(dot) if dot >= start => dot,
        _ => name_or_path.len(),
    };
    name_or_path[start..end].to_string()
}
