use std::path::Path;

/// Container/codec family, detected from the file extension only.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    Unknown,
    Mp3,
    Wav,
    Aac,
    Flac,
    Ogg,
    Opus,
}

impl AudioFormat {
    /// `Unknown` excludes the file from the catalog.
    pub fn detect(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            return Self::Unknown;
        };
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Self::Mp3,
            "wav" => Self::Wav,
            "aac" | "m4a" => Self::Aac,
            "flac" => Self::Flac,
            "ogg" => Self::Ogg,
            "opus" => Self::Opus,
            _ => Self::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}
