use std::path::Path;

use lofty::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::LibrarySettings;

use super::format::AudioFormat;
use super::model::TrackInfo;
use super::tags::{read_id3v1, read_id3v2};

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Build a catalog entry for one audio file without decoding it.
///
/// ID3v2 is read first and wins; ID3v1 only fills what is still empty.
pub fn read_track_info(path: &Path, file_size: u64, settings: &LibrarySettings) -> TrackInfo {
    let mut info = TrackInfo::new(path);
    info.file_size = file_size;

    read_id3v2(path, &mut info);
    read_id3v1(path, &mut info);

    if settings.probe_properties {
        probe_properties(path, &mut info);
    }

    info.derive_name();
    info
}

fn probe_properties(path: &Path, info: &mut TrackInfo) {
    match lofty::read_from_path(path) {
        Ok(tagged) => {
            let props = tagged.properties();
            info.duration_ms = props.duration().as_millis() as u64;
            info.bitrate_kbps = props.audio_bitrate().unwrap_or(0);
        }
        Err(e) => debug!(path = %path.display(), error = %e, "property probe failed"),
    }
}

/// Depth-first scan of `dir` for files with a known audio extension.
///
/// Entries are visited in file-name order so repeated scans of an unchanged
/// card produce the same catalog order. Unreadable entries are logged and skipped.
pub fn scan(dir: &Path, settings: &LibrarySettings) -> Vec<TrackInfo> {
    let mut tracks: Vec<TrackInfo> = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(settings.follow_links)
        .min_depth(1)
        .sort_by_file_name();

    for entry in walker
        .into_iter()
        .filter_entry(|e| settings.include_hidden || !is_hidden(e.path()))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "cannot read directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !AudioFormat::detect(path).is_known() {
            continue;
        }

        let file_size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        tracks.push(read_track_info(path, file_size, settings));
    }

    debug!(dir = %dir.display(), count = tracks.len(), "scan finished");
    tracks
}
