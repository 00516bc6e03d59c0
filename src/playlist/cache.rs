//! `playlist.json` catalog cache.
//!
//! Read and written in full. The loader is lenient per record: entries that
//! are not objects or have no `path` are dropped, missing or mistyped fields
//! fall back to defaults. Cover-art fields are never persisted.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::library::{TrackInfo, base_name_no_ext};

pub const CACHE_VERSION: u32 = 1;

#[derive(Serialize)]
struct CacheFileOut {
    version: u32,
    tracks: Vec<CacheRecord>,
}

#[derive(Deserialize)]
struct CacheFileIn {
    tracks: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    artist: String,
    #[serde(default, deserialize_with = "lenient_string")]
    album: String,
    #[serde(default, deserialize_with = "lenient_string")]
    genre: String,
    #[serde(default, deserialize_with = "lenient_string")]
    comment: String,
    #[serde(default, deserialize_with = "lenient_string")]
    year: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    track_number: u32,
    #[serde(default, deserialize_with = "lenient_u64")]
    duration_ms: u64,
    #[serde(default, deserialize_with = "lenient_u32")]
    bitrate_kbps: u32,
    #[serde(default, deserialize_with = "lenient_u64")]
    file_size: u64,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        _ => 0,
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    let v = lenient_u64(d)?;
    Ok(u32::try_from(v).unwrap_or(0))
}

impl From<&TrackInfo> for CacheRecord {
    fn from(t: &TrackInfo) -> Self {
        let path = t.path.to_string_lossy().into_owned();
        let name = if t.name.is_empty() {
            base_name_no_ext(&path)
        } else {
            t.name.clone()
        };
        Self {
            name,
            path,
            title: t.title.clone(),
            artist: t.artist.clone(),
            album: t.album.clone(),
            genre: t.genre.clone(),
            comment: t.comment.clone(),
            year: t.year.clone(),
            track_number: t.track_number,
            duration_ms: t.duration_ms,
            bitrate_kbps: t.bitrate_kbps,
            file_size: t.file_size,
        }
    }
}

impl CacheRecord {
    fn into_track(self) -> Option<TrackInfo> {
        if self.path.is_empty() {
            return None;
        }
        let name = if self.name.is_empty() {
            base_name_no_ext(&self.path)
        } else {
            self.name
        };
        Some(TrackInfo {
            name,
            path: PathBuf::from(self.path),
            title: self.title,
            artist: self.artist,
            album: self.album,
            genre: self.genre,
            comment: self.comment,
            year: self.year,
            track_number: self.track_number,
            duration_ms: self.duration_ms,
            bitrate_kbps: self.bitrate_kbps,
            file_size: self.file_size,
            cover_size: 0,
            cover_mime: String::new(),
        })
    }
}

/// Read the cache. A missing file, malformed JSON or a document without a
/// `tracks` array is an error; an array without usable records is an empty list.
pub fn load(path: &Path) -> Result<Vec<TrackInfo>> {
    let file = File::open(path)?;
    let doc: CacheFileIn = serde_json::from_reader(BufReader::new(file))?;

    let tracks: Vec<TrackInfo> = doc
        .tracks
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|v| serde_json::from_value::<CacheRecord>(v).ok())
        .filter_map(CacheRecord::into_track)
        .collect();

    if tracks.is_empty() {
        warn!(path = %path.display(), "playlist cache has no valid tracks");
    } else {
        debug!(path = %path.display(), count = tracks.len(), "playlist cache loaded");
    }
    Ok(tracks)
}

/// Overwrite the cache with `tracks`. Zero tracks is a valid, successful save.
///
/// Written to a sibling temp file first and renamed into place, so a power
/// cut mid-write leaves either the old or the new document.
pub fn save(path: &Path, tracks: &[TrackInfo]) -> Result<()> {
    let doc = CacheFileOut {
        version: CACHE_VERSION,
        tracks: tracks.iter().map(CacheRecord::from).collect(),
    };

    let tmp = path.with_extension("json.tmp");
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut w, &doc)?;
        w.write_all(b"\n")?;
        w.flush()?;
    }
    fs::rename(&tmp, path)?;

    info!(path = %path.display(), count = tracks.len(), "playlist cache saved");
    Ok(())
}
