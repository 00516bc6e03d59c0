use std::collections::VecDeque;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::LibrarySettings;
use crate::error::{Error, Result};
use crate::host::StorageMount;
use crate::library::{self, TrackInfo};

use super::cache;
use super::genre::{self, GenrePlaylist};
use super::search::{self, normalize_for_search};
use super::suggest;

/// Everything guarded by the catalog lock.
///
/// `tracks` and `play_count` always have the same length. `current` is
/// `None` or a valid index into `tracks`. Genre indices refer to the
/// current `tracks` and are dropped whenever `tracks` is replaced.
#[derive(Default)]
struct Catalog {
    root: Option<PathBuf>,
    tracks: Vec<TrackInfo>,
    play_count: Vec<u32>,
    current: Option<usize>,
    genre: Option<GenrePlaylist>,
}

impl Catalog {
    fn install(&mut self, tracks: Vec<TrackInfo>) {
        self.current = if tracks.is_empty() { None } else { Some(0) };
        self.play_count = vec![0; tracks.len()];
        self.tracks = tracks;
        self.genre = None;
    }
}

/// Where the cursor goes after a track ends on its own.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Policy says stop; the cursor did not move.
    Stop,
    /// The cursor now points here.
    Play(usize),
}

/// `(start + direction) mod len`, with `None` or an out-of-range start mapping to 0.
pub fn find_next_track_index(len: usize, start: Option<usize>, direction: isize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match start {
        Some(s) if s < len => {
            let len = len as isize;
            Some((s as isize + direction).rem_euclid(len) as usize)
        }
        _ => Some(0),
    }
}

/// Uniform pick among all indices except `current`. Needs `len > 1`
/// whenever `current` is a valid index.
fn random_other_index(len: usize, current: Option<usize>) -> usize {
    let mut rng = rand::thread_rng();
    match current {
        Some(cur) if cur < len && len > 1 => {
            let r = rng.gen_range(0..len - 1);
            if r >= cur { r + 1 } else { r }
        }
        _ => rng.gen_range(0..len),
    }
}

/// Resolve the last component of `path` case-insensitively against the
/// entries of its parent. Returns `path` unchanged when nothing matches.
pub fn resolve_case_insensitive_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let wanted = name.to_string_lossy().to_ascii_lowercase();

    let Ok(entries) = fs::read_dir(parent) else {
        return path.to_path_buf();
    };
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().to_ascii_lowercase() == wanted {
            let candidate = entry.path();
            if candidate.is_dir() {
                return candidate;
            }
        }
    }
    path.to_path_buf()
}

/// The track catalog of one root directory, its cache file and play history.
///
/// Lock order: `catalog` before `history`. No lock is held across a scan or
/// cache read/write.
pub struct PlaylistStore {
    mount: Arc<dyn StorageMount>,
    settings: LibrarySettings,
    history_capacity: usize,
    catalog: Mutex<Catalog>,
    history: Mutex<VecDeque<usize>>,
}

impl PlaylistStore {
    pub fn new(mount: Arc<dyn StorageMount>, settings: LibrarySettings, history_capacity: usize) -> Self {
        let root = if mount.is_mounted() {
            Some(mount.mount_point())
        } else {
            warn!("storage not mounted yet, root resolved on first load");
            None
        };
        Self {
            mount,
            settings,
            history_capacity: history_capacity.max(1),
            catalog: Mutex::new(Catalog {
                root,
                ..Catalog::default()
            }),
            history: Mutex::new(VecDeque::new()),
        }
    }

    fn catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<usize>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn root(&self) -> Result<PathBuf> {
        let mut cat = self.catalog();
        if let Some(root) = &cat.root {
            return Ok(root.clone());
        }
        if !self.mount.is_mounted() {
            return Err(Error::NotMounted);
        }
        let root = self.mount.mount_point();
        cat.root = Some(root.clone());
        Ok(root)
    }

    /// Current root directory, if one has been resolved.
    pub fn root_directory(&self) -> Option<PathBuf> {
        self.catalog().root.clone()
    }

    fn cache_path(&self, root: &Path) -> PathBuf {
        root.join(&self.settings.cache_file_name)
    }

    fn install(&self, tracks: Vec<TrackInfo>) -> usize {
        let n = tracks.len();
        self.catalog().install(tracks);
        self.history().clear();
        n
    }

    /// Load the catalog of the current root, from cache when it holds at
    /// least one track, otherwise by scanning and rewriting the cache.
    ///
    /// Returns the number of tracks; zero is a successful outcome.
    pub fn load_track_list(&self) -> Result<usize> {
        let root = self.root()?;
        let cache_path = self.cache_path(&root);

        let tracks = match cache::load(&cache_path) {
            Ok(list) if !list.is_empty() => list,
            loaded => {
                if let Err(e) = loaded {
                    warn!(path = %cache_path.display(), error = %e, "playlist cache unusable");
                }
                info!(root = %root.display(), "scanning storage to rebuild playlist");
                let list = library::scan(&root, &self.settings);
                cache::save(&cache_path, &list)?;
                list
            }
        };

        let n = self.install(tracks);
        info!(root = %root.display(), tracks = n, "track list ready");
        Ok(n)
    }

    /// Rescan the current root unconditionally and overwrite the cache.
    pub fn rebuild_from_storage(&self) -> Result<usize> {
        let root = self.root()?;
        info!(root = %root.display(), "rebuilding playlist");

        let list = library::scan(&root, &self.settings);
        cache::save(&self.cache_path(&root), &list)?;

        let n = self.install(list);
        info!(tracks = n, "playlist rebuilt");
        Ok(n)
    }

    /// Map a mount-relative directory to an existing path on the card.
    ///
    /// Empty or `/` is the mount root. Each component is matched
    /// case-insensitively when the exact name does not exist.
    pub fn resolve_directory(&self, relative: &str) -> Result<PathBuf> {
        if !self.mount.is_mounted() {
            return Err(Error::NotMounted);
        }
        let mut full = self.mount.mount_point();
        for component in Path::new(relative.trim_start_matches('/')).components() {
            if let Component::Normal(part) = component {
                full.push(part);
                full = resolve_case_insensitive_dir(&full);
            }
        }
        if !full.is_dir() {
            warn!(path = %full.display(), "invalid directory");
            return Err(Error::InvalidDirectory(full));
        }
        Ok(full)
    }

    /// Switch the root to `relative` under the mount point and load it.
    pub fn set_directory(&self, relative: &str) -> Result<usize> {
        let full = self.resolve_directory(relative)?;
        self.catalog().root = Some(full.clone());
        info!(root = %full.display(), "directory selected");
        self.load_track_list()
    }

    /// Immediate subdirectories of the current root, sorted by name.
    pub fn list_directories(&self) -> Vec<String> {
        let Some(root) = self.root_directory() else {
            return Vec::new();
        };
        let entries = match fs::read_dir(&root) {
            Ok(e) => e,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "cannot open directory");
                return Vec::new();
            }
        };
        let mut dirs: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        dirs.sort();
        dirs
    }

    /// Catalog tracks located under `relative`, at any depth.
    pub fn count_tracks_in_directory(&self, relative: &str) -> Result<usize> {
        let dir = self.resolve_directory(relative)?;
        let cat = self.catalog();
        Ok(cat.tracks.iter().filter(|t| t.path.starts_with(&dir)).count())
    }

    pub fn count_tracks_in_current_directory(&self) -> usize {
        self.total_tracks()
    }

    pub fn total_tracks(&self) -> usize {
        self.catalog().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog().tracks.is_empty()
    }

    pub fn list_tracks(&self) -> Vec<TrackInfo> {
        self.catalog().tracks.clone()
    }

    /// One page of the catalog. A zero page size or a page past the end is empty.
    pub fn list_tracks_page(&self, page: usize, page_size: usize) -> Vec<TrackInfo> {
        if page_size == 0 {
            return Vec::new();
        }
        let cat = self.catalog();
        let Some(start) = page.checked_mul(page_size).filter(|s| *s < cat.tracks.len()) else {
            return Vec::new();
        };
        let end = (start + page_size).min(cat.tracks.len());
        cat.tracks[start..end].to_vec()
    }

    pub fn track_info(&self, index: usize) -> Option<TrackInfo> {
        self.catalog().tracks.get(index).cloned()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.catalog().current
    }

    /// Display name of the selected track.
    pub fn current_track(&self) -> Option<String> {
        let cat = self.catalog();
        cat.current.and_then(|i| cat.tracks.get(i)).map(|t| t.name.clone())
    }

    pub fn current_track_path(&self) -> Option<PathBuf> {
        let cat = self.catalog();
        cat.current.and_then(|i| cat.tracks.get(i)).map(|t| t.path.clone())
    }

    /// Copy of the selected track together with its index.
    ///
    /// Selects index 0 when nothing is selected yet and the catalog is non-empty.
    pub fn current_snapshot(&self) -> Option<(usize, TrackInfo)> {
        let mut cat = self.catalog();
        if cat.current.is_none() && !cat.tracks.is_empty() {
            cat.current = Some(0);
        }
        let i = cat.current?;
        cat.tracks.get(i).map(|t| (i, t.clone()))
    }

    pub fn select(&self, index: usize) -> Result<()> {
        let mut cat = self.catalog();
        let len = cat.tracks.len();
        if index >= len {
            warn!(index, len, "track index out of range");
            return Err(Error::IndexOutOfRange { index, len });
        }
        cat.current = Some(index);
        info!(index, name = %cat.tracks[index].name, "track selected");
        Ok(())
    }

    /// Move the cursor one step for next/prev. Shuffle picks any other index.
    pub fn step(&self, direction: isize, shuffle: bool) -> Result<usize> {
        let mut cat = self.catalog();
        let len = cat.tracks.len();
        if len == 0 {
            return Err(Error::EmptyPlaylist);
        }
        let next = if shuffle {
            if len > 1 {
                random_other_index(len, cat.current)
            } else {
                cat.current.unwrap_or(0)
            }
        } else {
            find_next_track_index(len, cat.current, direction).unwrap_or(0)
        };
        cat.current = Some(next);
        debug!(index = next, name = %cat.tracks[next].name, "cursor moved");
        Ok(next)
    }

    /// Apply the repeat policy after a track finished on its own.
    pub fn advance_after_track(&self, repeat_one: bool, repeat_all: bool, shuffle: bool) -> Advance {
        let mut cat = self.catalog();
        let len = cat.tracks.len();
        let Some(cur) = cat.current.filter(|c| *c < len) else {
            return Advance::Stop;
        };

        let next = if repeat_one {
            cur
        } else if repeat_all {
            if shuffle && len > 1 {
                random_other_index(len, Some(cur))
            } else {
                find_next_track_index(len, Some(cur), 1).unwrap_or(0)
            }
        } else {
            if cur + 1 == len {
                return Advance::Stop;
            }
            cur + 1
        };

        cat.current = Some(next);
        Advance::Play(next)
    }

    /// First track whose normalized name or path contains the keyword.
    pub fn find_track_index_by_keyword(&self, keyword: &str) -> Option<usize> {
        let kw = normalize_for_search(keyword);
        if kw.is_empty() {
            return None;
        }
        self.catalog().tracks.iter().position(|t| search::matches(t, &kw))
    }

    /// Every track whose normalized name or path contains the keyword.
    pub fn search_tracks(&self, keyword: &str) -> Vec<TrackInfo> {
        let kw = normalize_for_search(keyword);
        if kw.is_empty() {
            return Vec::new();
        }
        self.catalog()
            .tracks
            .iter()
            .filter(|t| search::matches(t, &kw))
            .cloned()
            .collect()
    }

    pub fn list_genres(&self) -> Vec<String> {
        genre::distinct_genres(&self.catalog().tracks)
    }

    /// Remember that `index` started playing.
    pub fn record_play_history(&self, index: usize) {
        {
            let mut cat = self.catalog();
            if let Some(count) = cat.play_count.get_mut(index) {
                *count += 1;
            }
        }
        let mut history = self.history();
        history.push_back(index);
        while history.len() > self.history_capacity {
            history.pop_front();
        }
    }

    pub fn play_history(&self) -> Vec<usize> {
        self.history().iter().copied().collect()
    }

    pub fn play_count(&self, index: usize) -> u32 {
        self.catalog().play_count.get(index).copied().unwrap_or(0)
    }

    /// Write decoder-discovered stats back into the catalog entry for `path`.
    ///
    /// `hint` is checked first; the catalog may have been reloaded since the
    /// track started, so the path is what decides.
    pub fn update_track_stats(&self, hint: usize, path: &Path, duration_ms: u64, bitrate_kbps: u32) {
        let mut cat = self.catalog();
        let index = if cat.tracks.get(hint).is_some_and(|t| t.path.as_path() == path) {
            Some(hint)
        } else {
            cat.tracks.iter().position(|t| t.path.as_path() == path)
        };
        if let Some(t) = index.and_then(|i| cat.tracks.get_mut(i)) {
            t.duration_ms = duration_ms;
            t.bitrate_kbps = bitrate_kbps;
        }
    }

    /// Tracks similar to the most recently played one.
    ///
    /// Without history this is simply the first `max` tracks.
    pub fn suggest_next_tracks(&self, max: usize) -> Vec<TrackInfo> {
        if max == 0 {
            return Vec::new();
        }
        let base = self.history().back().copied();
        let cat = self.catalog();
        match base.filter(|b| *b < cat.tracks.len()) {
            Some(b) => suggest::rank(&cat.tracks, &cat.play_count, b, max),
            None => cat.tracks.iter().take(max).cloned().collect(),
        }
    }

    /// Tracks similar to the first match of `name_or_path`, falling back to
    /// [`suggest_next_tracks`](Self::suggest_next_tracks) when nothing matches.
    pub fn suggest_similar_to(&self, name_or_path: &str, max: usize) -> Vec<TrackInfo> {
        if max == 0 {
            return Vec::new();
        }
        let Some(base) = self.find_track_index_by_keyword(name_or_path) else {
            return self.suggest_next_tracks(max);
        };
        let cat = self.catalog();
        suggest::rank(&cat.tracks, &cat.play_count, base, max)
    }

    /// Build the genre sub-playlist. On no match the previous one is kept.
    pub fn build_genre_playlist(&self, genre_query: &str) -> Result<usize> {
        let mut cat = self.catalog();
        let indices = genre::matching_indices(&cat.tracks, genre_query);
        if indices.is_empty() {
            warn!(genre = genre_query, "no tracks found for genre");
            return Err(Error::NoMatch(genre_query.to_string()));
        }
        let n = indices.len();
        cat.genre = Some(GenrePlaylist {
            key: genre_query.to_string(),
            indices,
            pos: 0,
        });
        info!(genre = genre_query, tracks = n, "genre playlist built");
        Ok(n)
    }

    pub fn genre_playlist(&self) -> Option<GenrePlaylist> {
        self.catalog().genre.clone()
    }

    /// Point the cursor at position `pos` of the genre list.
    pub fn select_genre_position(&self, pos: usize) -> Result<usize> {
        let mut cat = self.catalog();
        let len = cat.tracks.len();
        let Some(genre) = cat.genre.as_mut() else {
            return Err(Error::EmptyPlaylist);
        };
        let Some(&index) = genre.indices.get(pos) else {
            return Err(Error::IndexOutOfRange {
                index: pos,
                len: genre.indices.len(),
            });
        };
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        genre.pos = pos;
        cat.current = Some(index);
        Ok(index)
    }

    /// Step to the next genre entry. `None` when there is no genre list or
    /// it is exhausted; the cursor is left alone in that case.
    pub fn advance_genre(&self) -> Option<usize> {
        let mut cat = self.catalog();
        let len = cat.tracks.len();
        let genre = cat.genre.as_mut()?;
        let next_pos = genre.pos + 1;
        let Some(&index) = genre.indices.get(next_pos) else {
            info!(genre = %genre.key, "end of genre playlist");
            return None;
        };
        if index >= len {
            return None;
        }
        genre.pos = next_pos;
        cat.current = Some(index);
        Some(index)
    }
}
