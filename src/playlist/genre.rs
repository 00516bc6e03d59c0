use crate::library::TrackInfo;

/// Filtered view over the catalog for "more of this genre" playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenrePlaylist {
    /// The query the list was built from, as given.
    pub key: String,
    /// Catalog indices in catalog order.
    pub indices: Vec<usize>,
    /// Position within `indices` of the track last started from this list.
    pub pos: usize,
}

impl GenrePlaylist {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Indices of tracks whose genre contains `query`, ASCII case-insensitively.
pub fn matching_indices(tracks: &[TrackInfo], query: &str) -> Vec<usize> {
    let kw = query.to_ascii_lowercase();
    if kw.is_empty() {
        return Vec::new();
    }
    tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            let g = t.genre.to_ascii_lowercase();
            !g.is_empty() && g.contains(&kw)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Distinct non-empty genres, ordered ASCII case-insensitively.
pub fn distinct_genres(tracks: &[TrackInfo]) -> Vec<String> {
    let mut genres: Vec<String> = Vec::new();
    for t in tracks {
        if !t.genre.is_empty() && !genres.contains(&t.genre) {
            genres.push(t.genre.clone());
        }
    }
    genres.sort_by_key(|g| g.to_ascii_lowercase());
    genres
}
