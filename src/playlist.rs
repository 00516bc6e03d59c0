//! Track catalog for one root directory on the card.
//!
//! [`PlaylistStore`] owns the catalog and its `playlist.json` cache. It
//! serves lookups, search and suggestions, and keeps the cursor, per-track play
//! counts, play history and the genre sub-playlist. Callers only ever receive
//! copies of `TrackInfo`.

mod cache;
mod genre;
mod search;
mod store;
mod suggest;

pub use cache::CACHE_VERSION;
pub use genre::GenrePlaylist;
pub use search::normalize_for_search;
pub use store::{Advance, PlaylistStore, find_next_track_index, resolve_case_insensitive_dir};
pub use suggest::score as similarity_score;
