use crate::config::TrackDisplayField;

use super::model::{TrackInfo, base_name_no_ext};

/// Build the "now playing" line for a track according to `fields` and `sep`.
///
/// Composes metadata fields in the configured order, skipping blanks, and falls
/// back to the display name when nothing was produced.
pub fn now_playing_line(track: &TrackInfo, fields: &[TrackDisplayField], sep: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    let mut push = |s: &str| {
        let s = s.trim();
        if !s.is_empty() {
            parts.push(s.to_string());
        }
    };

    for f in fields {
        match f {
            TrackDisplayField::Name => push(&track.name),
            TrackDisplayField::Title => {
                if track.title.trim().is_empty() {
                    push(&track.name);
                } else {
                    push(&track.title);
                }
            }
            TrackDisplayField::Artist => push(&track.artist),
            TrackDisplayField::Album => push(&track.album),
            TrackDisplayField::Genre => push(&track.genre),
            TrackDisplayField::Filename => push(&base_name_no_ext(&track.path.to_string_lossy())),
            TrackDisplayField::Path => push(&track.path.to_string_lossy()),
        }
    }

    if parts.is_empty() {
        track.name.clone()
    } else {
        parts.join(sep)
    }
}
