use crate::library::{TrackInfo, base_name_no_ext};

fn comparable_name(t: &TrackInfo) -> String {
    let src = if t.name.is_empty() {
        t.path.to_string_lossy().into_owned()
    } else {
        t.name.clone()
    };
    base_name_no_ext(&src).to_ascii_lowercase()
}

/// Similarity of `cand` to `base`: same folder, related names, and how often
/// `cand` has been played.
pub fn score(base: &TrackInfo, cand: &TrackInfo, cand_play_count: u32) -> u64 {
    let mut score: u64 = 0;

    match (base.directory(), cand.directory()) {
        (Some(b), Some(c)) if !b.as_os_str().is_empty() && b == c => score += 3,
        _ => {}
    }

    let b = comparable_name(base);
    let c = comparable_name(cand);
    if !b.is_empty() && !c.is_empty() {
        if b.contains(&c) || c.contains(&b) {
            score += 3;
        } else {
            let b_first = b.split(' ').next().unwrap_or("");
            let c_first = c.split(' ').next().unwrap_or("");
            if !b_first.is_empty() && b_first == c_first {
                score += 1;
            }
        }
    }

    score + u64::from(cand_play_count)
}

/// Rank every track except `base_index` against it and keep the best `max`.
///
/// Ties keep catalog order.
pub fn rank(tracks: &[TrackInfo], play_count: &[u32], base_index: usize, max: usize) -> Vec<TrackInfo> {
    let Some(base) = tracks.get(base_index) else {
        return Vec::new();
    };

    let mut scored: Vec<(usize, u64)> = tracks
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != base_index)
        .map(|(i, t)| (i, score(base, t, play_count.get(i).copied().unwrap_or(0))))
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    scored
        .into_iter()
        .take(max)
        .map(|(i, _)| tracks[i].clone())
        .collect()
}
