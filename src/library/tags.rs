//! Frame-safe ID3 subset.
//!
//! Only the text frames the catalog needs are read, one bounded frame at a
//! time, so a damaged or huge tag never costs more than a couple of KiB.
//! Failures leave the `TrackInfo` untouched.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::trace;

use super::model::TrackInfo;

const ID3V2_HEADER_LEN: u64 = 10;
const FRAME_HEADER_LEN: u64 = 10;
const MAX_TEXT_FRAME: u32 = 2048;
const ID3V1_LEN: usize = 128;

/// Standard ID3v1 genre names, indexed by genre byte.
pub const ID3V1_GENRES: &[&str] = &[
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge",
    "Hip-Hop", "Jazz", "Metal", "New Age", "Oldies", "Other", "Pop", "R&B",
    "Rap", "Reggae", "Rock", "Techno", "Industrial", "Alternative", "Ska",
    "Death Metal", "Pranks", "Soundtrack", "Euro-Techno", "Ambient",
    "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance", "Classical",
    "Instrumental", "Acid", "House", "Game", "Sound Clip", "Gospel",
    "Noise", "AlternRock", "Bass", "Soul", "Punk", "Space", "Meditative",
    "Instrumental Pop", "Instrumental Rock", "Ethnic", "Gothic", "Darkwave",
    "Techno-Industrial", "Electronic", "Pop-Folk", "Eurodance", "Dream",
    "Southern Rock", "Comedy", "Cult", "Gangsta", "Top 40", "Christian Rap",
    "Pop/Funk", "Jungle", "Native American", "Cabaret", "New Wave",
    "Psychadelic", "Rave", "Showtunes", "Trailer", "Lo-Fi", "Tribal",
    "Acid Punk", "Acid Jazz", "Polka", "Retro", "Musical", "Rock & Roll",
    "Hard Rock",
];

pub fn genre_name(index: usize) -> Option<&'static str> {
    ID3V1_GENRES.get(index).copied()
}

/// Decode a 28-bit synchsafe integer (7 significant bits per byte).
pub fn synchsafe(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, b| (acc << 7) | u32::from(b & 0x7F))
}

/// Total length of a leading ID3v2 tag (header included), if `data` starts with one.
pub fn id3v2_tag_len(data: &[u8]) -> Option<usize> {
    if data.len() < ID3V2_HEADER_LEN as usize || &data[..3] != b"ID3" {
        return None;
    }
    let size = synchsafe([data[6], data[7], data[8], data[9]]);
    Some(ID3V2_HEADER_LEN as usize + size as usize)
}

/// Read title/artist/album/year/genre from an ID3v2 tag. v2 values win over whatever is set.
pub fn read_id3v2(path: &Path, info: &mut TrackInfo) {
    let Ok(mut f) = File::open(path) else {
        return;
    };
    read_id3v2_from(&mut f, info);
}

pub(crate) fn read_id3v2_from<R: Read + Seek>(r: &mut R, info: &mut TrackInfo) {
    let mut hdr = [0u8; ID3V2_HEADER_LEN as usize];
    if r.read_exact(&mut hdr).is_err() || &hdr[..3] != b"ID3" {
        return;
    }
    let end = ID3V2_HEADER_LEN + u64::from(synchsafe([hdr[6], hdr[7], hdr[8], hdr[9]]));

    // First occurrence of each frame id wins, even when it turns out unusable.
    let mut title = None;
    let mut artist = None;
    let mut album = None;
    let mut year = None;
    let mut genre = None;

    let mut cur = ID3V2_HEADER_LEN;
    while cur + FRAME_HEADER_LEN <= end {
        if r.seek(SeekFrom::Start(cur)).is_err() {
            break;
        }
        let mut fh = [0u8; FRAME_HEADER_LEN as usize];
        if r.read_exact(&mut fh).is_err() || fh[0] == 0 {
            break;
        }
        let size = u32::from_be_bytes([fh[4], fh[5], fh[6], fh[7]]);
        if size == 0 {
            break;
        }

        let slot = match &fh[..4] {
            b"TIT2" => &mut title,
            b"TPE1" => &mut artist,
            b"TALB" => &mut album,
            b"TYER" => &mut year,
            b"TCON" => &mut genre,
            _ => {
                cur += FRAME_HEADER_LEN + u64::from(size);
                continue;
            }
        };
        if slot.is_none() {
            *slot = Some(read_text_frame(r, size).unwrap_or_default());
        }

        cur += FRAME_HEADER_LEN + u64::from(size);
    }

    let apply = |dst: &mut String, v: Option<String>| {
        if let Some(v) = v.filter(|v| !v.is_empty()) {
            *dst = v;
        }
    };
    apply(&mut info.title, title);
    apply(&mut info.artist, artist);
    apply(&mut info.album, album);
    apply(&mut info.year, year);
    if let Some(g) = genre.filter(|g| !g.is_empty()) {
        info.genre = normalize_tcon(&g);
    }
}

fn read_text_frame<R: Read>(r: &mut R, size: u32) -> Option<String> {
    if !(2..=MAX_TEXT_FRAME).contains(&size) {
        trace!(size, "skipping oversized or empty text frame");
        return None;
    }
    let mut buf = vec![0u8; size as usize];
    r.read_exact(&mut buf).ok()?;

    let (enc, payload) = (buf[0], &buf[1..]);
    let text = match enc {
        0 => latin1(payload),
        3 => String::from_utf8_lossy(payload).into_owned(),
        1 => {
            if payload.len() < 2 {
                return None;
            }
            let little_endian = payload[0] == 0xFF && payload[1] == 0xFE;
            utf16(&payload[2..], !little_endian)
        }
        2 => utf16(payload, true),
        _ => return None,
    };
    Some(trim_nul(text))
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn utf16(bytes: &[u8], big_endian: bool) -> String {
    let units = bytes.chunks_exact(2).map(|c| {
        if big_endian {
            u16::from_be_bytes([c[0], c[1]])
        } else {
            u16::from_le_bytes([c[0], c[1]])
        }
    });
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn trim_nul(mut s: String) -> String {
    if let Some(end) = s.find('\0') {
        s.truncate(end);
    }
    s
}

/// Normalize a TCON value: `(13)` and `(13)Pop` map through the ID3v1 table.
pub fn normalize_tcon(raw: &str) -> String {
    let s = trim_nul(raw.to_string());
    let s = s.trim_matches(|c| c == ' ' || c == '\t');

    if let Some(rest) = s.strip_prefix('(') {
        if let Some(close) = rest.find(')') {
            if let Some(name) = rest[..close]
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(genre_name)
            {
                return name.to_string();
            }
        }
    }
    s.to_string()
}

/// Fill still-empty fields from a trailing ID3v1(.1) tag.
pub fn read_id3v1(path: &Path, info: &mut TrackInfo) {
    let Ok(mut f) = File::open(path) else {
        return;
    };
    read_id3v1_from(&mut f, info);
}

pub(crate) fn read_id3v1_from<R: Read + Seek>(r: &mut R, info: &mut TrackInfo) {
    if r.seek(SeekFrom::End(-(ID3V1_LEN as i64))).is_err() {
        return;
    }
    let mut tag = [0u8; ID3V1_LEN];
    if r.read_exact(&mut tag).is_err() || &tag[..3] != b"TAG" {
        return;
    }

    let field = |range: std::ops::Range<usize>| {
        latin1(&tag[range])
            .trim_end_matches([' ', '\0'])
            .to_string()
    };

    let fill = |dst: &mut String, v: String| {
        if dst.is_empty() && !v.is_empty() {
            *dst = v;
        }
    };
    fill(&mut info.title, field(3..33));
    fill(&mut info.artist, field(33..63));
    fill(&mut info.album, field(63..93));
    fill(&mut info.year, field(93..97));
    fill(&mut info.comment, field(97..125));

    // v1.1: a zero byte before the last comment byte marks it as a track number.
    if tag[125] == 0 && tag[126] != 0 && info.track_number == 0 {
        info.track_number = u32::from(tag[126]);
    }

    let genre = tag[127];
    if info.genre.is_empty() && genre != 0xFF {
        info.genre = genre_name(usize::from(genre))
            .map(str::to_string)
            .unwrap_or_else(|| genre.to_string());
    }
}
