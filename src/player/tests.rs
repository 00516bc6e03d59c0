use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::{TempDir, tempdir};

use super::*;
use crate::decode::{DecodeError, DecodedBlock, Mp3FrameDecoder, StreamDecoder, StreamInfo};
use crate::host::AudioCodec;
use crate::library::AudioFormat;
use crate::playlist::CACHE_VERSION;
use crate::testing::{Fakes, ScriptedDecoders, ScriptedMp3, mp3_frame, wav_bytes};

fn mono_block(out: &mut [i16], sample_rate: u32) -> DecodedBlock {
    let n = out.len().min(320);
    out[..n].fill(100);
    DecodedBlock {
        samples: n,
        info: StreamInfo {
            sample_rate,
            bits_per_sample: 16,
            channels: 1,
        },
    }
}

/// Stream that never ends on its own; each block takes a millisecond.
struct EndlessStream {
    rate: u32,
}

impl StreamDecoder for EndlessStream {
    fn decode(&mut self, out: &mut [i16]) -> std::result::Result<Option<DecodedBlock>, DecodeError> {
        thread::sleep(Duration::from_millis(1));
        Ok(Some(mono_block(out, self.rate)))
    }
}

struct EndlessDecoders;

impl DecoderFactory for EndlessDecoders {
    fn mp3_frame_decoder(&self) -> std::result::Result<Box<dyn Mp3FrameDecoder>, DecodeError> {
        Ok(Box::new(ScriptedMp3 { value: 1 }))
    }

    fn open_stream(
        &self,
        _format: AudioFormat,
        _file: std::fs::File,
    ) -> std::result::Result<Box<dyn StreamDecoder>, DecodeError> {
        Ok(Box::new(EndlessStream { rate: 16_000 }))
    }
}

/// 22.05 kHz stream that hangs for 400 ms on its third block, then runs on.
struct StallingStream {
    produced: usize,
    dropped: Arc<AtomicBool>,
}

impl StreamDecoder for StallingStream {
    fn decode(&mut self, out: &mut [i16]) -> std::result::Result<Option<DecodedBlock>, DecodeError> {
        if self.produced == 2 {
            thread::sleep(Duration::from_millis(400));
        }
        self.produced += 1;
        Ok(Some(mono_block(out, 22_050)))
    }
}

impl Drop for StallingStream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// AAC files stall, FLAC files play endlessly at 44.1 kHz.
struct StallingDecoders {
    dropped: Arc<AtomicBool>,
}

impl DecoderFactory for StallingDecoders {
    fn mp3_frame_decoder(&self) -> std::result::Result<Box<dyn Mp3FrameDecoder>, DecodeError> {
        Ok(Box::new(ScriptedMp3 { value: 1 }))
    }

    fn open_stream(
        &self,
        format: AudioFormat,
        _file: std::fs::File,
    ) -> std::result::Result<Box<dyn StreamDecoder>, DecodeError> {
        if format == AudioFormat::Aac {
            Ok(Box::new(StallingStream {
                produced: 0,
                dropped: self.dropped.clone(),
            }))
        } else {
            Ok(Box::new(EndlessStream { rate: 44_100 }))
        }
    }
}

fn test_settings() -> Settings {
    let mut s = Settings::default();
    s.playback.interrupt_backoff_ms = 1;
    s.playback.busy_backoff_ms = 1;
    s.playback.join_timeout_ms = 2_000;
    s.playback.history_capacity = 100_000;
    s
}

struct Rig {
    _dir: TempDir,
    fakes: Fakes,
    player: MusicPlayer,
}

fn rig(files: &[(&str, Vec<u8>)], decoders: Arc<dyn DecoderFactory>, settings: Settings) -> Rig {
    let dir = tempdir().unwrap();
    for (name, bytes) in files {
        fs::write(dir.path().join(name), bytes).unwrap();
    }
    let fakes = Fakes::new(dir.path());
    let player = MusicPlayer::with_decoders(fakes.host(), &settings, decoders);
    Rig {
        _dir: dir,
        fakes,
        player,
    }
}

fn scripted() -> Arc<dyn DecoderFactory> {
    Arc::new(ScriptedDecoders::default())
}

fn small_wav() -> Vec<u8> {
    wav_bytes(16_000, 1, 400, 7)
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

/// `stop()` is ignored while a thread is still preparing, so keep asking.
fn stop_until_stopped(player: &MusicPlayer) {
    wait_until("stop", || {
        player.stop();
        player.state() == PlayerState::Stopped
    });
}

#[test]
fn pause_and_stop_are_noops_when_idle() {
    let r = rig(&[("a.wav", small_wav())], scripted(), test_settings());
    r.player.pause();
    assert_eq!(r.player.state(), PlayerState::Stopped);
    r.player.stop();
    assert_eq!(r.player.state(), PlayerState::Stopped);
    assert_eq!(r.player.spawn_count(), 0);
}

#[test]
fn play_on_empty_storage_fails() {
    let r = rig(&[("notes.txt", b"hello".to_vec())], scripted(), test_settings());
    assert!(matches!(r.player.play(), Err(Error::EmptyPlaylist)));
    assert_eq!(r.player.state(), PlayerState::Stopped);
    assert_eq!(r.player.spawn_count(), 0);
}

#[test]
fn pause_then_play_resumes_without_a_new_thread() {
    let r = rig(&[("a.flac", b"x".to_vec())], Arc::new(EndlessDecoders), test_settings());
    r.player.play().unwrap();
    wait_until("playing", || r.player.state() == PlayerState::Playing);
    wait_until("audio", || r.fakes.coordinator.packet_count() > 0);

    r.player.pause();
    assert!(r.player.is_paused());
    thread::sleep(Duration::from_millis(20));
    let frozen = r.fakes.coordinator.packet_count();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(r.fakes.coordinator.packet_count(), frozen);

    r.player.play().unwrap();
    assert_eq!(r.player.state(), PlayerState::Playing);
    assert_eq!(r.player.spawn_count(), 1);
    wait_until("audio after resume", || r.fakes.coordinator.packet_count() > frozen);

    r.player.stop();
    assert_eq!(r.player.state(), PlayerState::Stopped);
    assert_eq!(r.player.position_ms(), 0);
    assert_eq!(r.player.detached_threads(), 0);
}

#[test]
fn stop_while_paused_releases_the_thread() {
    let r = rig(&[("a.flac", b"x".to_vec())], Arc::new(EndlessDecoders), test_settings());
    r.player.play().unwrap();
    wait_until("playing", || r.player.state() == PlayerState::Playing);
    r.player.pause();

    let started = Instant::now();
    r.player.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(r.player.state(), PlayerState::Stopped);
    assert_eq!(r.player.detached_threads(), 0);
    assert_eq!(r.fakes.display.starts(), 1);
    assert_eq!(r.fakes.display.stops(), 1);
    assert_eq!(r.fakes.display.outstanding(), 0);
}

#[test]
fn detached_thread_leaves_the_next_track_alone() {
    let dropped = Arc::new(AtomicBool::new(false));
    let mut settings = test_settings();
    settings.playback.join_timeout_ms = 30;
    let r = rig(
        &[("a.aac", b"x".to_vec()), ("b.flac", b"x".to_vec())],
        Arc::new(StallingDecoders {
            dropped: dropped.clone(),
        }),
        settings,
    );

    r.player.play().unwrap();
    wait_until("first track stalls", || r.fakes.coordinator.packet_count() >= 2);
    assert_eq!(r.fakes.codec.output_sample_rate(), 22_050);

    r.player.set_track(1).unwrap();
    assert_eq!(r.player.detached_threads(), 1);
    wait_until("second track", || r.fakes.codec.output_sample_rate() == 44_100);
    wait_until("stalled thread done", || dropped.load(Ordering::SeqCst));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(r.player.state(), PlayerState::Playing);
    assert_eq!(r.fakes.codec.output_sample_rate(), 44_100);
    assert_eq!(r.fakes.codec.rate_calls(), vec![Some(22_050), Some(44_100)]);
    assert_eq!(r.fakes.display.stops(), 0);

    stop_until_stopped(&r.player);
    assert_eq!(r.fakes.display.stops(), 1);
    assert_eq!(r.fakes.display.outstanding(), 0);
    assert_eq!(r.fakes.codec.output_sample_rate(), 16_000);
}

#[test]
fn repeat_all_cycles_through_mixed_formats() {
    let mut settings = test_settings();
    settings.playback.repeat = crate::config::RepeatModeSetting::RepeatAll;
    let r = rig(
        &[("A.mp3", mp3_frame(false)), ("B.wav", small_wav()), ("C.flac", b"x".to_vec())],
        scripted(),
        settings,
    );
    assert_eq!(r.player.repeat(), RepeatMode::RepeatAll);

    r.player.play().unwrap();
    let store = r.player.playlist();
    wait_until("two full rounds", || store.play_history().len() >= 7);
    stop_until_stopped(&r.player);

    let history = store.play_history();
    for (i, index) in history.iter().enumerate() {
        assert_eq!(*index, i % 3, "history {history:?}");
    }

    // Stats found while decoding are written back to the catalog.
    let a = store.track_info(0).unwrap();
    assert_eq!(a.bitrate_kbps, 128);
    assert_eq!(a.duration_ms, 26);

    assert!(r.fakes.display.infos().len() >= 7);
    assert_eq!(r.fakes.display.outstanding(), 0);
    assert_eq!(r.fakes.codec.output_sample_rate(), 16_000);
    assert_eq!(r.player.detached_threads(), 0);
}

#[test]
fn playback_claims_the_device() {
    let r = rig(&[("a.wav", small_wav())], scripted(), test_settings());
    r.player.play().unwrap();
    wait_until("end of playlist", || {
        r.player.state() == PlayerState::Stopped && r.player.playlist().play_history().len() == 1
    });

    let coordinator = &r.fakes.coordinator;
    assert_eq!(coordinator.stop_listening_calls(), 1);
    assert_eq!(coordinator.wake_word_calls(), vec![false]);
    assert_eq!(coordinator.states_set(), vec![DeviceState::Speaking]);
    // The decode loop saw the device still speaking and toggled it back.
    assert!(coordinator.toggles() >= 1);
    assert!(coordinator.packet_count() > 0);
}

#[test]
fn repeat_none_stops_after_the_last_track() {
    let r = rig(&[("a.wav", small_wav()), ("b.wav", small_wav())], scripted(), test_settings());
    r.player.play().unwrap();
    wait_until("end of playlist", || {
        r.player.state() == PlayerState::Stopped && r.player.playlist().play_history().len() == 2
    });
    assert_eq!(r.player.playlist().play_history(), vec![0, 1]);
    assert_eq!(r.player.current_index(), Some(1));
    assert_eq!(r.player.spawn_count(), 2);
}

#[test]
fn repeat_one_replays_the_same_track() {
    let mut settings = test_settings();
    settings.playback.repeat = crate::config::RepeatModeSetting::RepeatOne;
    let r = rig(&[("a.wav", small_wav()), ("b.wav", small_wav())], scripted(), settings);
    r.player.play().unwrap();
    wait_until("three plays", || r.player.playlist().play_history().len() >= 3);
    stop_until_stopped(&r.player);
    assert!(r.player.playlist().play_history().iter().all(|&i| i == 0));
}

#[test]
fn failed_track_does_not_auto_advance() {
    let r = rig(&[("a_bad.ogg", b"OggS".to_vec()), ("b.wav", small_wav())], scripted(), test_settings());
    r.player.play().unwrap();
    wait_until("error", || r.player.state() == PlayerState::Error);
    thread::sleep(Duration::from_millis(30));

    assert_eq!(r.player.state(), PlayerState::Error);
    assert_eq!(r.player.playlist().play_history(), vec![0]);
    assert_eq!(r.player.current_index(), Some(0));
    assert_eq!(r.fakes.coordinator.packet_count(), 0);

    // Stop from Error is ignored; play starts over.
    r.player.stop();
    assert_eq!(r.player.state(), PlayerState::Error);
    r.player.next().unwrap();
    wait_until("next track done", || r.player.state() == PlayerState::Stopped);
    assert_eq!(r.player.playlist().play_history(), vec![0, 1]);
}

#[test]
fn next_while_paused_starts_the_next_track() {
    let r = rig(
        &[("a.flac", b"x".to_vec()), ("b.flac", b"x".to_vec())],
        Arc::new(EndlessDecoders),
        test_settings(),
    );
    r.player.play().unwrap();
    wait_until("playing", || r.player.state() == PlayerState::Playing);
    r.player.pause();

    r.player.next().unwrap();
    assert_eq!(r.player.current_index(), Some(1));
    assert_eq!(r.player.spawn_count(), 2);
    wait_until("playing again", || r.player.state() == PlayerState::Playing);
    assert_eq!(r.player.current_track().as_deref(), Some("b"));

    r.player.prev().unwrap();
    wait_until("first track", || r.player.playlist().play_history() == vec![0, 1, 0]);
    stop_until_stopped(&r.player);
}

#[test]
fn shuffle_skips_never_repeat_the_current_track() {
    let files: Vec<(String, Vec<u8>)> = (0..4).map(|i| (format!("t{i}.flac"), b"x".to_vec())).collect();
    let files: Vec<(&str, Vec<u8>)> = files.iter().map(|(n, b)| (n.as_str(), b.clone())).collect();
    let r = rig(&files, Arc::new(EndlessDecoders), test_settings());
    r.player.set_shuffle(true);
    assert!(r.player.shuffle());

    r.player.play().unwrap();
    let mut last = r.player.current_index().unwrap();
    for _ in 0..6 {
        r.player.next().unwrap();
        let now = r.player.current_index().unwrap();
        assert_ne!(now, last);
        last = now;
    }
    stop_until_stopped(&r.player);
}

#[test]
fn selection_errors_leave_playback_alone() {
    let r = rig(&[("alpha.wav", small_wav()), ("beta.wav", small_wav())], scripted(), test_settings());
    assert!(matches!(
        r.player.set_track(9),
        Err(Error::IndexOutOfRange { index: 9, len: 2 })
    ));
    assert!(matches!(r.player.play_by_name("no such song"), Err(Error::NoMatch(_))));
    assert_eq!(r.player.spawn_count(), 0);

    r.player.play_by_name("BETA").unwrap();
    assert_eq!(r.player.current_index(), Some(1));
    wait_until("done", || r.player.state() == PlayerState::Stopped);
}

#[test]
fn play_directory_switches_root() {
    let r = rig(&[("top.wav", small_wav())], scripted(), test_settings());
    let sub = r._dir.path().join("Jazz");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("x.wav"), small_wav()).unwrap();
    fs::create_dir(r._dir.path().join("empty")).unwrap();

    assert!(matches!(r.player.play_directory("empty"), Err(Error::EmptyPlaylist)));
    assert!(matches!(r.player.play_directory("missing"), Err(Error::InvalidDirectory(_))));

    r.player.play_directory("jazz").unwrap();
    wait_until("done", || {
        r.player.state() == PlayerState::Stopped && r.player.playlist().play_history().len() == 1
    });
    assert_eq!(r.player.current_track().as_deref(), Some("x"));
}

fn write_genre_cache(root: &Path, tracks: &[(&str, &str)]) {
    let records: Vec<_> = tracks
        .iter()
        .map(|(name, genre)| {
            let path = root.join(name);
            fs::write(&path, wav_bytes(16_000, 1, 400, 7)).unwrap();
            json!({ "path": path.to_string_lossy(), "genre": genre })
        })
        .collect();
    let doc = json!({ "version": CACHE_VERSION, "tracks": records });
    fs::write(root.join("playlist.json"), serde_json::to_vec(&doc).unwrap()).unwrap();
}

#[test]
fn genre_playlist_plays_matching_tracks_in_order() {
    let r = rig(&[], scripted(), test_settings());
    write_genre_cache(r._dir.path(), &[("r1.wav", "Rock"), ("j.wav", "Jazz"), ("r2.wav", "Rock")]);

    assert_eq!(r.player.build_genre_playlist("Rock").unwrap(), 2);
    assert!(matches!(r.player.build_genre_playlist("Polka"), Err(Error::NoMatch(_))));
    assert_eq!(r.player.genre_playlist().unwrap().indices, vec![0, 2]);

    r.player.play_genre_index(0).unwrap();
    wait_until("genre list done", || {
        r.player.state() == PlayerState::Stopped && r.player.playlist().play_history().len() == 2
    });
    assert_eq!(r.player.playlist().play_history(), vec![0, 2]);
    assert!(!r.player.play_next_genre().unwrap());
    assert!(r.player.play_genre_index(5).is_err());
}

#[test]
fn dropping_the_player_stops_playback() {
    let r = rig(&[("a.flac", b"x".to_vec())], Arc::new(EndlessDecoders), test_settings());
    r.player.play().unwrap();
    wait_until("playing", || r.player.state() == PlayerState::Playing);

    let Rig { _dir, fakes, player } = r;
    drop(player);
    let after = fakes.coordinator.packet_count();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(fakes.coordinator.packet_count(), after);
    assert_eq!(fakes.display.stops(), 1);
}

#[test]
fn progress_strings() {
    assert_eq!(format_ms(0), "00:00");
    assert_eq!(format_ms(999), "00:00");
    assert_eq!(format_ms(61_000), "01:01");
    assert_eq!(format_ms(3_599_000), "59:59");
    assert_eq!(format_ms(3_661_000), "01:01:01");

    let r = rig(&[("a.wav", small_wav())], scripted(), test_settings());
    assert_eq!(r.player.progress(), TrackProgress::default());
    assert_eq!(r.player.current_time_string(), "00:00");
    assert_eq!(r.player.duration_string(), "00:00");
}
