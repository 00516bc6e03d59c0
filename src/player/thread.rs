use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::decode::{FftFeed, Pipeline, Transport};
use crate::library::now_playing_line;
use crate::playlist::Advance;

use super::Inner;
use super::signals::Session;
use super::types::{PlayerState, RepeatMode};

/// Body of one playback thread: play the selected track, then apply the
/// end-of-track policy.
pub(super) fn run(inner: Arc<Inner>, session: Arc<Session>) {
    let Some((index, track)) = inner.store.current_snapshot() else {
        warn!("nothing selected to play");
        session.set_state(PlayerState::Error);
        return;
    };
    if session.stop_requested() {
        return;
    }

    inner.store.record_play_history(index);
    session.set_state(PlayerState::Playing);
    inner.progress.reset();

    let display = inner.host.display.clone();
    if let Some(d) = &display {
        let text = now_playing_line(
            &track,
            &inner.display.now_playing_fields,
            &inner.display.now_playing_separator,
        );
        d.set_music_info(&text);
    }
    info!(index, path = %track.path.display(), name = %track.name, "now playing");

    let mut fft = FftFeed::new(display);
    fft.start();
    let result = {
        let mut pipeline = Pipeline {
            codec: inner.host.codec.as_ref(),
            coordinator: inner.host.coordinator.as_ref(),
            decoders: inner.decoders.as_ref(),
            transport: session.as_ref(),
            progress: &inner.progress,
            fft: &mut fft,
            settings: &inner.decode,
            interrupt_backoff: inner.interrupt_backoff,
            busy_backoff: inner.busy_backoff,
        };
        pipeline.play(&track, &mut |duration_ms: u64, bitrate_kbps: u32| {
            inner.store.update_track_stats(index, &track.path, duration_ms, bitrate_kbps);
        })
    };
    // A thread detached by a timed-out join finishes after its successor has
    // started; the display and codec belong to the successor by then.
    if session.is_current() {
        fft.stop();
        let codec = &inner.host.codec;
        if codec.output_sample_rate() != codec.original_output_sample_rate() {
            codec.set_output_sample_rate(None);
        }
    } else {
        debug!(index, generation = session.generation(), "superseded, leaving host state alone");
        fft.release();
    }

    if session.stop_requested() {
        debug!(index, "playback stopped mid-track");
        session.set_state(PlayerState::Stopped);
        return;
    }
    if let Err(e) = result {
        warn!(index, path = %track.path.display(), error = %e, "track failed");
        session.set_state(PlayerState::Error);
        return;
    }

    let next = match inner.store.advance_genre() {
        Some(i) => Advance::Play(i),
        None => {
            let repeat = inner.repeat();
            inner.store.advance_after_track(
                repeat == RepeatMode::RepeatOne,
                repeat == RepeatMode::RepeatAll,
                inner.shuffle(),
            )
        }
    };
    match next {
        Advance::Stop => {
            info!("end of playlist");
            session.set_state(PlayerState::Stopped);
        }
        Advance::Play(i) => {
            debug!(index = i, "advancing to next track");
            inner.play_from_thread(&session);
        }
    }
}
