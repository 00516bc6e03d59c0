//! Playback controller.
//!
//! [`MusicPlayer`] owns the playlist store, the player state machine and the
//! single playback thread. Transport calls run on the caller's thread and talk
//! to the playback thread only through the per-play session signals, the
//! packed state cell and the playlist store's own locks.

mod runner;
mod signals;
mod thread;
mod types;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{DecodeSettings, DisplaySettings, Settings};
use crate::decode::{DecoderFactory, Progress, SymphoniaDecoders, Transport};
use crate::error::{Error, Result};
use crate::host::{DeviceState, Host};
use crate::library::TrackInfo;
use crate::playlist::{GenrePlaylist, PlaylistStore};

use runner::Runner;
use signals::{Session, StateCell};

pub use types::{PlayerState, RepeatMode, TrackProgress, format_ms};

const CONTROL_RETRY: Duration = Duration::from_millis(5);

/// State shared between the controller handle and its playback thread.
struct Inner {
    host: Host,
    store: PlaylistStore,
    decoders: Arc<dyn DecoderFactory>,
    decode: DecodeSettings,
    display: DisplaySettings,
    interrupt_backoff: Duration,
    busy_backoff: Duration,

    /// Lock-free; writes are generation-checked.
    state: Arc<StateCell>,
    /// Guarded by its own mutex; replaced only while `control` is held.
    session: Mutex<Option<Arc<Session>>>,
    runner: Runner,
    /// Serializes start and stop so only one playback thread is ever current.
    control: Mutex<()>,

    shuffle: AtomicBool,
    repeat: AtomicU8,
    progress: Progress,
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        self.session().clone()
    }

    fn shuffle(&self) -> bool {
        self.shuffle.load(Ordering::Relaxed)
    }

    fn repeat(&self) -> RepeatMode {
        RepeatMode::from_u8(self.repeat.load(Ordering::Relaxed))
    }

    /// Make sure there is something to play, loading the catalog once if needed.
    fn ensure_loaded(&self) -> Result<()> {
        if !self.store.is_empty() {
            return Ok(());
        }
        info!("playlist empty, loading track list");
        self.store.load_track_list()?;
        if self.store.is_empty() {
            warn!("no tracks to play");
            return Err(Error::EmptyPlaylist);
        }
        Ok(())
    }

    fn start(self: &Arc<Self>, resume_paused: bool) -> Result<()> {
        let _control = self.control();
        self.start_locked(resume_paused)
    }

    /// Start playback of the selected track. Requires `control`.
    fn start_locked(self: &Arc<Self>, resume_paused: bool) -> Result<()> {
        self.ensure_loaded()?;

        if resume_paused && self.state.get() == PlayerState::Paused {
            if let Some(session) = self.current_session() {
                session.resume();
                session.transition(PlayerState::Paused, PlayerState::Playing);
                info!("playback resumed");
                return Ok(());
            }
        }

        if let Some(old) = self.session().take() {
            old.request_stop();
        }
        self.runner.join_bounded();

        let coordinator = &self.host.coordinator;
        coordinator.stop_listening();
        coordinator.enable_wake_word_detection(false);
        coordinator.set_device_state(DeviceState::Speaking);

        let generation = self.state.force(PlayerState::Preparing);
        let session = Arc::new(Session::new(generation, self.state.clone()));
        *self.session() = Some(session.clone());

        let inner = Arc::clone(self);
        if let Err(e) = self.runner.spawn(move || thread::run(inner, session)) {
            error!(error = %e, "failed to start playback thread");
            self.session().take();
            self.state.force(PlayerState::Error);
            return Err(Error::ThreadSpawn(e));
        }
        Ok(())
    }

    /// Auto-advance entry point, called from the playback thread that owns `session`.
    ///
    /// Gives up as soon as the session is stopped, which is also how a
    /// concurrent `play()` or `stop()` that holds `control` tells it to go away.
    fn play_from_thread(self: &Arc<Self>, session: &Session) {
        loop {
            if session.stop_requested() {
                session.set_state(PlayerState::Stopped);
                return;
            }
            let guard = match self.control.try_lock() {
                Ok(g) => g,
                Err(TryLockError::Poisoned(p)) => p.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    std::thread::sleep(CONTROL_RETRY);
                    continue;
                }
            };
            if session.stop_requested() {
                session.set_state(PlayerState::Stopped);
                return;
            }
            if let Err(e) = self.start_locked(false) {
                warn!(error = %e, "auto-advance failed");
            }
            drop(guard);
            return;
        }
    }

    fn pause(&self) {
        let _control = self.control();
        if self.state.get() != PlayerState::Playing {
            info!(state = ?self.state.get(), "pause ignored, not playing");
            return;
        }
        if let Some(session) = self.current_session() {
            session.pause();
            if session.transition(PlayerState::Playing, PlayerState::Paused) {
                info!("playback paused");
            }
        }
    }

    fn stop(&self) {
        let _control = self.control();
        let state = self.state.get();
        if matches!(state, PlayerState::Stopped | PlayerState::Error | PlayerState::Preparing) {
            warn!(?state, "stop ignored");
            return;
        }
        if let Some(session) = self.session().take() {
            session.request_stop();
        }
        self.runner.join_bounded();
        self.state.force(PlayerState::Stopped);
        self.progress.reset_position();
        info!("playback stopped");
    }

    /// Unconditional stop used on drop.
    fn shutdown(&self) {
        let _control = self.control();
        if let Some(session) = self.session().take() {
            session.request_stop();
        }
        self.runner.join_bounded();
        if self.state.get().is_playing() {
            self.state.force(PlayerState::Stopped);
        }
    }
}

/// Music player for one storage mount.
///
/// Every method takes `&self`; the player can be shared between an input
/// task and a UI task behind an `Arc`.
pub struct MusicPlayer {
    inner: Arc<Inner>,
}

impl MusicPlayer {
    /// Player with the default symphonia codecs.
    pub fn new(host: Host, settings: &Settings) -> Self {
        Self::with_decoders(host, settings, Arc::new(SymphoniaDecoders))
    }

    pub fn with_decoders(host: Host, settings: &Settings, decoders: Arc<dyn DecoderFactory>) -> Self {
        let playback = &settings.playback;
        let store = PlaylistStore::new(
            host.mount.clone(),
            settings.library.clone(),
            playback.history_capacity,
        );
        let runner = Runner::new(
            playback.thread_name.clone(),
            playback.thread_stack_size,
            Duration::from_millis(playback.join_timeout_ms),
        );

        Self {
            inner: Arc::new(Inner {
                host,
                store,
                decoders,
                decode: settings.decode.clone(),
                display: settings.display.clone(),
                interrupt_backoff: Duration::from_millis(playback.interrupt_backoff_ms),
                busy_backoff: Duration::from_millis(playback.busy_backoff_ms),
                state: Arc::new(StateCell::default()),
                session: Mutex::new(None),
                runner,
                control: Mutex::new(()),
                shuffle: AtomicBool::new(playback.shuffle),
                repeat: AtomicU8::new(RepeatMode::from(playback.repeat) as u8),
                progress: Progress::default(),
            }),
        }
    }

    /// The catalog behind this player, for browsing and search.
    pub fn playlist(&self) -> &PlaylistStore {
        &self.inner.store
    }

    pub fn load_track_list(&self) -> Result<usize> {
        self.inner.store.load_track_list()
    }

    pub fn rebuild_from_storage(&self) -> Result<usize> {
        self.inner.store.rebuild_from_storage()
    }

    pub fn set_directory(&self, relative: &str) -> Result<usize> {
        self.inner.store.set_directory(relative)
    }

    /// Start playing the selected track, or resume if paused.
    pub fn play(&self) -> Result<()> {
        self.inner.start(true)
    }

    /// Pause; only effective while playing.
    pub fn pause(&self) {
        self.inner.pause();
    }

    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Skip forward: the next index, or a random other one when shuffling.
    pub fn next(&self) -> Result<()> {
        self.skip(1)
    }

    pub fn prev(&self) -> Result<()> {
        self.skip(-1)
    }

    fn skip(&self, direction: isize) -> Result<()> {
        self.inner.ensure_loaded()?;
        let index = self.inner.store.step(direction, self.shuffle())?;
        info!(index, direction, "skipping");
        self.inner.start(false)
    }

    pub fn set_track(&self, index: usize) -> Result<()> {
        self.inner.ensure_loaded()?;
        self.inner.store.select(index)?;
        self.inner.start(false)
    }

    /// Play the first track whose name or path matches `keyword`.
    pub fn play_by_name(&self, keyword: &str) -> Result<()> {
        self.inner.ensure_loaded()?;
        let Some(index) = self.inner.store.find_track_index_by_keyword(keyword) else {
            warn!(keyword, "no track matches");
            return Err(Error::NoMatch(keyword.to_string()));
        };
        self.inner.store.select(index)?;
        self.inner.start(false)
    }

    /// Switch to a directory under the mount point and play its first track.
    pub fn play_directory(&self, relative: &str) -> Result<()> {
        if self.inner.store.set_directory(relative)? == 0 {
            warn!(directory = relative, "directory has no playable tracks");
            return Err(Error::EmptyPlaylist);
        }
        self.inner.store.select(0)?;
        self.inner.start(false)
    }

    pub fn build_genre_playlist(&self, genre: &str) -> Result<usize> {
        self.inner.ensure_loaded()?;
        self.inner.store.build_genre_playlist(genre)
    }

    pub fn genre_playlist(&self) -> Option<GenrePlaylist> {
        self.inner.store.genre_playlist()
    }

    pub fn play_genre_index(&self, pos: usize) -> Result<()> {
        self.inner.store.select_genre_position(pos)?;
        self.inner.start(false)
    }

    /// Play the next entry of the genre playlist. `Ok(false)` at its end.
    pub fn play_next_genre(&self) -> Result<bool> {
        match self.inner.store.advance_genre() {
            Some(_) => self.inner.start(false).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn set_shuffle(&self, enabled: bool) {
        self.inner.shuffle.store(enabled, Ordering::Relaxed);
        info!(enabled, "shuffle");
    }

    pub fn shuffle(&self) -> bool {
        self.inner.shuffle()
    }

    pub fn set_repeat(&self, mode: RepeatMode) {
        self.inner.repeat.store(mode as u8, Ordering::Relaxed);
        info!(?mode, "repeat mode");
    }

    pub fn repeat(&self) -> RepeatMode {
        self.inner.repeat()
    }

    pub fn state(&self) -> PlayerState {
        self.inner.state.get()
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlayerState::Paused
    }

    pub fn current_track(&self) -> Option<String> {
        self.inner.store.current_track()
    }

    pub fn current_track_path(&self) -> Option<PathBuf> {
        self.inner.store.current_track_path()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.inner.store.current_index()
    }

    pub fn search_tracks(&self, keyword: &str) -> Vec<TrackInfo> {
        self.inner.store.search_tracks(keyword)
    }

    pub fn suggest_next_tracks(&self, max: usize) -> Vec<TrackInfo> {
        self.inner.store.suggest_next_tracks(max)
    }

    pub fn suggest_similar_to(&self, name_or_path: &str, max: usize) -> Vec<TrackInfo> {
        self.inner.store.suggest_similar_to(name_or_path, max)
    }

    pub fn progress(&self) -> TrackProgress {
        TrackProgress {
            position_ms: self.inner.progress.position_ms(),
            duration_ms: self.inner.progress.duration_ms(),
        }
    }

    pub fn position_ms(&self) -> u64 {
        self.inner.progress.position_ms()
    }

    pub fn duration_ms(&self) -> u64 {
        self.inner.progress.duration_ms()
    }

    /// Bitrate of the last decoded MP3 frame; zero for other formats.
    pub fn bitrate_kbps(&self) -> u32 {
        self.inner.progress.bitrate_kbps()
    }

    pub fn duration_string(&self) -> String {
        format_ms(self.duration_ms())
    }

    pub fn current_time_string(&self) -> String {
        format_ms(self.position_ms())
    }

    /// Playback threads started so far.
    pub fn spawn_count(&self) -> usize {
        self.inner.runner.spawn_count()
    }

    /// Playback threads abandoned after a join timeout.
    pub fn detached_threads(&self) -> usize {
        self.inner.runner.detached_threads()
    }
}

impl Drop for MusicPlayer {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests;
