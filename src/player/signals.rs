use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::decode::Transport;

use super::types::PlayerState;

/// Player state tagged with the generation of the session allowed to change it.
///
/// Packed as `generation << 8 | state`. [`force`](Self::force) starts a new
/// generation; [`set`](Self::set) and [`transition`](Self::transition) only
/// succeed for the current one, so a detached thread from an earlier
/// `play()` can never overwrite the state of a later one.
#[derive(Debug, Default)]
pub(super) struct StateCell(AtomicU64);

fn pack(generation: u64, state: PlayerState) -> u64 {
    (generation << 8) | state as u64
}

impl StateCell {
    pub fn get(&self) -> PlayerState {
        PlayerState::from_u8((self.0.load(Ordering::Acquire) & 0xFF) as u8)
    }

    pub fn generation(&self) -> u64 {
        self.0.load(Ordering::Acquire) >> 8
    }

    /// Set `state` under a fresh generation and return that generation.
    pub fn force(&self, state: PlayerState) -> u64 {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some(pack((cur >> 8) + 1, state)))
            .unwrap_or_else(|cur| cur);
        (prev >> 8) + 1
    }

    pub fn set(&self, generation: u64, state: PlayerState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur >> 8 == generation).then(|| pack(generation, state))
            })
            .is_ok()
    }

    pub fn transition(&self, generation: u64, from: PlayerState, to: PlayerState) -> bool {
        self.0
            .compare_exchange(pack(generation, from), pack(generation, to), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Stop and pause signals of one playback thread.
///
/// `lock` guards nothing but the condition variable handshake; the flags are
/// atomics so the decode loop can poll them without locking.
pub(super) struct Session {
    generation: u64,
    state: Arc<StateCell>,
    stop: AtomicBool,
    paused: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl Session {
    pub fn new(generation: u64, state: Arc<StateCell>) -> Self {
        Self {
            generation,
            state,
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no later `play()` or `stop()` has superseded this session.
    pub fn is_current(&self) -> bool {
        self.state.generation() == self.generation
    }

    pub fn set_state(&self, state: PlayerState) -> bool {
        self.state.set(self.generation, state)
    }

    pub fn transition(&self, from: PlayerState, to: PlayerState) -> bool {
        self.state.transition(self.generation, from, to)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _g = self.guard();
        self.wake.notify_all();
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        let _g = self.guard();
        self.wake.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl Transport for Session {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn wait_while_paused(&self) -> bool {
        let mut g = self.guard();
        while self.is_paused() && !self.stop_requested() {
            g = self.wake.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        !self.stop_requested()
    }

    fn backoff(&self, d: Duration) {
        let g = self.guard();
        let _ = self.wake.wait_timeout_while(g, d, |_| !self.stop_requested());
    }
}
