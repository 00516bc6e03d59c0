use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error};

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Owner of the playback thread handle.
///
/// Joins are bounded: a thread that does not finish in time is detached,
/// logged and counted instead of blocking the caller. It still holds its own
/// stop signal and leaves at its next check.
pub(super) struct Runner {
    name: String,
    stack_size: usize,
    join_timeout: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
    spawned: AtomicUsize,
    detached: AtomicUsize,
}

impl Runner {
    pub fn new(name: String, stack_size: usize, join_timeout: Duration) -> Self {
        Self {
            name,
            stack_size,
            join_timeout,
            handle: Mutex::new(None),
            spawned: AtomicUsize::new(0),
            detached: AtomicUsize::new(0),
        }
    }

    fn handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn spawn<F>(&self, body: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut builder = thread::Builder::new().name(self.name.clone());
        if self.stack_size > 0 {
            builder = builder.stack_size(self.stack_size);
        }
        let handle = builder.spawn(body)?;
        let n = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(thread = %self.name, spawned = n, "playback thread started");
        *self.handle() = Some(handle);
        Ok(())
    }

    /// Wait up to the join timeout for the current thread to finish.
    ///
    /// Called from the playback thread itself (auto-advance), the handle is
    /// released without waiting.
    pub fn join_bounded(&self) {
        let Some(handle) = self.handle().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            debug!("playback thread is restarting itself, not joining");
            return;
        }

        let deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                let n = self.detached.fetch_add(1, Ordering::SeqCst) + 1;
                error!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    detached = n,
                    "playback thread did not stop in time, detaching"
                );
                return;
            }
            thread::sleep(JOIN_POLL.min(deadline - now));
        }
        if handle.join().is_err() {
            error!("playback thread panicked");
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn detached_threads(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}
