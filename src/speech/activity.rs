//! Idle/Speaking tracking shared between the manager and backend workers
//!
//! Every submitted request holds a [`SpeechTicket`]. The backend is
//! `Speaking` while any current ticket is alive. Cancelling bumps the epoch,
//! which makes every outstanding ticket stale at once: stale tickets report
//! `is_current() == false` so workers skip or stop their audio, and their
//! completion no longer affects the state. Completion happens when the
//! ticket is dropped, so it runs exactly once even if a worker bails early.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Observable backend state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Idle,
    Speaking,
}

#[derive(Debug, Default)]
struct Inner {
    epoch: u64,
    pending: usize,
}

#[derive(Debug, Default)]
pub struct SpeechActivity {
    inner: Mutex<Inner>,
}

impl SpeechActivity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new request and move to `Speaking`
    pub fn begin(self: &Arc<Self>) -> SpeechTicket {
        let mut inner = self.lock();
        inner.pending += 1;
        SpeechTicket {
            activity: Arc::clone(self),
            epoch: inner.epoch,
        }
    }

    /// Invalidate every outstanding request and move to `Idle`
    ///
    /// Returns whether anything was in flight. Calling this while idle
    /// changes nothing observable.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.pending == 0 {
            return false;
        }
        inner.epoch += 1;
        inner.pending = 0;
        true
    }

    pub fn state(&self) -> BackendState {
        if self.lock().pending > 0 {
            BackendState::Speaking
        } else {
            BackendState::Idle
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state() == BackendState::Speaking
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    fn finish(&self, epoch: u64) {
        let mut inner = self.lock();
        // A cancel already accounted for stale tickets
        if inner.epoch == epoch && inner.pending > 0 {
            inner.pending -= 1;
        }
    }
}

/// Handle for one in-flight request; completes the request when dropped
#[derive(Debug)]
pub struct SpeechTicket {
    activity: Arc<SpeechActivity>,
    epoch: u64,
}

impl SpeechTicket {
    /// False once the request has been cancelled
    pub fn is_current(&self) -> bool {
        self.activity.is_current(self.epoch)
    }

    /// Mark the request complete
    pub fn finish(self) {}
}

impl Drop for SpeechTicket {
    fn drop(&mut self) {
        self.activity.finish(self.epoch);
    }
}
