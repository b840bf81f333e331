//! State shared between the update loop and backend workers
//!
//! Owned by the backend manager and handed out as `Arc<SharedState>`.
//! Every field sits behind a lock or an atomic so workers and the caller's
//! thread never alias a raw mutable reference.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last utterance details used to suppress immediate repeats
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupState {
    pub last_speaker: String,
    pub last_quest_text: String,
}

#[derive(Debug, Default)]
pub struct SharedState {
    dedup: Mutex<DedupState>,

    /// Sticky: set while the streaming server could not bind its port
    bind_failed: AtomicBool,
    /// Set once the current bind failure has been handed to the user
    bind_notified: AtomicBool,
    bind_port: AtomicU16,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn dedup(&self) -> MutexGuard<'_, DedupState> {
        self.dedup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current dedup state
    pub fn snapshot(&self) -> DedupState {
        self.dedup().clone()
    }

    pub fn is_same_speaker(&self, speaker: &str) -> bool {
        self.dedup().last_speaker == speaker
    }

    pub fn set_last_speaker(&self, speaker: &str) {
        self.dedup().last_speaker = speaker.to_string();
    }

    pub fn is_duplicate_quest_text(&self, text: &str) -> bool {
        self.dedup().last_quest_text == text
    }

    pub fn set_last_quest_text(&self, text: &str) {
        self.dedup().last_quest_text = text.to_string();
    }

    /// Forget the last speaker and quest text
    pub fn reset_dedup(&self) {
        *self.dedup() = DedupState::default();
    }

    /// Record that the streaming server failed to bind `port`
    ///
    /// Re-arms the one-time notification.
    pub fn record_bind_failure(&self, port: u16) {
        self.bind_port.store(port, Ordering::SeqCst);
        self.bind_notified.store(false, Ordering::SeqCst);
        self.bind_failed.store(true, Ordering::SeqCst);
    }

    /// Clear the sticky flag after a successful bind
    pub fn clear_bind_failure(&self) {
        self.bind_failed.store(false, Ordering::SeqCst);
        self.bind_notified.store(false, Ordering::SeqCst);
    }

    /// Is the streaming server currently failed to bind?
    pub fn failed_to_bind(&self) -> bool {
        self.bind_failed.load(Ordering::SeqCst)
    }

    /// Take the pending bind-failure notification, if any
    ///
    /// Returns the port the first time it is called after a failure and
    /// `None` afterwards, while the failure itself stays recorded.
    pub fn take_bind_failure(&self) -> Option<u16> {
        if !self.bind_failed.load(Ordering::SeqCst) {
            return None;
        }
        if self.bind_notified.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.bind_port.load(Ordering::SeqCst))
    }
}
