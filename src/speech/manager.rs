//! Owner of the active speech backend
//!
//! The manager resolves voices, applies the single-utterance policy,
//! submits requests to whichever backend is active and swaps backends
//! safely. None of its methods block on synthesis: backends do their slow
//! work on their own threads and report completion through tickets.

use super::activity::{BackendState, SpeechActivity};
use super::backend::{create_backend, Backend, BackendKind, SpeechRequest};
use crate::state::{BackendSettings, SharedState};
use crate::voice::{Gender, VoicePresetResolver};
use crate::{BackendError, BackendSwitchError};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// What happened to a `say` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SayOutcome {
    /// Handed to the active backend
    Submitted,
    /// Dropped without reaching audio
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Nothing left to say after cleanup
    EmptyText,
    /// `disallow_multiple_say` is on and the backend is speaking
    Busy,
    /// No backend is active (a switch failed)
    NoBackend,
    /// No voice preset exists at all
    NoVoice,
    /// Provider limit exceeded
    TooLarge,
    /// Backend rejected the request
    BackendFailed,
}

/// Owns the active backend and the state shared with its workers
pub struct BackendManager {
    backend: Option<Box<dyn Backend>>,
    activity: Arc<SpeechActivity>,
    shared: Arc<SharedState>,
    voices: VoicePresetResolver,
    disallow_multiple_say: bool,
}

impl BackendManager {
    /// Create a manager with the backend for `kind` already active
    ///
    /// A backend that fails to start leaves the manager without one;
    /// the failure is logged and `say` drops requests until a switch
    /// succeeds.
    pub fn new(kind: BackendKind, settings: &BackendSettings, voices: VoicePresetResolver) -> Self {
        let mut manager = Self::empty(voices);
        if let Err(e) = manager.switch_backend(kind, settings) {
            error!("{}", e);
        }
        manager
    }

    /// Create a manager around an already constructed backend
    pub fn with_backend(backend: Box<dyn Backend>, voices: VoicePresetResolver) -> Self {
        let mut manager = Self::empty(voices);
        manager.backend = Some(backend);
        manager
    }

    fn empty(voices: VoicePresetResolver) -> Self {
        Self {
            backend: None,
            activity: SpeechActivity::new(),
            shared: Arc::new(SharedState::new()),
            voices,
            disallow_multiple_say: false,
        }
    }

    /// Speak `text` with the preset resolved for `gender`
    ///
    /// Best effort: the request may be dropped by policy or failure, in
    /// which case the reason is logged and returned.
    pub fn say(&mut self, gender: Gender, text: &str) -> SayOutcome {
        if text.trim().is_empty() {
            return SayOutcome::Dropped(DropReason::EmptyText);
        }

        let voice = match self.voices.resolve(gender) {
            Ok(preset) => preset.clone(),
            Err(e) => {
                error!("Cannot speak: {}", e);
                return SayOutcome::Dropped(DropReason::NoVoice);
            }
        };

        let backend = match self.backend.as_mut() {
            Some(backend) => backend,
            None => {
                warn!("No speech backend is active, dropping utterance");
                return SayOutcome::Dropped(DropReason::NoBackend);
            }
        };

        if self.disallow_multiple_say && self.activity.is_speaking() {
            debug!("Already speaking, dropping: {}", text);
            return SayOutcome::Dropped(DropReason::Busy);
        }

        let ticket = self.activity.begin();
        let request = SpeechRequest {
            gender,
            voice,
            text: text.to_string(),
        };

        match backend.synthesize(request, ticket) {
            Ok(()) => SayOutcome::Submitted,
            Err(e @ BackendError::RequestTooLarge { .. }) => {
                warn!("Dropping utterance: {}", e);
                SayOutcome::Dropped(DropReason::TooLarge)
            }
            Err(e) => {
                warn!("{} backend failed to accept utterance: {}", backend.kind(), e);
                SayOutcome::Dropped(DropReason::BackendFailed)
            }
        }
    }

    /// Stop the current utterance and anything queued behind it
    pub fn cancel_say(&mut self) {
        if self.activity.cancel() {
            debug!("Cancelled in-flight speech");
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.cancel();
        }
    }

    /// Replace the active backend
    ///
    /// The outgoing backend is cancelled and disposed, releasing its port
    /// or engine, before the incoming one is constructed. The manager is
    /// `Idle` afterwards whatever it was doing before.
    pub fn switch_backend(
        &mut self,
        kind: BackendKind,
        settings: &BackendSettings,
    ) -> Result<(), BackendSwitchError> {
        self.activity.cancel();
        if let Some(mut old) = self.backend.take() {
            info!("Switching speech backend from {} to {}", old.kind(), kind);
            old.cancel();
            old.dispose();
        }

        match create_backend(kind, settings, Arc::clone(&self.shared)) {
            Ok(backend) => {
                self.backend = Some(backend);
                Ok(())
            }
            Err(source) => Err(BackendSwitchError::Init { kind, source }),
        }
    }

    /// Re-create the active backend with new settings (e.g. a new port)
    pub fn restart_backend(&mut self, settings: &BackendSettings) -> Result<(), BackendSwitchError> {
        match self.active_kind() {
            Some(kind) => self.switch_backend(kind, settings),
            None => Ok(()),
        }
    }

    pub fn active_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    pub fn state(&self) -> BackendState {
        self.activity.state()
    }

    pub fn is_speaking(&self) -> bool {
        self.activity.is_speaking()
    }

    pub fn set_disallow_multiple_say(&mut self, disallow: bool) {
        self.disallow_multiple_say = disallow;
    }

    /// Replace the voice preset table and bindings
    pub fn set_voices(&mut self, voices: VoicePresetResolver) {
        self.voices = voices;
    }

    pub fn voices(&self) -> &VoicePresetResolver {
        &self.voices
    }

    /// State shared with backend workers (dedup, bind failure)
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Port of a bind failure not yet shown to the user
    ///
    /// Returns `Some` once per failure.
    pub fn take_bind_failure(&self) -> Option<u16> {
        self.shared.take_bind_failure()
    }
}

impl Drop for BackendManager {
    fn drop(&mut self) {
        self.activity.cancel();
        if let Some(mut backend) = self.backend.take() {
            backend.cancel();
            backend.dispose();
        }
    }
}
