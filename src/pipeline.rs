//! Speech dispatch pipeline
//!
//! Drives the whole path from an incoming chat line or dialogue box to the
//! active backend: normalization, trigger filtering, channel gating, speaker
//! announcement, replacements, gender lookup and finally
//! [`BackendManager::say`]. Also carries the user commands that toggle or
//! cancel speech.
//!
//! Every entry point returns promptly; nothing here waits on synthesis.

use crate::announce::{AnnouncePolicy, SpeakerAnnouncer};
use crate::speech::{BackendKind, BackendManager, SayOutcome};
use crate::state::{ChatTypesPreset, Config};
use crate::text::{normalize_text, ReplacementEngine};
use crate::triggers::TriggerFilter;
use crate::voice::{Gender, GenderResolver};
use crate::BackendSwitchError;
use log::{debug, info, warn};
use std::sync::Arc;

/// One chat line delivered by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Numeric chat channel code
    pub chat_type: u16,
    pub sender: Option<String>,
    pub text: String,
}

impl ChatLine {
    pub fn new(chat_type: u16, sender: Option<&str>, text: &str) -> Self {
        Self {
            chat_type,
            sender: sender.map(str::to_string),
            text: text.to_string(),
        }
    }
}

/// Current content of the on-screen dialogue box
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DialogueBox {
    pub speaker: String,
    pub text: String,
}

impl DialogueBox {
    pub fn new(speaker: &str, text: &str) -> Self {
        Self {
            speaker: speaker.to_string(),
            text: text.to_string(),
        }
    }
}

/// Why a line was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// Speech is turned off
    Disabled,
    /// Same dialogue text as last time
    DuplicateDialogue,
    /// Matched an exclude trigger
    Excluded,
    /// Chat channel not enabled in the current preset
    ChannelDisabled,
    /// Include triggers exist and none matched
    NotIncluded,
    /// Dialogue box is empty
    EmptyText,
    /// Reading dialogue boxes is turned off
    DialogueReadingOff,
}

/// What the pipeline did with a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Forwarded(SayOutcome),
    FilteredOut(FilterReason),
}

impl Disposition {
    /// True if the backend accepted the utterance
    pub fn is_submitted(&self) -> bool {
        matches!(self, Disposition::Forwarded(SayOutcome::Submitted))
    }
}

pub struct SpeechPipeline {
    config: Config,
    triggers: TriggerFilter,
    replacements: ReplacementEngine,
    chat_types: ChatTypesPreset,
    announcer: SpeakerAnnouncer,
    manager: BackendManager,
    gender_resolver: Option<GenderResolver>,
}

impl SpeechPipeline {
    /// Build the pipeline and start the configured backend
    pub fn new(config: Config) -> Self {
        let manager = BackendManager::new(
            config.backend(),
            &config.backend_settings(),
            config.voice_resolver(),
        );
        Self::with_manager(config, manager)
    }

    /// Build the pipeline around an existing manager
    pub fn with_manager(config: Config, manager: BackendManager) -> Self {
        let announcer = SpeakerAnnouncer::new(
            AnnouncePolicy::from_config(&config),
            Arc::clone(manager.shared()),
        );
        let mut pipeline = Self {
            config,
            triggers: TriggerFilter::default(),
            replacements: ReplacementEngine::default(),
            chat_types: ChatTypesPreset::default(),
            announcer,
            manager,
            gender_resolver: None,
        };
        pipeline.refresh();
        pipeline
    }

    /// Install the host's speaker-name to gender lookup
    pub fn set_gender_resolver(&mut self, resolver: GenderResolver) {
        self.gender_resolver = Some(resolver);
    }

    /// Replace the configuration
    ///
    /// Triggers, replacements and presets are rebuilt; the active backend
    /// is kept. Use [`switch_backend`](Self::switch_backend) to change it.
    pub fn reload(&mut self, config: Config) {
        self.config = config;
        self.refresh();
    }

    fn refresh(&mut self) {
        let config = &self.config;
        self.triggers = TriggerFilter::new(&config.exclude_triggers(), &config.include_triggers());
        self.replacements = ReplacementEngine::new(&config.replacements());
        self.chat_types = config.chat_types_preset();
        self.announcer.set_policy(AnnouncePolicy::from_config(config));
        self.manager.set_voices(config.voice_resolver());
        self.manager
            .set_disallow_multiple_say(config.disallow_multiple_say());

        debug!(
            "Pipeline configured: {} replacements, chat preset '{}'",
            self.replacements.len(),
            self.chat_types.name
        );
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &BackendManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut BackendManager {
        &mut self.manager
    }

    /// Handle one chat line
    pub fn handle_chat(&mut self, line: &ChatLine) -> Disposition {
        if !self.config.enabled() {
            return Disposition::FilteredOut(FilterReason::Disabled);
        }

        if self.announcer.is_duplicate_dialogue(&line.text) {
            return Disposition::FilteredOut(FilterReason::DuplicateDialogue);
        }

        if self.config.debug() {
            info!(
                "CHATMSG {} ({}): '{}'",
                line.chat_type,
                line.sender.as_deref().unwrap_or(""),
                line.text
            );
        }

        let normalized = normalize_text(&line.text);

        if self.triggers.is_excluded(&normalized) {
            return Disposition::FilteredOut(FilterReason::Excluded);
        }
        if !self.chat_types.accepts(line.chat_type) {
            return Disposition::FilteredOut(FilterReason::ChannelDisabled);
        }
        if !self.triggers.is_included(&normalized) {
            return Disposition::FilteredOut(FilterReason::NotIncluded);
        }

        let sender = line.sender.as_deref();
        let text = self
            .announcer
            .announce_chat(line.chat_type, sender, &line.text, &normalized);
        self.speak(sender, &text)
    }

    /// Handle one poll of the dialogue box
    ///
    /// The box is recorded before the enabled check so that turning speech
    /// on never reads out a box that was already on screen.
    pub fn poll_dialogue(&mut self, dialogue: &DialogueBox) -> Disposition {
        if dialogue.text.is_empty() {
            return Disposition::FilteredOut(FilterReason::EmptyText);
        }
        if self.announcer.is_duplicate_dialogue(&dialogue.text) {
            return Disposition::FilteredOut(FilterReason::DuplicateDialogue);
        }
        self.announcer.record_dialogue(&dialogue.text);

        let text = self
            .announcer
            .announce_dialogue(&dialogue.speaker, &dialogue.text);

        if !self.config.enabled() {
            return Disposition::FilteredOut(FilterReason::Disabled);
        }
        if !self.config.read_from_quest_talk_addon() {
            return Disposition::FilteredOut(FilterReason::DialogueReadingOff);
        }

        let speaker = Some(dialogue.speaker.as_str()).filter(|s| !s.is_empty());
        self.speak(speaker, &text)
    }

    fn clean(&self, text: &str) -> String {
        self.replacements.apply(&normalize_text(text))
    }

    fn gender_for(&self, speaker: Option<&str>) -> Gender {
        if !self.config.use_gendered_voice_presets() {
            return Gender::None;
        }
        match (&self.gender_resolver, speaker) {
            (Some(resolve), Some(name)) => resolve(name).unwrap_or_default(),
            _ => Gender::None,
        }
    }

    fn speak(&mut self, speaker: Option<&str>, text: &str) -> Disposition {
        let clean = self.clean(text);
        let gender = self.gender_for(speaker);

        if self.config.debug() {
            info!("CHATPARSED {:?} '{}'", gender, clean);
        }
        Disposition::Forwarded(self.manager.say(gender, &clean))
    }

    // Commands

    /// Speak `text` directly, bypassing triggers and announcement
    pub fn say_direct(&mut self, text: &str) -> SayOutcome {
        let clean = self.clean(text);
        self.manager.say(Gender::Male, &clean)
    }

    /// Stop the current utterance and anything queued
    pub fn cancel_tts(&mut self) {
        self.manager.cancel_say();
    }

    /// Flip speech on or off; returns the message for the user
    pub fn toggle_tts(&mut self) -> &'static str {
        if self.config.enabled() {
            self.disable_tts()
        } else {
            self.enable_tts()
        }
    }

    pub fn enable_tts(&mut self) -> &'static str {
        self.config.set_enabled(true);
        self.persist();
        info!("TTS enabled.");
        "TTS enabled."
    }

    /// Turn speech off and forget the last speaker and dialogue text
    pub fn disable_tts(&mut self) -> &'static str {
        self.config.set_enabled(false);
        if self.config.cancel_queue_on_toggle() {
            self.manager.cancel_say();
        }
        self.manager.shared().reset_dedup();
        self.persist();
        info!("TTS disabled.");
        "TTS disabled."
    }

    /// Activate a different backend and remember the choice
    pub fn switch_backend(&mut self, kind: BackendKind) -> Result<(), BackendSwitchError> {
        self.config.set_backend(kind);
        self.persist();
        self.manager
            .switch_backend(kind, &self.config.backend_settings())
    }

    /// Change the streaming server port, restarting the server if active
    pub fn set_server_port(&mut self, port: u16) -> Result<(), BackendSwitchError> {
        self.config.set_server_port(port);
        self.persist();
        if self.manager.active_kind() == Some(BackendKind::Server) {
            self.manager
                .restart_backend(&self.config.backend_settings())?;
        }
        Ok(())
    }

    /// One-time notice for a streaming server bind failure
    ///
    /// Nothing is consumed while the user is not logged in, so the notice
    /// waits until it can be shown.
    pub fn bind_failure_notice(&self, logged_in: bool) -> Option<String> {
        if !logged_in {
            return None;
        }
        self.manager.take_bind_failure().map(|port| {
            format!(
                "chatspeak failed to bind to port {}. Please close the owner of that port \
                 and reload the server, or select a different port.",
                port
            )
        })
    }

    fn persist(&self) {
        if let Err(e) = self.config.save() {
            warn!("{}", e);
        }
    }
}
