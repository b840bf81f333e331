//! Speaker announcement and repeat suppression
//!
//! Decides whether a line is spoken as "<Speaker> says <text>" and keeps
//! the shared dedup state current. Chat lines compare only the speaker
//! name; polled dialogue boxes also compare the full on-screen text.

use crate::state::chat_type;
use crate::state::{Config, SharedState};
use std::sync::Arc;

/// How speaker names are announced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncePolicy {
    /// Prefix chat lines with the sender's name
    pub announce_speakers: bool,
    /// Also prefix NPC dialogue (dialogue boxes and the NPC chat channel)
    pub announce_for_dialogue_boxes: bool,
    /// Skip the prefix when the speaker is the same as last time
    pub disallow_repeats: bool,
    /// Word between speaker and text
    pub connector: String,
}

impl Default for AnnouncePolicy {
    fn default() -> Self {
        Self {
            announce_speakers: true,
            announce_for_dialogue_boxes: true,
            disallow_repeats: false,
            connector: "says".to_string(),
        }
    }
}

impl AnnouncePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            announce_speakers: config.name_with_say(),
            announce_for_dialogue_boxes: config.name_npc_with_say(),
            disallow_repeats: config.disallow_multiple_say(),
            connector: config.says_postfix(),
        }
    }
}

pub struct SpeakerAnnouncer {
    policy: AnnouncePolicy,
    shared: Arc<SharedState>,
}

impl SpeakerAnnouncer {
    pub fn new(policy: AnnouncePolicy, shared: Arc<SharedState>) -> Self {
        Self { policy, shared }
    }

    pub fn policy(&self) -> &AnnouncePolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: AnnouncePolicy) {
        self.policy = policy;
    }

    /// True if `text` is the dialogue text spoken last
    pub fn is_duplicate_dialogue(&self, text: &str) -> bool {
        self.shared.is_duplicate_quest_text(text)
    }

    /// Remember `text` as the dialogue currently on screen
    pub fn record_dialogue(&self, text: &str) {
        self.shared.set_last_quest_text(text);
    }

    fn should_name_chat(&self, channel: u16) -> bool {
        self.policy.announce_speakers
            && (self.policy.announce_for_dialogue_boxes || channel != chat_type::NPC_DIALOGUE)
    }

    fn should_name_dialogue(&self) -> bool {
        self.policy.announce_speakers && self.policy.announce_for_dialogue_boxes
    }

    fn repeats(&self, speaker: &str) -> bool {
        self.policy.disallow_repeats && self.shared.is_same_speaker(speaker)
    }

    fn prefix(&self, speaker: &str, text: &str) -> String {
        self.shared.set_last_speaker(speaker);
        format!("{} {} {}", speaker, self.policy.connector, text)
    }

    /// Announce a chat line
    ///
    /// `raw_text` is what the host delivered. It is recorded for every NPC
    /// dialogue line, announced or not, so the matching dialogue box is not
    /// spoken again.
    pub fn announce_chat(
        &self,
        channel: u16,
        speaker: Option<&str>,
        raw_text: &str,
        text: &str,
    ) -> String {
        if channel == chat_type::NPC_DIALOGUE {
            self.record_dialogue(raw_text);
        }

        let speaker = match speaker {
            Some(s) if !s.is_empty() => s,
            _ => return text.to_string(),
        };

        if !self.should_name_chat(channel) || self.repeats(speaker) {
            return text.to_string();
        }
        self.prefix(speaker, text)
    }

    /// Announce a polled dialogue box
    pub fn announce_dialogue(&self, speaker: &str, text: &str) -> String {
        if speaker.is_empty() || !self.should_name_dialogue() || self.repeats(speaker) {
            return text.to_string();
        }
        self.prefix(speaker, text)
    }
}
