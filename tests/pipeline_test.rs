//! Pipeline integration tests
//!
//! Drives chat lines and dialogue-box polls through the full pipeline into
//! a recording backend and checks what reaches it.

use chatspeak::pipeline::{ChatLine, DialogueBox, Disposition, FilterReason, SpeechPipeline};
use chatspeak::speech::{
    Backend, BackendKind, BackendManager, BackendState, DropReason, SayOutcome, SpeechRequest,
    SpeechTicket,
};
use chatspeak::state::{chat_type, Config};
use chatspeak::voice::Gender;
use chatspeak::BackendError;
use std::sync::{Arc, Mutex};

/// What the recording backend has seen
#[derive(Default)]
struct Recorded {
    requests: Vec<SpeechRequest>,
    /// Tickets of requests still "playing"
    playing: Vec<SpeechTicket>,
    cancels: usize,
}

/// Backend that records requests and holds their tickets until told
/// to finish, so tests control the Speaking state
struct RecordingBackend {
    recorded: Arc<Mutex<Recorded>>,
}

impl Backend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn synthesize(
        &mut self,
        request: SpeechRequest,
        ticket: SpeechTicket,
    ) -> Result<(), BackendError> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.requests.push(request);
        recorded.playing.push(ticket);
        Ok(())
    }

    fn cancel(&mut self) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.cancels += 1;
        recorded.playing.clear();
    }

    fn dispose(&mut self) {}
}

fn pipeline(ini: &str) -> (SpeechPipeline, Arc<Mutex<Recorded>>) {
    let config = Config::from_str(ini).unwrap();
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let backend = RecordingBackend {
        recorded: Arc::clone(&recorded),
    };
    let manager = BackendManager::with_backend(Box::new(backend), config.voice_resolver());
    (SpeechPipeline::with_manager(config, manager), recorded)
}

const BASE: &str = "[voice_preset.0]\nname=Default\n\
                    [chat_types.0]\nname=Default\ntypes=10,11,14,61\n";

fn spoken(recorded: &Arc<Mutex<Recorded>>) -> Vec<String> {
    recorded
        .lock()
        .unwrap()
        .requests
        .iter()
        .map(|r| r.text.clone())
        .collect()
}

fn finish_all(recorded: &Arc<Mutex<Recorded>>) {
    recorded.lock().unwrap().playing.clear();
}

fn say(sender: &str, text: &str) -> ChatLine {
    ChatLine::new(chat_type::SAY, Some(sender), text)
}

#[test]
fn test_chat_line_is_announced_and_spoken() {
    let (mut p, recorded) = pipeline(BASE);

    let result = p.handle_chat(&say("Alphinaud", "Well met!"));
    assert!(result.is_submitted());
    assert_eq!(spoken(&recorded), vec!["Alphinaud says Well met!"]);
}

#[test]
fn test_normalized_text_is_filtered_by_exclude_trigger() {
    let ini = format!("{}[trigger.exclude.0]\ntext=test\n", BASE);
    let (mut p, recorded) = pipeline(&ini);

    let line = ChatLine::new(chat_type::SAY, None, "It's a \u{2018}test\u{2019}\u{2026}");
    assert_eq!(
        p.handle_chat(&line),
        Disposition::FilteredOut(FilterReason::Excluded)
    );
    assert!(spoken(&recorded).is_empty());
}

#[test]
fn test_normalization_reaches_backend() {
    let (mut p, recorded) = pipeline(BASE);
    let line = ChatLine::new(
        chat_type::SAY,
        None,
        "<emphasis>It's</emphasis> a \u{2018}test\u{2019}\u{2026}",
    );
    p.handle_chat(&line);
    assert_eq!(spoken(&recorded), vec!["It's a 'test'..."]);
}

#[test]
fn test_exclude_beats_include() {
    let ini = format!(
        "{}[trigger.exclude.0]\ntext=gil\n[trigger.include.0]\ntext=party\n",
        BASE
    );
    let (mut p, _) = pipeline(&ini);

    assert_eq!(
        p.handle_chat(&say("A", "party needs gil")),
        Disposition::FilteredOut(FilterReason::Excluded)
    );
    assert_eq!(
        p.handle_chat(&say("A", "hello there")),
        Disposition::FilteredOut(FilterReason::NotIncluded)
    );
    assert!(p.handle_chat(&say("A", "party time")).is_submitted());
}

#[test]
fn test_regex_include_trigger() {
    let ini = format!("{}[trigger.include.0]\ntext=^LFG\\b\nregex=true\n", BASE);
    let (mut p, recorded) = pipeline(&ini);

    p.handle_chat(&ChatLine::new(chat_type::SAY, None, "LFG for raid"));
    p.handle_chat(&ChatLine::new(chat_type::SAY, None, "not LFG"));
    assert_eq!(spoken(&recorded), vec!["LFG for raid"]);
}

#[test]
fn test_disabled_channel() {
    let (mut p, _) = pipeline(BASE);
    let line = ChatLine::new(chat_type::SYSTEM, None, "You obtain a potion.");
    assert_eq!(
        p.handle_chat(&line),
        Disposition::FilteredOut(FilterReason::ChannelDisabled)
    );
}

#[test]
fn test_replacement_applies_to_speaker_and_text() {
    let ini = format!("{}[replacement.0]\nmatch=ul'dah\nreplace=uldaahr\n", BASE);
    let (mut p, recorded) = pipeline(&ini);

    p.handle_chat(&ChatLine::new(chat_type::SAY, None, "Welcome to Ul'dah"));
    finish_all(&recorded);
    p.handle_chat(&say("Ul'dah Guard", "Halt"));
    assert_eq!(
        spoken(&recorded),
        vec!["Welcome to uldaahr", "uldaahr Guard says Halt"]
    );
}

#[test]
fn test_dialogue_dedup_across_polls() {
    let (mut p, recorded) = pipeline(BASE);
    let dialogue = DialogueBox::new("Minfilia", "The Scions need you.");

    assert!(p.poll_dialogue(&dialogue).is_submitted());
    finish_all(&recorded);
    assert_eq!(
        p.poll_dialogue(&dialogue),
        Disposition::FilteredOut(FilterReason::DuplicateDialogue)
    );
    assert_eq!(
        p.poll_dialogue(&dialogue),
        Disposition::FilteredOut(FilterReason::DuplicateDialogue)
    );
    assert_eq!(spoken(&recorded), vec!["Minfilia says The Scions need you."]);

    assert_eq!(
        p.poll_dialogue(&DialogueBox::new("", "")),
        Disposition::FilteredOut(FilterReason::EmptyText)
    );
}

#[test]
fn test_npc_chat_suppresses_matching_dialogue_box() {
    let (mut p, recorded) = pipeline(BASE);

    let line = ChatLine::new(chat_type::NPC_DIALOGUE, Some("Cid"), "Airship's ready.");
    assert!(p.handle_chat(&line).is_submitted());
    finish_all(&recorded);

    assert_eq!(
        p.poll_dialogue(&DialogueBox::new("Cid", "Airship's ready.")),
        Disposition::FilteredOut(FilterReason::DuplicateDialogue)
    );
    assert_eq!(spoken(&recorded).len(), 1);
}

#[test]
fn test_unannounced_npc_chat_suppresses_matching_dialogue_box() {
    let ini = format!("[general]\nname_with_say=false\n{}", BASE);
    let (mut p, recorded) = pipeline(&ini);

    let line = ChatLine::new(chat_type::NPC_DIALOGUE, Some("Cid"), "Airship's ready.");
    assert!(p.handle_chat(&line).is_submitted());
    finish_all(&recorded);

    assert_eq!(
        p.poll_dialogue(&DialogueBox::new("Cid", "Airship's ready.")),
        Disposition::FilteredOut(FilterReason::DuplicateDialogue)
    );
    assert_eq!(spoken(&recorded), vec!["Airship's ready."]);
}

#[test]
fn test_dialogue_seen_while_disabled_is_not_spoken_after_enable() {
    let ini = format!("[general]\nenabled=false\n{}", BASE);
    let (mut p, recorded) = pipeline(&ini);
    let dialogue = DialogueBox::new("Tataru", "Welcome back!");

    assert_eq!(
        p.poll_dialogue(&dialogue),
        Disposition::FilteredOut(FilterReason::Disabled)
    );
    p.enable_tts();
    assert_eq!(
        p.poll_dialogue(&dialogue),
        Disposition::FilteredOut(FilterReason::DuplicateDialogue)
    );
    assert!(spoken(&recorded).is_empty());
}

#[test]
fn test_dialogue_reading_off() {
    let ini = format!("[general]\nread_from_quest_talk_addon=false\n{}", BASE);
    let (mut p, _) = pipeline(&ini);
    assert_eq!(
        p.poll_dialogue(&DialogueBox::new("Y'shtola", "Hm.")),
        Disposition::FilteredOut(FilterReason::DialogueReadingOff)
    );
}

#[test]
fn test_disallow_multiple_say_drops_while_speaking() {
    let ini = format!("[general]\ndisallow_multiple_say=true\n{}", BASE);
    let (mut p, recorded) = pipeline(&ini);

    assert!(p.handle_chat(&say("A", "first")).is_submitted());
    assert_eq!(p.manager().state(), BackendState::Speaking);

    assert_eq!(
        p.handle_chat(&say("B", "second")),
        Disposition::Forwarded(SayOutcome::Dropped(DropReason::Busy))
    );
    assert_eq!(recorded.lock().unwrap().requests.len(), 1);

    finish_all(&recorded);
    assert_eq!(p.manager().state(), BackendState::Idle);
    assert!(p.handle_chat(&say("B", "third")).is_submitted());
}

#[test]
fn test_requests_queue_without_policy() {
    let (mut p, recorded) = pipeline(BASE);
    assert!(p.handle_chat(&say("A", "one")).is_submitted());
    assert!(p.handle_chat(&say("A", "two")).is_submitted());
    assert_eq!(recorded.lock().unwrap().playing.len(), 2);
}

#[test]
fn test_repeat_speaker_not_announced_with_policy() {
    let ini = format!("[general]\ndisallow_multiple_say=true\n{}", BASE);
    let (mut p, recorded) = pipeline(&ini);

    p.handle_chat(&say("Thancred", "one"));
    finish_all(&recorded);
    p.handle_chat(&say("Thancred", "two"));
    assert_eq!(spoken(&recorded), vec!["Thancred says one", "two"]);
}

#[test]
fn test_cancel_returns_to_idle() {
    let (mut p, recorded) = pipeline(BASE);

    // Idle cancel is harmless
    p.cancel_tts();
    assert_eq!(p.manager().state(), BackendState::Idle);

    p.handle_chat(&say("A", "long speech"));
    assert!(p.manager().is_speaking());
    p.cancel_tts();
    assert_eq!(p.manager().state(), BackendState::Idle);
    assert_eq!(recorded.lock().unwrap().cancels, 2);
}

#[test]
fn test_late_completion_after_cancel_keeps_idle() {
    let (mut p, recorded) = pipeline(BASE);

    p.handle_chat(&say("A", "first"));
    // Keep the ticket out of the backend so it completes after the cancel
    let ticket = recorded.lock().unwrap().playing.pop().unwrap();
    p.cancel_tts();
    assert!(!ticket.is_current());

    p.handle_chat(&say("A", "second"));
    drop(ticket);
    assert!(p.manager().is_speaking(), "stale completion must not end the new utterance");
}

#[test]
fn test_disable_resets_dedup_and_cancels_when_configured() {
    let ini = format!("[general]\ncancel_queue_on_toggle=true\n{}", BASE);
    let (mut p, recorded) = pipeline(&ini);
    let dialogue = DialogueBox::new("Alisaie", "Hmph.");

    p.poll_dialogue(&dialogue);
    assert!(p.manager().is_speaking());

    assert_eq!(p.disable_tts(), "TTS disabled.");
    assert!(!p.manager().is_speaking());
    assert_eq!(recorded.lock().unwrap().cancels, 1);

    assert_eq!(
        p.handle_chat(&say("A", "muted")),
        Disposition::FilteredOut(FilterReason::Disabled)
    );

    assert_eq!(p.toggle_tts(), "TTS enabled.");
    // Dedup was reset, so the same box is spoken again
    assert!(p.poll_dialogue(&dialogue).is_submitted());
}

#[test]
fn test_disable_without_cancel_lets_speech_finish() {
    let (mut p, recorded) = pipeline(BASE);
    p.handle_chat(&say("A", "still talking"));
    p.disable_tts();
    assert!(p.manager().is_speaking());
    assert_eq!(recorded.lock().unwrap().cancels, 0);
}

#[test]
fn test_say_direct_uses_male_voice_and_bypasses_triggers() {
    let ini = format!(
        "{}[trigger.exclude.0]\ntext=secret\n[replacement.0]\nmatch=gil\nreplace=gold\n",
        BASE
    );
    let (mut p, recorded) = pipeline(&ini);

    assert_eq!(p.say_direct("secret gil"), SayOutcome::Submitted);
    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.requests[0].text, "secret gold");
    assert_eq!(recorded.requests[0].gender, Gender::Male);
}

#[test]
fn test_gender_resolver_selects_preset() {
    let ini = "[general]\nuse_gendered_voice_presets=true\n\
               [voice]\ncurrent_preset=0\nungendered_preset=0\nmale_preset=1\nfemale_preset=2\n\
               [voice_preset.0]\nname=Neutral\n\
               [voice_preset.1]\nname=Low\n\
               [voice_preset.2]\nname=High\n\
               [chat_types.0]\nenable_all=true\n";
    let (mut p, recorded) = pipeline(ini);
    p.set_gender_resolver(Box::new(|name: &str| match name {
        "Alisaie" => Some(Gender::Female),
        "Alphinaud" => Some(Gender::Male),
        _ => None,
    }));

    p.handle_chat(&say("Alisaie", "a"));
    p.handle_chat(&say("Alphinaud", "b"));
    p.handle_chat(&say("Unknown", "c"));
    p.handle_chat(&ChatLine::new(chat_type::SAY, None, "d"));

    let recorded = recorded.lock().unwrap();
    let voices: Vec<&str> = recorded
        .requests
        .iter()
        .map(|r| r.voice.name.as_str())
        .collect();
    assert_eq!(voices, vec!["High", "Low", "Neutral", "Neutral"]);
}

#[test]
fn test_no_voice_presets_drops() {
    let (mut p, recorded) = pipeline("[chat_types.0]\nenable_all=true\n");
    assert_eq!(
        p.handle_chat(&say("A", "hello")),
        Disposition::Forwarded(SayOutcome::Dropped(DropReason::NoVoice))
    );
    assert!(spoken(&recorded).is_empty());
    assert!(!p.manager().is_speaking());
}

#[test]
fn test_empty_after_cleanup_is_dropped() {
    let (mut p, _) = pipeline(BASE);
    assert_eq!(
        p.handle_chat(&ChatLine::new(chat_type::SAY, None, "<break/>")),
        Disposition::Forwarded(SayOutcome::Dropped(DropReason::EmptyText))
    );
}

#[test]
fn test_bind_failure_notice_waits_for_login() {
    let (p, _) = pipeline(BASE);
    p.manager().shared().record_bind_failure(8080);

    assert_eq!(p.bind_failure_notice(false), None);
    let notice = p.bind_failure_notice(true).expect("notice after login");
    assert!(notice.contains("8080"));
    assert_eq!(p.bind_failure_notice(true), None);
}
