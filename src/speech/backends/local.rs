//! Local synthesizer backend using the tts crate
//!
//! The `tts` crate wraps the platform engine (Speech Dispatcher on Linux,
//! AVFoundation on macOS, WinRT/SAPI on Windows). Engine calls can block, so
//! the engine lives on a dedicated worker thread and the backend only sends
//! it commands. The worker watches the request's ticket while audio plays
//! and stops the engine as soon as the request is cancelled.

use crate::speech::{Backend, BackendKind, SpeechRequest, SpeechTicket};
use crate::voice::VoicePreset;
use crate::BackendError;
use log::{debug, error, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tts::{Features, Tts, Voice};

/// How often the worker checks for completion or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(25);

enum LocalCommand {
    Speak {
        request: SpeechRequest,
        ticket: SpeechTicket,
    },
    Stop,
}

/// Outcome of looking up a preset's voice among the installed ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoiceChoice {
    /// Preset names no voice; keep the engine default
    EngineDefault,
    /// Found by name or id at this index
    Found(usize),
    /// Not installed; first available voice used instead
    Fallback(usize),
    /// Engine reports no voices at all
    NoVoices,
}

fn choose_voice(available: &[String], wanted: &str) -> VoiceChoice {
    if wanted.is_empty() {
        return VoiceChoice::EngineDefault;
    }
    if let Some(idx) = available.iter().position(|v| v.eq_ignore_ascii_case(wanted)) {
        return VoiceChoice::Found(idx);
    }
    if available.is_empty() {
        VoiceChoice::NoVoices
    } else {
        VoiceChoice::Fallback(0)
    }
}

/// Map a preset rate (-10..=10) onto the engine's rate range
///
/// 0 is the engine's normal rate; the ends of the preset scale reach the
/// engine minimum and maximum.
fn convert_rate(rate: i32, min: f32, normal: f32, max: f32) -> f32 {
    let rate = rate.clamp(VoicePreset::MIN_RATE, VoicePreset::MAX_RATE) as f32;
    let steps = VoicePreset::MAX_RATE as f32;
    if rate >= 0.0 {
        normal + (max - normal) * rate / steps
    } else {
        normal + (normal - min) * rate / steps
    }
}

/// Map a preset volume (0..=100) onto the engine's volume range
fn convert_volume(volume: i32, min: f32, max: f32) -> f32 {
    let volume = volume.clamp(0, VoicePreset::MAX_VOLUME) as f32;
    min + (max - min) * volume / VoicePreset::MAX_VOLUME as f32
}

/// Engine state owned by the worker thread
struct Engine {
    tts: Tts,
    features: Features,
    voices: Vec<Voice>,
    names: Vec<String>,
    /// Preset applied last, to skip redundant engine calls
    applied: Option<VoicePreset>,
}

impl Engine {
    fn new() -> Result<Self, BackendError> {
        let tts = Tts::default()
            .map_err(|e| BackendError::Unavailable(format!("Failed to initialize TTS: {}", e)))?;
        let features = tts.supported_features();

        let voices = if features.voice {
            tts.voices().unwrap_or_else(|e| {
                warn!("Could not list installed voices: {}", e);
                Vec::new()
            })
        } else {
            Vec::new()
        };
        let names = voices.iter().map(|v| v.name()).collect();

        Ok(Self {
            tts,
            features,
            voices,
            names,
            applied: None,
        })
    }

    fn apply_preset(&mut self, preset: &VoicePreset) {
        if self.applied.as_ref() == Some(preset) {
            return;
        }

        if self.features.voice {
            match choose_voice(&self.names, &preset.voice_identity) {
                VoiceChoice::EngineDefault => {}
                VoiceChoice::Found(idx) => self.set_voice(idx),
                VoiceChoice::Fallback(idx) => {
                    warn!(
                        "Voice {:?} is not installed, falling back to {:?}",
                        preset.voice_identity, self.names[idx]
                    );
                    self.set_voice(idx);
                }
                VoiceChoice::NoVoices => {
                    warn!("No voices installed, using the engine default")
                }
            }
        }

        if self.features.rate {
            let rate = convert_rate(
                preset.rate,
                self.tts.min_rate(),
                self.tts.normal_rate(),
                self.tts.max_rate(),
            );
            if let Err(e) = self.tts.set_rate(rate) {
                warn!("Failed to set rate: {}", e);
            }
        }

        if self.features.volume {
            let volume =
                convert_volume(preset.volume, self.tts.min_volume(), self.tts.max_volume());
            if let Err(e) = self.tts.set_volume(volume) {
                warn!("Failed to set volume: {}", e);
            }
        }

        self.applied = Some(preset.clone());
    }

    fn set_voice(&mut self, idx: usize) {
        if let Some(voice) = self.voices.get(idx) {
            debug!("Selecting voice: {}", voice.name());
            if let Err(e) = self.tts.set_voice(voice) {
                warn!("Failed to set voice: {}", e);
            }
        }
    }

    fn speak(&mut self, request: SpeechRequest, ticket: SpeechTicket) {
        if !ticket.is_current() {
            debug!("Skipping cancelled utterance");
            return;
        }

        self.apply_preset(&request.voice);

        debug!("Speaking: {}", request.text);
        if let Err(e) = self.tts.speak(request.text, false) {
            error!("Failed to speak: {}", e);
            return;
        }

        // Without is_speaking support completion cannot be observed;
        // the ticket is released right away and cancel() still stops audio.
        if !self.features.is_speaking {
            return;
        }

        loop {
            thread::sleep(POLL_INTERVAL);

            if !ticket.is_current() {
                self.stop();
                return;
            }

            match self.tts.is_speaking() {
                Ok(true) => continue,
                Ok(false) => return,
                Err(e) => {
                    debug!("is_speaking failed, assuming done: {}", e);
                    return;
                }
            }
        }
    }

    fn stop(&mut self) {
        if !self.features.stop {
            return;
        }
        debug!("Canceling speech");
        if let Err(e) = self.tts.stop() {
            error!("Failed to cancel speech: {}", e);
        }
    }
}

fn run_worker(mut engine: Engine, commands: Receiver<LocalCommand>) {
    // Ends when the backend drops its sender
    for command in commands {
        match command {
            LocalCommand::Speak { request, ticket } => engine.speak(request, ticket),
            LocalCommand::Stop => engine.stop(),
        }
    }
    debug!("Local synthesizer worker exiting");
}

/// Local synthesizer backend
pub struct LocalSynthesizer {
    commands: Option<Sender<LocalCommand>>,
    thread: Option<JoinHandle<()>>,
    /// Names of the voices installed when the engine started
    voices: Vec<String>,
}

impl LocalSynthesizer {
    /// Start the engine on its worker thread
    ///
    /// Blocks only until the engine has initialised.
    pub fn new() -> Result<Self, BackendError> {
        debug!("Creating local synthesizer");

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("chatspeak-local".to_string())
            .spawn(move || match Engine::new() {
                Ok(engine) => {
                    let _ = ready_tx.send(Ok(engine.names.clone()));
                    run_worker(engine, command_rx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        let voices = ready_rx.recv().map_err(|_| {
            BackendError::Unavailable("speech worker exited during startup".to_string())
        })??;

        debug!("Local synthesizer created with {} voices", voices.len());
        Ok(Self {
            commands: Some(command_tx),
            thread: Some(worker),
            voices,
        })
    }

    /// Installed voice names
    pub fn voices(&self) -> &[String] {
        &self.voices
    }

    fn send(&self, command: LocalCommand) -> Result<(), BackendError> {
        match &self.commands {
            Some(tx) => tx
                .send(command)
                .map_err(|_| BackendError::Unavailable("speech worker has exited".to_string())),
            None => Err(BackendError::Unavailable("backend disposed".to_string())),
        }
    }
}

impl Backend for LocalSynthesizer {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn synthesize(
        &mut self,
        request: SpeechRequest,
        ticket: SpeechTicket,
    ) -> Result<(), BackendError> {
        self.send(LocalCommand::Speak { request, ticket })
    }

    fn cancel(&mut self) {
        let _ = self.send(LocalCommand::Stop);
    }

    fn dispose(&mut self) {
        // Dropping the sender ends the worker after its current command.
        // Any utterance in flight is already stale, so the join is short
        // and the engine is released before a replacement starts.
        self.commands = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Local synthesizer thread panicked");
            }
            debug!("Local synthesizer disposed");
        }
    }
}

impl Drop for LocalSynthesizer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_local_synth() {
        // May fail without a speech engine (CI, containers)
        match LocalSynthesizer::new() {
            Ok(synth) => println!("✓ Local synthesizer with {} voices", synth.voices().len()),
            Err(e) => println!("⚠ Local synthesizer unavailable (may be expected): {}", e),
        }
    }

    #[test]
    fn test_dispose_releases_engine() {
        // May fail without a speech engine (CI, containers)
        match LocalSynthesizer::new() {
            Ok(mut synth) => {
                synth.cancel();
                synth.dispose();
                assert!(synth.thread.is_none());
                assert!(synth.send(LocalCommand::Stop).is_err());
                // A second dispose, as Drop does, is harmless
                synth.dispose();
                println!("✓ Local synthesizer disposed");
            }
            Err(e) => println!("⚠ Local synthesizer unavailable (may be expected): {}", e),
        }
    }

    #[test]
    fn test_choose_voice() {
        let installed = names(&["Microsoft David", "Microsoft Zira"]);
        assert_eq!(choose_voice(&installed, "microsoft zira"), VoiceChoice::Found(1));
        assert_eq!(choose_voice(&installed, "Removed Voice"), VoiceChoice::Fallback(0));
        assert_eq!(choose_voice(&installed, ""), VoiceChoice::EngineDefault);
        assert_eq!(choose_voice(&[], "Anything"), VoiceChoice::NoVoices);
    }

    #[test]
    fn test_rate_conversion() {
        assert_eq!(convert_rate(0, 0.1, 1.0, 10.0), 1.0);
        assert_eq!(convert_rate(10, 0.1, 1.0, 10.0), 10.0);
        assert_eq!(convert_rate(-10, 0.0, 1.0, 10.0), 0.0);
        assert_eq!(convert_rate(5, 0.0, 1.0, 3.0), 2.0);
        // Out of range presets are clamped
        assert_eq!(convert_rate(50, 0.0, 1.0, 3.0), 3.0);
    }

    #[test]
    fn test_volume_conversion() {
        assert_eq!(convert_volume(0, 0.0, 1.0), 0.0);
        assert_eq!(convert_volume(50, 0.0, 1.0), 0.5);
        assert_eq!(convert_volume(100, 0.0, 1.0), 1.0);
        assert_eq!(convert_volume(150, 0.0, 1.0), 1.0);
    }
}
