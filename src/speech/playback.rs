//! Audio playback for backends that receive encoded audio

use super::SpeechTicket;
use crate::BackendError;
use log::debug;
use std::io::Cursor;
use std::thread;
use std::time::Duration;

/// Plays one encoded clip, returning early if the ticket is cancelled
pub trait AudioOutput: Send {
    fn play(&self, audio: Vec<u8>, volume: f32, ticket: &SpeechTicket) -> Result<(), BackendError>;
}

/// Default output device through rodio
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioOutput;

impl AudioOutput for RodioOutput {
    fn play(&self, audio: Vec<u8>, volume: f32, ticket: &SpeechTicket) -> Result<(), BackendError> {
        if audio.is_empty() {
            return Ok(());
        }

        let stream = rodio::OutputStreamBuilder::open_default_stream()
            .map_err(|e| BackendError::Audio(format!("Audio device initialization failed: {}", e)))?;
        let sink = rodio::Sink::connect_new(stream.mixer());

        let source = rodio::Decoder::new(Cursor::new(audio))
            .map_err(|e| BackendError::Audio(format!("Failed to decode audio: {}", e)))?;
        sink.set_volume(volume);
        sink.append(source);

        while !sink.empty() {
            if !ticket.is_current() {
                debug!("Playback cancelled");
                sink.stop();
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        Ok(())
    }
}
