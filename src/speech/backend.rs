//! Speech backend abstraction
//!
//! Every provider (local synthesizer, cloud API, streaming server) exposes
//! the same small capability set. The manager owns exactly one active
//! backend and is the only code that swaps it.

use super::activity::SpeechTicket;
use crate::state::{BackendSettings, SharedState};
use crate::voice::{Gender, VoicePreset};
use crate::BackendError;
use log::info;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which provider a backend talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Installed system voices through the `tts` crate
    Local,
    /// Amazon Polly over HTTPS
    Cloud,
    /// WebSocket server feeding an external renderer
    Server,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Cloud => "cloud",
            BackendKind::Server => "server",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "system" => Ok(BackendKind::Local),
            "cloud" | "polly" => Ok(BackendKind::Cloud),
            "server" | "websocket" => Ok(BackendKind::Server),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// One fully resolved utterance ready for synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub gender: Gender,
    pub voice: VoicePreset,
    pub text: String,
}

/// Speech backend trait
///
/// `synthesize` must return promptly: any blocking work goes to the
/// backend's own worker. The ticket travels with the request and is
/// dropped when the request completes, fails or is skipped.
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    /// Queue `request` for speech
    ///
    /// Errors are per-request and never fatal; the ticket is released
    /// either way.
    fn synthesize(&mut self, request: SpeechRequest, ticket: SpeechTicket)
        -> Result<(), BackendError>;

    /// Stop the current utterance
    ///
    /// Called after the manager has already invalidated outstanding
    /// tickets; must be harmless when nothing is playing.
    fn cancel(&mut self);

    /// Release handles, ports and worker threads
    fn dispose(&mut self);
}

/// Construct the backend for `kind`
pub fn create_backend(
    kind: BackendKind,
    settings: &BackendSettings,
    shared: Arc<SharedState>,
) -> Result<Box<dyn Backend>, BackendError> {
    info!("Creating {} speech backend", kind);

    match kind {
        BackendKind::Local => {
            use super::backends::local::LocalSynthesizer;
            let synth = LocalSynthesizer::new()?;
            info!("✓ Local synthesizer ready");
            Ok(Box::new(synth))
        }
        BackendKind::Cloud => {
            use super::backends::cloud::CloudSynthesizer;
            let synth = CloudSynthesizer::new(settings.cloud.clone())?;
            info!("✓ Cloud synthesizer ready (region {})", settings.cloud.region);
            Ok(Box::new(synth))
        }
        BackendKind::Server => {
            use super::backends::server::StreamingServer;
            let server = StreamingServer::new(settings.server.port, shared)?;
            if server.is_listening() {
                info!("✓ Streaming server listening on port {}", settings.server.port);
            }
            Ok(Box::new(server))
        }
    }
}
