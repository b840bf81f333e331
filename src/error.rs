//! Error types for chatspeak

use crate::speech::BackendKind;
use std::io;
use thiserror::Error;

/// Main error type for chatspeak
#[derive(Error, Debug)]
pub enum ChatSpeakError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for chatspeak operations
pub type Result<T> = std::result::Result<T, ChatSpeakError>;

impl From<String> for ChatSpeakError {
    fn from(s: String) -> Self {
        ChatSpeakError::Other(s)
    }
}

impl From<&str> for ChatSpeakError {
    fn from(s: &str) -> Self {
        ChatSpeakError::Other(s.to_string())
    }
}

/// Failures reported by a single backend
///
/// None of these are fatal to the caller: the manager logs them,
/// drops the affected utterance and returns to idle.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Request exceeds the provider's per-request limit
    #[error("request of {len} characters exceeds the limit of {limit}")]
    RequestTooLarge { len: usize, limit: usize },

    /// Network, timeout, authentication or quota failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Listening port could not be bound
    #[error("failed to bind port {port}: {reason}")]
    Bind { port: u16, reason: String },

    #[error("audio playback failed: {0}")]
    Audio(String),

    /// Engine could not be initialised on this host
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Returned when the incoming backend cannot be constructed
#[derive(Error, Debug)]
pub enum BackendSwitchError {
    #[error("failed to start {kind} backend: {source}")]
    Init {
        kind: BackendKind,
        #[source]
        source: BackendError,
    },
}

/// Configuration problems that voice resolution cannot paper over
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigIntegrityError {
    #[error("no voice presets are configured")]
    NoVoicePresets,
}
