//! chatspeak - speaks game chat through interchangeable TTS backends
//!
//! Chat lines and dialogue boxes are normalized, filtered by user triggers,
//! optionally prefixed with the speaker's name, rewritten by user replacements
//! and handed to whichever speech backend is active: the local synthesizer,
//! a cloud API, or a WebSocket server feeding an external renderer.

pub mod announce;
pub mod error;
pub mod pipeline;
pub mod speech;
pub mod state;
pub mod text;
pub mod triggers;
pub mod voice;

pub use error::{BackendError, BackendSwitchError, ChatSpeakError, ConfigIntegrityError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "chatspeak";
