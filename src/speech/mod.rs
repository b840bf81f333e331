//! Speech dispatch: backend abstraction, concrete backends and the manager

pub mod activity;
pub mod backend;
pub mod backends;
pub mod manager;
pub mod playback;

pub use activity::{BackendState, SpeechActivity, SpeechTicket};
pub use backend::{create_backend, Backend, BackendKind, SpeechRequest};
pub use manager::{BackendManager, DropReason, SayOutcome};
