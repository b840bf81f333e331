//! Configuration and process-wide speech state

pub mod config;
pub mod shared;

pub use config::{
    chat_type, BackendSettings, ChatTypesPreset, CloudSettings, Config, ServerSettings,
};
pub use shared::SharedState;
