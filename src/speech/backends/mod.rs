//! Concrete speech backends

// Installed system voices via the tts crate
pub mod local;

// Amazon Polly over HTTPS, played back locally
pub mod cloud;

// SigV4 request signing for the cloud backend
pub mod sigv4;

// WebSocket server streaming requests to an external renderer
pub mod server;
