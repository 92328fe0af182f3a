//! cribside - real-time audio monitor client.
//!
//! Connects to a monitoring device over WebSocket, negotiates the
//! stream format from a one-shot `audio_info` handshake, then decodes
//! (PCM16 or Opus), resamples, jitter-buffers, and schedules gap-free
//! playback with live volume/mute control.

pub mod audio;
mod config;
mod engine;
mod error;
mod net_link;
mod protocol;
mod state_machine;

pub use config::EngineConfig;
pub use engine::{AudioEngine, OutputFactory};
pub use error::EngineError;
pub use protocol::{Codec, StreamInfo};
pub use state_machine::SessionState;
