//! audio - decode, rate-convert, buffer, and schedule playback.
//!
//! The signal path runs decoder → resampler → jitter buffer →
//! scheduler → output device, all driven by the session loop.

mod block;
mod decoder;
mod gain;
mod jitter;
mod output;
mod resample;
mod scheduler;

pub use block::SampleBlock;
pub use decoder::FrameDecoder;
pub use gain::{GainControl, GainRamp};
pub use jitter::JitterBuffer;
pub use output::{AlsaOutput, AudioOutput};
pub use resample::LinearResampler;
pub use scheduler::PlaybackScheduler;
