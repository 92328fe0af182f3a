//! Engine configuration.

/// Tunables for the playback engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ALSA playback device name (e.g. "default", "plughw:0,0")
    pub playback_device: String,
    /// Desired playback sample rate (may be negotiated by hardware)
    pub playback_sample_rate: u32,
    /// Desired playback channel count
    pub playback_channels: u32,
    /// Desired ALSA period size in frames (0 = let ALSA decide)
    pub playback_period_size: usize,
    /// Minimum queued audio before playback starts or resumes, in ms.
    /// Trades startup latency against resilience to network jitter.
    pub prebuffer_ms: u64,
    /// Headroom added when the play cursor is re-anchored, in ms
    pub lookahead_ms: u64,
    /// Volume/mute ramp window, in ms
    pub gain_ramp_ms: u64,
    /// Depth of the transport event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            playback_device: "default".to_string(),
            playback_sample_rate: 48000,
            playback_channels: 2,
            playback_period_size: 1024,
            prebuffer_ms: 300,
            lookahead_ms: 50,
            gain_ramp_ms: 30,
            event_capacity: 100,
        }
    }
}
