//! Volume and mute control with click-free ramping.
//!
//! `GainControl` is the shared handle the caller mutates at any time,
//! session or not; it is a user preference, not session state.
//! `GainRamp` lives in the scheduler's output path and slews the applied
//! multiplier toward the control's target over a short window so level
//! changes never step discontinuously.

use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct GainState {
    muted: bool,
    volume: u8,
}

/// Shared volume/mute state. Cloning is cheap (one `Arc` increment).
#[derive(Debug, Clone)]
pub struct GainControl {
    inner: Arc<Mutex<GainState>>,
}

impl GainControl {
    pub fn new(volume: u8, muted: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GainState {
                muted,
                volume: volume.min(100),
            })),
        }
    }

    pub fn set_volume(&self, volume: u8) {
        self.inner.lock().unwrap().volume = volume.min(100);
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.lock().unwrap().muted = muted;
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().unwrap().volume
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().unwrap().muted
    }

    /// Effective multiplier: 0 when muted, else volume / 100.
    pub fn target_gain(&self) -> f32 {
        let state = self.inner.lock().unwrap();
        if state.muted {
            0.0
        } else {
            state.volume as f32 / 100.0
        }
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new(100, false)
    }
}

/// Per-sample linear slew toward a target gain.
pub struct GainRamp {
    current: f32,
    /// Gain change per frame, sized so a full 0→1 swing takes the ramp window.
    step: f32,
}

impl GainRamp {
    pub fn new(sample_rate: u32, ramp_ms: u64, initial: f32) -> Self {
        let ramp_frames = (sample_rate as f64 * ramp_ms as f64 / 1000.0).max(1.0);
        Self {
            current: initial,
            step: (1.0 / ramp_frames) as f32,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    /// Scale `samples` in place, advancing the ramp one step per frame.
    ///
    /// All channels of a frame get the same gain.
    pub fn apply(&mut self, samples: &mut [f32], channels: usize, target: f32) {
        for frame in samples.chunks_mut(channels.max(1)) {
            if (self.current - target).abs() <= self.step {
                self.current = target;
            } else if self.current < target {
                self.current += self.step;
            } else {
                self.current -= self.step;
            }
            for sample in frame {
                *sample *= self.current;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_gain_maps_volume_and_mute() {
        let gain = GainControl::new(80, false);
        assert!((gain.target_gain() - 0.8).abs() < 1e-6);
        gain.set_muted(true);
        assert_eq!(gain.target_gain(), 0.0);
        gain.set_muted(false);
        gain.set_volume(250);
        assert_eq!(gain.volume(), 100);
        assert_eq!(gain.target_gain(), 1.0);
    }

    #[test]
    fn mute_ramps_to_zero_within_window() {
        let mut ramp = GainRamp::new(48000, 30, 1.0);
        // 30 ms at 48 kHz is 1440 frames; give it exactly that much signal.
        let mut samples = vec![1.0f32; 1440];
        ramp.apply(&mut samples, 1, 0.0);
        assert_eq!(ramp.current(), 0.0);
        // Early samples are near full level, late samples near silence.
        assert!(samples[0] > 0.99);
        assert!(samples[1439] < 0.01);
    }

    #[test]
    fn unmute_ramps_back_to_stored_level() {
        let mut ramp = GainRamp::new(48000, 30, 0.0);
        let mut samples = vec![1.0f32; 2000];
        ramp.apply(&mut samples, 1, 0.8);
        assert!((ramp.current() - 0.8).abs() < 1e-6);
        assert!((samples[1999] - 0.8).abs() < 1e-3);
    }

    #[test]
    fn stereo_frames_share_one_gain_step() {
        let mut ramp = GainRamp::new(1000, 1000, 0.0);
        let mut samples = vec![1.0f32; 4];
        ramp.apply(&mut samples, 2, 1.0);
        assert_eq!(samples[0], samples[1]);
        assert_eq!(samples[2], samples[3]);
        assert!(samples[2] > samples[0]);
    }
}
