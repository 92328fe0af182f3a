//! Playback device abstraction and the ALSA implementation.
//!
//! The trait is the seam between the scheduler and the hardware: it
//! exposes the negotiated format, the output clock, and a write head.
//! Tests drive a mock; production uses `AlsaOutput`.

use std::time::Instant;

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

/// An opened playback sink with its own monotonic clock.
pub trait AudioOutput: Send {
    /// Negotiated device sample rate.
    fn sample_rate(&self) -> u32;

    /// Negotiated device channel count.
    fn channels(&self) -> u32;

    /// Seconds elapsed on the output clock.
    fn now(&self) -> f64;

    /// Append interleaved f32 frames at the device write head.
    fn write(&mut self, samples: &[f32]) -> Result<()>;
}

/// ALSA playback device. Opened on session start, closed by Drop on
/// every exit path.
pub struct AlsaOutput {
    pcm: PCM,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
    opened_at: Instant,
}

impl AlsaOutput {
    /// Open `device` for playback, negotiating rate/channels/period with
    /// the hardware and reading back the actual values.
    pub fn open(
        device: &str,
        sample_rate: u32,
        channels: u32,
        period_size: usize,
    ) -> Result<Self> {
        let pcm = PCM::new(device, Direction::Playback, false)
            .with_context(|| format!("failed to open PCM device '{}' for playback", device))?;

        {
            let hwp = HwParams::any(&pcm).context("failed to initialize HwParams")?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(Format::S16LE)?;
            hwp.set_channels(channels)?;
            hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
            if period_size > 0 {
                hwp.set_period_size_near(period_size as alsa::pcm::Frames, ValueOr::Nearest)?;
            }
            pcm.hw_params(&hwp)?;
        }

        let (actual_rate, actual_channels, actual_period) = {
            let hwp = pcm.hw_params_current()?;
            (
                hwp.get_rate()?,
                hwp.get_channels()?,
                hwp.get_period_size()? as usize,
            )
        };

        log::info!(
            "ALSA playback: device={}, rate={}, channels={}, period_size={}",
            device,
            actual_rate,
            actual_channels,
            actual_period,
        );

        Ok(Self {
            pcm,
            sample_rate: actual_rate,
            channels: actual_channels,
            period_size: actual_period,
            opened_at: Instant::now(),
        })
    }

    pub fn period_size(&self) -> usize {
        self.period_size
    }
}

impl AudioOutput for AlsaOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u32 {
        self.channels
    }

    fn now(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        let pcm_data: Vec<i16> = samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();

        let io = self.pcm.io_i16()?;
        let total_frames = pcm_data.len() / self.channels as usize;
        let mut frames_written = 0;
        let mut retry_count = 0u32;

        // Retry loop handles short writes and XRUN recovery without
        // losing frames.
        while frames_written < total_frames {
            let offset = frames_written * self.channels as usize;
            match io.writei(&pcm_data[offset..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;

                    self.pcm
                        .prepare()
                        .context("failed to recover PCM playback")?;

                    // Persistent failure: drop the remaining frames
                    // rather than spin forever.
                    if retry_count >= 3 {
                        log::error!(
                            "max recovery retries reached, dropping {} unwritten frames",
                            total_frames - frames_written
                        );
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
