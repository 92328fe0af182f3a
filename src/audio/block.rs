//! Decoded audio block type shared across the playback pipeline.

/// A contiguous run of interleaved, normalized f32 samples.
///
/// Samples are in [-1.0, 1.0]. Blocks queued for playback are always at
/// the output device's sample rate and channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    pub samples: Vec<f32>,
    pub channels: u32,
    pub sample_rate: u32,
}

impl SampleBlock {
    pub fn new(samples: Vec<f32>, channels: u32, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playback duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Remap the block to `channels` interleaved channels.
    ///
    /// Same count is a passthrough, multi-channel to mono averages, and
    /// the general case wraps source channels (mono to stereo duplicates).
    pub fn into_channels(self, channels: u32) -> SampleBlock {
        if channels == self.channels || self.channels == 0 {
            return self;
        }
        let src_ch = self.channels as usize;
        let dst_ch = channels as usize;
        let frames = self.frames();

        let samples = if dst_ch == 1 {
            // Multi-channel → mono: average all channels
            let mut mono = Vec::with_capacity(frames);
            for i in 0..frames {
                let mut sum = 0.0f32;
                for c in 0..src_ch {
                    sum += self.samples[i * src_ch + c];
                }
                mono.push(sum / src_ch as f32);
            }
            mono
        } else {
            let mut out = Vec::with_capacity(frames * dst_ch);
            for i in 0..frames {
                for c in 0..dst_ch {
                    out.push(self.samples[i * src_ch + c % src_ch]);
                }
            }
            out
        };

        SampleBlock::new(samples, channels, self.sample_rate)
    }
}
