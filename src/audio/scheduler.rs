//! Playback scheduler: keeps a monotonically advancing play cursor on
//! the output clock and paces block writes so playback is contiguous.
//!
//! Each scheduling step handles exactly one block: re-anchor the cursor
//! if playback fell behind, apply the gain ramp, hand the block to the
//! device, advance the cursor by the block duration, and report when to
//! wake up next — shortly before the block ends, so the follower is
//! queued with minimal gap but parameter changes still feel responsive.

use std::time::Duration;

use anyhow::Result;

use super::gain::{GainControl, GainRamp};
use super::jitter::JitterBuffer;
use super::output::AudioOutput;

/// Minimum wakeup delay; anything shorter just burns the loop.
const MIN_WAIT: f64 = 0.010;
/// Upper bound on how far before block end the next step runs.
const MAX_CHECK_AHEAD: f64 = 0.100;

pub struct PlaybackScheduler {
    /// Absolute output-clock time the next block must start at.
    /// Never decreases; re-anchored only when playback (re)starts.
    cursor: f64,
    /// Headroom added when re-anchoring, against scheduling jitter.
    lookahead: f64,
    gain: GainControl,
    ramp: GainRamp,
    blocks_scheduled: u64,
}

impl PlaybackScheduler {
    pub fn new(gain: GainControl, device_rate: u32, lookahead_ms: u64, ramp_ms: u64) -> Self {
        let initial_gain = gain.target_gain();
        Self {
            cursor: 0.0,
            lookahead: lookahead_ms as f64 / 1000.0,
            ramp: GainRamp::new(device_rate, ramp_ms, initial_gain),
            gain,
            blocks_scheduled: 0,
        }
    }

    /// Current cursor position on the output clock, in seconds.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn blocks_scheduled(&self) -> u64 {
        self.blocks_scheduled
    }

    /// Schedule one buffered block.
    ///
    /// Returns the delay until the next invocation, or `None` when the
    /// buffer is empty — the caller decides whether that is an underrun.
    pub fn schedule_pending(
        &mut self,
        buffer: &mut JitterBuffer,
        output: &mut dyn AudioOutput,
    ) -> Result<Option<Duration>> {
        let Some(mut block) = buffer.pop() else {
            return Ok(None);
        };

        let now = output.now();
        if self.cursor < now {
            // First start, or playback fell behind (underrun recovery):
            // restart a little ahead of the clock, not at it.
            self.cursor = now + self.lookahead;
            log::debug!("playback cursor re-anchored to {:.3}s", self.cursor);
        }

        let target = self.gain.target_gain();
        self.ramp
            .apply(&mut block.samples, block.channels as usize, target);

        output.write(&block.samples)?;

        let duration = block.duration();
        self.cursor += duration;
        self.blocks_scheduled += 1;

        let check_ahead = (duration / 2.0).min(MAX_CHECK_AHEAD);
        let wait = (duration - check_ahead).max(MIN_WAIT);
        Ok(Some(Duration::from_secs_f64(wait)))
    }

    /// Forget the cursor for a fresh session.
    pub fn reset(&mut self) {
        self.cursor = 0.0;
        self.blocks_scheduled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::block::SampleBlock;

    /// Output with a manually driven clock, recording every write.
    struct TestOutput {
        clock: f64,
        writes: Vec<usize>,
    }

    impl TestOutput {
        fn new() -> Self {
            Self {
                clock: 0.0,
                writes: Vec::new(),
            }
        }
    }

    impl AudioOutput for TestOutput {
        fn sample_rate(&self) -> u32 {
            16000
        }
        fn channels(&self) -> u32 {
            1
        }
        fn now(&self) -> f64 {
            self.clock
        }
        fn write(&mut self, samples: &[f32]) -> Result<()> {
            self.writes.push(samples.len());
            Ok(())
        }
    }

    fn scheduler() -> PlaybackScheduler {
        PlaybackScheduler::new(GainControl::default(), 16000, 50, 30)
    }

    fn block_20ms() -> SampleBlock {
        SampleBlock::new(vec![0.0; 320], 1, 16000)
    }

    #[test]
    fn empty_buffer_schedules_nothing() {
        let mut sched = scheduler();
        let mut buf = JitterBuffer::new();
        let mut out = TestOutput::new();
        assert!(sched.schedule_pending(&mut buf, &mut out).unwrap().is_none());
        assert!(out.writes.is_empty());
        assert_eq!(sched.blocks_scheduled(), 0);
    }

    #[test]
    fn first_block_anchors_with_lookahead() {
        let mut sched = scheduler();
        let mut buf = JitterBuffer::new();
        let mut out = TestOutput::new();
        out.clock = 1.0;
        buf.push(block_20ms());
        sched.schedule_pending(&mut buf, &mut out).unwrap();
        // anchored at now + 50 ms, then advanced by the 20 ms block
        assert!((sched.cursor() - 1.07).abs() < 1e-9);
        assert_eq!(out.writes, vec![320]);
    }

    #[test]
    fn contiguous_blocks_advance_back_to_back() {
        let mut sched = scheduler();
        let mut buf = JitterBuffer::new();
        let mut out = TestOutput::new();
        for _ in 0..5 {
            buf.push(block_20ms());
        }
        let mut prev_end = 0.0;
        while sched
            .schedule_pending(&mut buf, &mut out)
            .unwrap()
            .is_some()
        {
            let cursor = sched.cursor();
            // each block starts exactly at the previous block's end
            assert!(cursor >= prev_end);
            assert!((cursor - prev_end - 0.02).abs() < 1e-9 || prev_end == 0.0);
            prev_end = cursor;
        }
        assert_eq!(out.writes.len(), 5);
        assert_eq!(sched.blocks_scheduled(), 5);
    }

    #[test]
    fn cursor_is_monotonic_across_reanchor() {
        let mut sched = scheduler();
        let mut buf = JitterBuffer::new();
        let mut out = TestOutput::new();
        buf.push(block_20ms());
        sched.schedule_pending(&mut buf, &mut out).unwrap();
        let after_first = sched.cursor();

        // Simulate a long stall: the clock runs well past the cursor.
        out.clock = after_first + 5.0;
        buf.push(block_20ms());
        sched.schedule_pending(&mut buf, &mut out).unwrap();
        assert!(sched.cursor() > after_first);
        assert!((sched.cursor() - (out.clock + 0.05 + 0.02)).abs() < 1e-9);
    }

    #[test]
    fn wakeup_lands_shortly_before_block_end() {
        let mut sched = scheduler();
        let mut buf = JitterBuffer::new();
        let mut out = TestOutput::new();
        buf.push(block_20ms());
        let wait = sched
            .schedule_pending(&mut buf, &mut out)
            .unwrap()
            .unwrap();
        // 20 ms block: check-ahead is half the block, floor is 10 ms
        assert_eq!(wait, Duration::from_secs_f64(0.010));

        // A 400 ms block caps check-ahead at 100 ms.
        buf.push(SampleBlock::new(vec![0.0; 6400], 1, 16000));
        let wait = sched
            .schedule_pending(&mut buf, &mut out)
            .unwrap()
            .unwrap();
        assert_eq!(wait, Duration::from_secs_f64(0.300));
    }

    #[test]
    fn muted_gain_silences_scheduled_output() {
        let gain = GainControl::new(100, true);
        let mut sched = PlaybackScheduler::new(gain, 16000, 50, 30);
        let mut buf = JitterBuffer::new();

        struct Capture(Vec<f32>);
        impl AudioOutput for Capture {
            fn sample_rate(&self) -> u32 {
                16000
            }
            fn channels(&self) -> u32 {
                1
            }
            fn now(&self) -> f64 {
                0.0
            }
            fn write(&mut self, samples: &[f32]) -> Result<()> {
                self.0.extend_from_slice(samples);
                Ok(())
            }
        }

        let mut out = Capture(Vec::new());
        buf.push(SampleBlock::new(vec![1.0; 320], 1, 16000));
        sched.schedule_pending(&mut buf, &mut out).unwrap();
        assert!(out.0.iter().all(|&s| s == 0.0));
    }
}
