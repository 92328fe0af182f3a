//! Frame decoders turning wire payloads into normalized sample blocks.
//!
//! One decoder instance exists per session, constructed from the
//! negotiated handshake. PCM16 is stateless; Opus keeps decoder state
//! across packets and must therefore see frames in arrival order.

use anyhow::Result;

use super::block::SampleBlock;
use crate::error::EngineError;
use crate::protocol::{Codec, StreamInfo};

/// Largest Opus frame is 120 ms; at 48 kHz that is 5760 samples per channel.
const OPUS_MAX_FRAME: usize = 5760;

pub enum FrameDecoder {
    Pcm16 {
        channels: u32,
        sample_rate: u32,
    },
    Opus {
        decoder: opus::Decoder,
        channels: u32,
        sample_rate: u32,
    },
}

impl FrameDecoder {
    /// Build the decoder for a negotiated stream.
    ///
    /// Opus decoder construction failure is fatal to the session.
    pub fn new(info: &StreamInfo) -> Result<Self, EngineError> {
        match info.codec {
            Codec::Pcm16 => Ok(FrameDecoder::Pcm16 {
                channels: info.channels,
                sample_rate: info.sample_rate,
            }),
            Codec::Opus => {
                let channels = if info.channels == 1 {
                    opus::Channels::Mono
                } else {
                    opus::Channels::Stereo
                };
                let decoder = opus::Decoder::new(info.sample_rate, channels).map_err(|e| {
                    EngineError::Codec(format!(
                        "failed to create opus decoder ({} Hz, {} ch): {}",
                        info.sample_rate, info.channels, e
                    ))
                })?;
                Ok(FrameDecoder::Opus {
                    decoder,
                    channels: info.channels,
                    sample_rate: info.sample_rate,
                })
            }
        }
    }

    /// Decode one wire frame into a normalized block at the source rate.
    ///
    /// Errors here mean a single corrupt frame; the caller drops the
    /// frame and keeps the stream alive.
    pub fn decode(&mut self, data: &[u8]) -> Result<SampleBlock> {
        match self {
            FrameDecoder::Pcm16 {
                channels,
                sample_rate,
            } => {
                if data.len() % 2 != 0 {
                    log::warn!(
                        "pcm frame has odd length {}, truncating dangling byte",
                        data.len()
                    );
                }
                let samples: Vec<f32> = data
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
                    .collect();
                Ok(SampleBlock::new(samples, *channels, *sample_rate))
            }
            FrameDecoder::Opus {
                decoder,
                channels,
                sample_rate,
            } => {
                let mut pcm = vec![0f32; OPUS_MAX_FRAME * *channels as usize];
                let frames = decoder.decode_float(data, &mut pcm, false)?;
                pcm.truncate(frames * *channels as usize);
                Ok(SampleBlock::new(pcm, *channels, *sample_rate))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_info(sample_rate: u32, channels: u32) -> StreamInfo {
        StreamInfo {
            codec: Codec::Pcm16,
            sample_rate,
            channels,
        }
    }

    #[test]
    fn pcm16_normalization_endpoints() {
        let mut dec = FrameDecoder::new(&pcm_info(16000, 1)).unwrap();
        let bytes = [
            i16::MIN.to_le_bytes(),
            i16::MAX.to_le_bytes(),
            0i16.to_le_bytes(),
        ]
        .concat();
        let block = dec.decode(&bytes).unwrap();
        assert_eq!(block.samples[0], -1.0);
        assert!((block.samples[1] - 0.999_969_5).abs() < 1e-6);
        assert_eq!(block.samples[2], 0.0);
    }

    #[test]
    fn pcm16_silent_frame_is_all_zeros() {
        let mut dec = FrameDecoder::new(&pcm_info(16000, 1)).unwrap();
        let block = dec.decode(&[0u8; 640]).unwrap();
        assert_eq!(block.frames(), 320);
        assert_eq!(block.sample_rate, 16000);
        assert!(block.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn pcm16_odd_length_truncates_dangling_byte() {
        let mut dec = FrameDecoder::new(&pcm_info(16000, 1)).unwrap();
        let block = dec.decode(&[0u8; 5]).unwrap();
        assert_eq!(block.frames(), 2);
    }

    #[test]
    fn opus_decoder_rejects_unsupported_rate() {
        let info = StreamInfo {
            codec: Codec::Opus,
            sample_rate: 44100,
            channels: 1,
        };
        match FrameDecoder::new(&info) {
            Err(EngineError::Codec(_)) => {}
            other => panic!("expected codec error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn opus_corrupt_frame_is_an_error_not_a_panic() {
        let info = StreamInfo {
            codec: Codec::Opus,
            sample_rate: 48000,
            channels: 1,
        };
        let mut dec = FrameDecoder::new(&info).unwrap();
        // Code-3 TOC byte with no frame count byte is an invalid packet.
        assert!(dec.decode(&[0xff]).is_err());
    }
}
