//! Wire protocol: the one-shot `audio_info` handshake.
//!
//! The first message on a connection must be a UTF-8 JSON text of the
//! form `{"type":"audio_info","codec":"pcm"|"opus","sampleRate":16000,
//! "channels":1}`. Everything after it is binary audio.

use serde::Deserialize;

use crate::error::EngineError;

/// Raw mirror of a server text message.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub codec: Option<String>,
    #[serde(rename = "sampleRate")]
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Pcm16,
    Opus,
}

/// Validated handshake parameters, immutable for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub codec: Codec,
    pub sample_rate: u32,
    pub channels: u32,
}

impl StreamInfo {
    /// Parse and validate the handshake text.
    pub fn parse_handshake(text: &str) -> Result<Self, EngineError> {
        let msg: ServerMessage = serde_json::from_str(text)
            .map_err(|e| EngineError::Protocol(format!("malformed handshake: {}", e)))?;

        if msg.msg_type != "audio_info" {
            return Err(EngineError::Protocol(format!(
                "expected audio_info handshake, got '{}'",
                msg.msg_type
            )));
        }

        let codec = match msg.codec.as_deref() {
            Some("pcm") => Codec::Pcm16,
            Some("opus") => Codec::Opus,
            Some(other) => {
                return Err(EngineError::Protocol(format!(
                    "unsupported codec '{}'",
                    other
                )));
            }
            None => {
                return Err(EngineError::Protocol(
                    "handshake missing codec".to_string(),
                ));
            }
        };

        let sample_rate = match msg.sample_rate {
            Some(rate) if rate > 0 => rate,
            _ => {
                return Err(EngineError::Protocol(
                    "handshake missing or zero sampleRate".to_string(),
                ));
            }
        };

        let channels = match msg.channels {
            Some(ch @ (1 | 2)) => ch,
            other => {
                return Err(EngineError::Protocol(format!(
                    "unsupported channel count {:?}",
                    other
                )));
            }
        };

        Ok(StreamInfo {
            codec,
            sample_rate,
            channels,
        })
    }
}

/// Whether a post-handshake text message is a (duplicate) `audio_info`.
pub fn is_audio_info(text: &str) -> bool {
    serde_json::from_str::<ServerMessage>(text)
        .map(|m| m.msg_type == "audio_info")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pcm_handshake() {
        let info = StreamInfo::parse_handshake(
            r#"{"type":"audio_info","codec":"pcm","sampleRate":16000,"channels":1}"#,
        )
        .unwrap();
        assert_eq!(info.codec, Codec::Pcm16);
        assert_eq!(info.sample_rate, 16000);
        assert_eq!(info.channels, 1);
    }

    #[test]
    fn parses_opus_stereo_handshake() {
        let info = StreamInfo::parse_handshake(
            r#"{"type":"audio_info","codec":"opus","sampleRate":48000,"channels":2}"#,
        )
        .unwrap();
        assert_eq!(info.codec, Codec::Opus);
        assert_eq!(info.channels, 2);
    }

    #[test]
    fn rejects_wrong_message_type() {
        let err = StreamInfo::parse_handshake(r#"{"type":"tts","codec":"pcm"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn rejects_unknown_codec() {
        let err = StreamInfo::parse_handshake(
            r#"{"type":"audio_info","codec":"mp3","sampleRate":44100,"channels":2}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn rejects_bad_channel_count() {
        let err = StreamInfo::parse_handshake(
            r#"{"type":"audio_info","codec":"pcm","sampleRate":16000,"channels":6}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn rejects_zero_rate_and_garbage() {
        assert!(
            StreamInfo::parse_handshake(
                r#"{"type":"audio_info","codec":"pcm","sampleRate":0,"channels":1}"#,
            )
            .is_err()
        );
        assert!(StreamInfo::parse_handshake("not json").is_err());
    }

    #[test]
    fn detects_duplicate_audio_info() {
        assert!(is_audio_info(
            r#"{"type":"audio_info","codec":"pcm","sampleRate":16000,"channels":1}"#
        ));
        assert!(!is_audio_info(r#"{"type":"toast","text":"hi"}"#));
        assert!(!is_audio_info("not json"));
    }
}
