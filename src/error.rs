//! Session error taxonomy.
//!
//! Everything here is fatal to the session it occurs in. Recoverable
//! conditions — a single corrupt frame, a buffer underrun — never
//! surface as these; they are logged and handled in place.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Address unreachable, connection refused or dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed or out-of-order handshake, binary data before handshake.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Decoder construction failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Playback device acquisition or unrecoverable write failure.
    #[error("audio output error: {0}")]
    Output(String),
}
