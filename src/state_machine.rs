//! Session lifecycle states.
//!
//! Idle --start--> Connecting --handshake--> Buffering --threshold-->
//! Streaming --underrun--> Buffering; any state --stop--> Stopping -->
//! Idle; any state --fatal--> Error --stop--> Idle.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Buffering,
    Streaming,
    Stopping,
    Error(String),
}

impl SessionState {
    /// A session task exists and audio may flow.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Buffering | SessionState::Streaming
        )
    }

    /// Only Idle accepts a new start request.
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Buffering => write!(f, "buffering"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}
