//! Connection lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the single store connection
///
/// ```text
/// Disconnected ──connect()──▶ Connecting ──handshake ok──▶ Ready
///       ▲                          │                        │
///       │                    attempt failed          connection lost
///       │                          ▼                        ▼
///  disconnect()              Reconnecting ◀─────────────────┘
///                                  │  └──reconnect ok──▶ Ready
///                      attempts exhausted
///                                  ▼
///                          TerminallyFailed
/// ```
///
/// Operations are only attempted in [`ConnectionState::Ready`]; every other
/// state short-circuits to a fail-open result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
    /// Reconnect attempts exhausted; only an explicit `connect()` leaves this state
    TerminallyFailed,
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminallyFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::TerminallyFailed => "terminally_failed",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ready_is_ready() {
        assert!(ConnectionState::Ready.is_ready());
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
            ConnectionState::TerminallyFailed,
        ] {
            assert!(!state.is_ready(), "{state} should not accept operations");
        }
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&ConnectionState::TerminallyFailed).unwrap();
        assert_eq!(json, "\"terminally_failed\"");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
