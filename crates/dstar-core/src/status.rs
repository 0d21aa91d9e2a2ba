//! Connection and session status enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the physical WebSocket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No socket.
    #[default]
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Socket open; commands can be sent.
    Connected,
}

impl ConnectionStatus {
    /// Whether commands can be sent.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Lifecycle of one logical session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session.
    #[default]
    Idle,
    /// Start sent, no progress yet.
    Starting,
    /// Progress received.
    Executing,
    /// Peer finished with an answer.
    Completed,
    /// Peer reported a failure.
    Errored,
    /// Peer acknowledged a cancel.
    Cancelled,
}

impl SessionStatus {
    /// `Starting` or `Executing`.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Executing)
    }

    /// `Completed`, `Errored` or `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Errored => write!(f, "errored"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
