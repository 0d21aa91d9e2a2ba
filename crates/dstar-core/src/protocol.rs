//! Wire envelopes exchanged over the query WebSocket.
//!
//! Inbound events are tagged by `type`, outbound commands by `action`. Both
//! sets are closed: anything else is a protocol error at the decoder.

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::ids::SessionId;
use crate::snapshot::ExecutionSnapshot;

/// Well-known path of the query WebSocket on the peer.
pub const QUERY_WS_PATH: &str = "/ws/query";

/// Event sent by the remote peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// The peer accepted a start command.
    Start {
        /// Identifier the peer assigned to the session.
        session_id: SessionId,
        /// Informational text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Incremental progress.
    Progress {
        /// Full replacement snapshot.
        state: ExecutionSnapshot,
        /// Iteration the peer just finished.
        iteration: u32,
    },
    /// Terminal success.
    Complete {
        /// Final snapshot.
        state: ExecutionSnapshot,
        /// Answer to the query.
        final_answer: String,
    },
    /// Terminal failure.
    Error {
        /// Error text, shown to the user verbatim.
        message: String,
        /// Exception class name on the peer, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
    },
    /// The peer acknowledged a cancel.
    Cancelled {
        /// Informational text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Every `type` tag the client understands.
pub const INBOUND_KINDS: [&str; 5] = ["start", "progress", "complete", "error", "cancelled"];

impl InboundMessage {
    /// Wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Command sent to the remote peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Begin a new analysis.
    Start {
        /// Question to answer.
        query: String,
        /// Uploaded file identifiers.
        data_files: Vec<String>,
        /// Run options.
        config: AgentConfig,
    },
    /// Ask the peer to abort the running analysis.
    Cancel,
}

impl OutboundCommand {
    /// Wire tag of this command.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Cancel => "cancel",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
