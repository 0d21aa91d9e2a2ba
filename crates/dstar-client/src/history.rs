//! Record of completed sessions, newest first.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dstar_core::{AgentConfig, ExecutionSnapshot, HistoryEntryId, SessionId};
use serde::Serialize;

/// One completed session. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Locally minted, time-ordered identifier.
    pub id: HistoryEntryId,
    /// Peer-assigned session identifier, if a `start` was received.
    pub session_id: Option<SessionId>,
    /// The query as submitted.
    pub query: String,
    /// Data file identifiers as submitted.
    pub data_files: Vec<String>,
    /// Configuration the session ran with.
    pub config: AgentConfig,
    /// Final snapshot.
    pub snapshot: ExecutionSnapshot,
    /// Answer from the `complete` message.
    pub final_answer: String,
    /// When the entry was recorded.
    pub created_at: DateTime<Utc>,
}

/// Append-only log. Only the session controller can add to it.
#[derive(Clone, Debug, Default)]
pub struct HistoryLog {
    entries: VecDeque<Arc<HistoryEntry>>,
}

impl HistoryLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, entry: HistoryEntry) -> Arc<HistoryEntry> {
        let entry = Arc::new(entry);
        self.entries.push_front(Arc::clone(&entry));
        entry
    }

    /// Entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<HistoryEntry>> {
        self.entries.iter()
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&Arc<HistoryEntry>> {
        self.entries.front()
    }


    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no session has completed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared copies of every entry, most recent first.
    pub fn to_vec(&self) -> Vec<Arc<HistoryEntry>> {
        self.entries.iter().cloned().collect()
    }
}
