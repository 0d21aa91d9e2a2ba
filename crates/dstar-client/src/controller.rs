//! Session state machine.
//!
//! ```text
//! idle -> starting -> executing -> completed | errored | cancelled
//!   ^                                            |
//!   +------------------- reset ------------------+
//! ```
//!
//! Every transition is a synchronous `&mut self` call, so a caller never
//! observes a half-applied message. Inbound messages that are not legal in
//! the current status are ignored.

use chrono::Utc;
use dstar_core::{
    AgentConfig, AgentConfigPatch, ExecutionSnapshot, HistoryEntryId, InboundMessage,
    OutboundCommand, Phase, SessionId, SessionStatus, ValidationError,
};
use tracing::{debug, info, warn};

use crate::connection::CommandSink;
use crate::history::{HistoryEntry, HistoryLog};

/// Owner of the single logical session and its history.
pub struct SessionController<S> {
    sink: S,
    config: AgentConfig,
    status: SessionStatus,
    session_id: Option<SessionId>,
    query: String,
    data_files: Vec<String>,
    snapshot: Option<ExecutionSnapshot>,
    iteration: u32,
    final_answer: Option<String>,
    error: Option<String>,
    history: HistoryLog,
}

impl<S: CommandSink> SessionController<S> {
    /// Idle controller with the default configuration.
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, AgentConfig::default())
    }

    /// Idle controller with a given starting configuration.
    pub fn with_config(sink: S, config: AgentConfig) -> Self {
        Self {
            sink,
            config,
            status: SessionStatus::Idle,
            session_id: None,
            query: String::new(),
            data_files: Vec::new(),
            snapshot: None,
            iteration: 0,
            final_answer: None,
            error: None,
            history: HistoryLog::new(),
        }
    }

    // ── commands ────────────────────────────────────────────────────

    /// Validate and send a `start` command.
    ///
    /// On failure the error message is also stored in [`Self::error`];
    /// nothing is sent and the status does not change.
    pub fn start_execution(
        &mut self,
        query: &str,
        data_files: Vec<String>,
    ) -> Result<(), ValidationError> {
        if let Err(e) = self.check_start(query, &data_files) {
            debug!(error = %e, "start rejected");
            self.error = Some(e.to_string());
            return Err(e);
        }

        let query = query.trim().to_owned();
        self.sink.send(&OutboundCommand::Start {
            query: query.clone(),
            data_files: data_files.clone(),
            config: self.config.clone(),
        });

        self.query = query;
        self.data_files = data_files;
        self.session_id = None;
        self.snapshot = None;
        self.final_answer = None;
        self.error = None;
        self.iteration = 0;
        self.status = SessionStatus::Starting;
        info!(files = self.data_files.len(), "session starting");
        Ok(())
    }

    fn check_start(&self, query: &str, data_files: &[String]) -> Result<(), ValidationError> {
        if self.status != SessionStatus::Idle {
            return Err(ValidationError::InvalidState {
                command: "start",
                status: self.status,
            });
        }
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        if data_files.is_empty() {
            return Err(ValidationError::NoFiles);
        }
        self.config.validate()?;
        let connection = self.sink.connection_status();
        if !connection.is_connected() {
            return Err(ValidationError::NotConnected(connection));
        }
        Ok(())
    }

    /// Ask the peer to cancel the active session.
    ///
    /// Returns `Ok(true)` when a `cancel` was sent and `Ok(false)` when there
    /// is nothing to cancel. The status only changes once the peer answers.
    pub fn cancel_execution(&mut self) -> Result<bool, ValidationError> {
        if !self.status.is_active() {
            debug!(status = %self.status, "nothing to cancel");
            return Ok(false);
        }
        let connection = self.sink.connection_status();
        if !connection.is_connected() {
            let e = ValidationError::NotConnected(connection);
            self.error = Some(e.to_string());
            return Err(e);
        }
        self.sink.send(&OutboundCommand::Cancel);
        info!(session_id = self.session_id.as_deref().unwrap_or(""), "cancel requested");
        Ok(true)
    }

    /// Return to idle, keeping history and configuration.
    ///
    /// Rejected without side effects while a session is active.
    pub fn reset(&mut self) -> Result<(), ValidationError> {
        if self.status.is_active() {
            return Err(ValidationError::InvalidState {
                command: "reset",
                status: self.status,
            });
        }
        self.status = SessionStatus::Idle;
        self.session_id = None;
        self.snapshot = None;
        self.final_answer = None;
        self.error = None;
        self.iteration = 0;
        Ok(())
    }

    /// Merge a partial configuration edit.
    ///
    /// Allowed only while no session is active. A patch with any
    /// out-of-range field is rejected whole.
    pub fn update_config(&mut self, patch: &AgentConfigPatch) -> Result<&AgentConfig, ValidationError> {
        if self.status.is_active() {
            return Err(ValidationError::InvalidState {
                command: "update config",
                status: self.status,
            });
        }
        self.config = self.config.merged(patch)?;
        Ok(&self.config)
    }

    /// Dismiss the user-visible error.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    // ── inbound ─────────────────────────────────────────────────────

    /// Apply one inbound message. Returns whether state changed.
    pub fn apply(&mut self, message: InboundMessage) -> bool {
        let kind = message.kind();
        let status = self.status;
        let applied = match message {
            InboundMessage::Start { session_id, .. } if status == SessionStatus::Starting => {
                info!(%session_id, "session accepted");
                self.session_id = Some(session_id);
                true
            }
            InboundMessage::Progress { state, iteration } if status.is_active() => {
                if iteration < self.iteration {
                    debug!(iteration, current = self.iteration, "stale iteration, keeping current");
                }
                self.iteration = self.iteration.max(iteration);
                self.snapshot = Some(state);
                self.status = SessionStatus::Executing;
                debug!(iteration = self.iteration, "progress applied");
                true
            }
            InboundMessage::Complete { state, final_answer } if status.is_active() => {
                self.complete(state, final_answer);
                true
            }
            InboundMessage::Error { message, error_type } if status.is_active() => {
                warn!(error_type = error_type.as_deref().unwrap_or(""), %message, "session failed");
                self.error = Some(message);
                self.status = SessionStatus::Errored;
                true
            }
            InboundMessage::Cancelled { .. } if status.is_active() => {
                info!("session cancelled");
                self.status = SessionStatus::Cancelled;
                true
            }
            _ => false,
        };
        if !applied {
            debug!(kind, %status, "ignoring out-of-state message");
        }
        applied
    }

    fn complete(&mut self, state: ExecutionSnapshot, final_answer: String) {
        self.iteration = self.iteration.max(state.iteration);
        let entry = self.history.record(HistoryEntry {
            id: HistoryEntryId::new(),
            session_id: self.session_id.clone(),
            query: self.query.clone(),
            data_files: self.data_files.clone(),
            config: self.config.clone(),
            snapshot: state.clone(),
            final_answer: final_answer.clone(),
            created_at: Utc::now(),
        });
        self.snapshot = Some(state);
        self.final_answer = Some(final_answer);
        self.status = SessionStatus::Completed;
        info!(history_id = %entry.id, "session completed");
    }

    // ── reads ───────────────────────────────────────────────────────

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether a session is starting or executing.
    pub fn is_executing(&self) -> bool {
        self.status.is_active()
    }

    /// Progress phase of the current snapshot.
    pub fn phase(&self) -> Option<Phase> {
        self.snapshot.as_ref().map(ExecutionSnapshot::phase)
    }

    /// Configuration used for the next start.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Peer-assigned id of the current session.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Query of the current or last session.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Data files of the current or last session.
    pub fn data_files(&self) -> &[String] {
        &self.data_files
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Option<&ExecutionSnapshot> {
        self.snapshot.as_ref()
    }

    /// Highest iteration seen in this session.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Answer, present only when completed.
    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    /// User-visible error.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Completed sessions.
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// The command sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
