//! Single-consumer event loop around a [`SessionController`].
//!
//! The runtime task is the only owner of the controller. It reads connection
//! events and user commands from two channels, applies each one fully, and
//! then publishes a fresh [`SessionView`]. Command replies are sent after the
//! view is published, so a caller that awaits a command sees its effect.

use std::sync::Arc;

use dstar_core::{
    AgentConfig, AgentConfigPatch, ConnectionStatus, ExecutionSnapshot, Phase, SessionId,
    SessionStatus, ValidationError,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, warn};

use crate::connection::{CommandSink, ConnectionEvent};
use crate::controller::SessionController;
use crate::dispatcher::MessageDispatcher;
use crate::history::HistoryEntry;

/// Capacity of the command channel.
const COMMAND_CAPACITY: usize = 32;

/// Failure of a command sent through a [`SessionHandle`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The controller refused the command.
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    /// The runtime task is gone.
    #[error("session runtime has stopped")]
    Stopped,
}

/// Everything a presentation layer needs, captured after a transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionView {
    /// Physical connection status.
    pub connection: ConnectionStatus,
    /// Session status.
    pub status: SessionStatus,
    /// Peer-assigned session id.
    pub session_id: Option<SessionId>,
    /// Query of the current or last session.
    pub query: String,
    /// Highest iteration seen.
    pub iteration: u32,
    /// Progress phase, when a snapshot exists.
    pub phase: Option<Phase>,
    /// Latest snapshot.
    pub snapshot: Option<ExecutionSnapshot>,
    /// Answer, when completed.
    pub final_answer: Option<String>,
    /// User-visible error.
    pub error: Option<String>,
    /// Configuration for the next start.
    pub config: AgentConfig,
    /// Completed sessions, most recent first.
    pub history: Vec<Arc<HistoryEntry>>,
    /// Frames dropped by the decoder so far.
    pub dropped_frames: u64,
}

impl SessionView {
    fn capture<S: CommandSink>(ctl: &SessionController<S>, dispatcher: &MessageDispatcher) -> Self {
        Self {
            connection: ctl.sink().connection_status(),
            status: ctl.status(),
            session_id: ctl.session_id().cloned(),
            query: ctl.query().to_owned(),
            iteration: ctl.iteration(),
            phase: ctl.phase(),
            snapshot: ctl.snapshot().cloned(),
            final_answer: ctl.final_answer().map(str::to_owned),
            error: ctl.error().map(str::to_owned),
            config: ctl.config().clone(),
            history: ctl.history().to_vec(),
            dropped_frames: dispatcher.dropped(),
        }
    }

    /// Whether a session is starting or executing.
    pub fn is_executing(&self) -> bool {
        self.status.is_active()
    }
}

/// User commands accepted by the runtime.
#[derive(Debug)]
pub enum SessionCommand {
    /// See [`SessionController::start_execution`].
    Start {
        /// Query text.
        query: String,
        /// Uploaded file identifiers.
        data_files: Vec<String>,
        /// Outcome.
        reply: oneshot::Sender<Result<(), ValidationError>>,
    },
    /// See [`SessionController::cancel_execution`].
    Cancel {
        /// Whether a cancel was sent.
        reply: oneshot::Sender<Result<bool, ValidationError>>,
    },
    /// See [`SessionController::reset`].
    Reset {
        /// Outcome.
        reply: oneshot::Sender<Result<(), ValidationError>>,
    },
    /// See [`SessionController::update_config`].
    UpdateConfig {
        /// Fields to change.
        patch: AgentConfigPatch,
        /// Resulting configuration.
        reply: oneshot::Sender<Result<AgentConfig, ValidationError>>,
    },
    /// See [`SessionController::clear_error`].
    ClearError,
    /// Stop the loop and hand the controller back.
    Shutdown,
}

struct RuntimeCore<S> {
    controller: SessionController<S>,
    dispatcher: MessageDispatcher,
    view: watch::Sender<SessionView>,
}

impl<S: CommandSink> RuntimeCore<S> {
    fn publish(&self) {
        let _ = self
            .view
            .send_replace(SessionView::capture(&self.controller, &self.dispatcher));
    }

    fn on_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => debug!("connection opened"),
            ConnectionEvent::Frame(frame) => {
                let _ = self.dispatcher.dispatch(&frame, &mut self.controller);
            }
            ConnectionEvent::Closed { reason } => {
                if self.controller.is_executing() {
                    warn!(
                        reason = reason.as_deref().unwrap_or(""),
                        status = %self.controller.status(),
                        "connection lost during active session"
                    );
                } else {
                    debug!(reason = reason.as_deref().unwrap_or(""), "connection closed");
                }
            }
        }
        self.publish();
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start {
                query,
                data_files,
                reply,
            } => {
                let result = self.controller.start_execution(&query, data_files);
                self.publish();
                let _ = reply.send(result);
            }
            SessionCommand::Cancel { reply } => {
                let result = self.controller.cancel_execution();
                self.publish();
                let _ = reply.send(result);
            }
            SessionCommand::Reset { reply } => {
                let result = self.controller.reset();
                self.publish();
                let _ = reply.send(result);
            }
            SessionCommand::UpdateConfig { patch, reply } => {
                let result = self.controller.update_config(&patch).cloned();
                self.publish();
                let _ = reply.send(result);
            }
            SessionCommand::ClearError => {
                self.controller.clear_error();
                self.publish();
            }
            SessionCommand::Shutdown => {}
        }
    }
}

/// The event loop. Build with [`SessionRuntime::new`], then spawn [`SessionRuntime::run`].
pub struct SessionRuntime<S> {
    core: RuntimeCore<S>,
    events: mpsc::Receiver<ConnectionEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    connection: Option<watch::Receiver<ConnectionStatus>>,
}

impl<S: CommandSink> SessionRuntime<S> {
    /// Wrap a controller and the connection's event receiver.
    pub fn new(
        controller: SessionController<S>,
        events: mpsc::Receiver<ConnectionEvent>,
    ) -> (Self, SessionHandle) {
        let dispatcher = MessageDispatcher::new();
        let (view, view_rx) = watch::channel(SessionView::capture(&controller, &dispatcher));
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let runtime = Self {
            core: RuntimeCore {
                controller,
                dispatcher,
                view,
            },
            events,
            commands,
            connection: None,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            view: view_rx,
        };
        (runtime, handle)
    }

    /// Republish the view whenever `status` changes, so transient states such
    /// as `connecting` reach observers even though no event carries them.
    #[must_use]
    pub fn with_connection_status(mut self, status: watch::Receiver<ConnectionStatus>) -> Self {
        self.connection = Some(status);
        self
    }

    /// Process events and commands until shut down or every handle is dropped.
    ///
    /// Returns the controller so callers can inspect final state.
    #[instrument(skip_all)]
    pub async fn run(self) -> SessionController<S> {
        let Self {
            mut core,
            mut events,
            mut commands,
            mut connection,
        } = self;
        let mut events_open = true;
        info!("session runtime started");

        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => core.on_event(event),
                    None => {
                        debug!("connection event channel closed");
                        events_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => core.on_command(command),
                },
                changed = connection_changed(&mut connection) => {
                    if changed {
                        core.publish();
                    } else {
                        connection = None;
                    }
                }
            }
        }

        info!(
            dispatched = core.dispatcher.dispatched(),
            dropped = core.dispatcher.dropped(),
            "session runtime stopped"
        );
        core.controller
    }
}

/// Resolves on the next status change; never resolves without a receiver.
async fn connection_changed(status: &mut Option<watch::Receiver<ConnectionStatus>>) -> bool {
    match status {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

/// Cloneable client of a running [`SessionRuntime`].
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, ValidationError>>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SessionError::Stopped)?;
        Ok(rx.await.map_err(|_| SessionError::Stopped)??)
    }

    /// Start a session.
    pub async fn start(
        &self,
        query: impl Into<String>,
        data_files: Vec<String>,
    ) -> Result<(), SessionError> {
        let query = query.into();
        self.request(|reply| SessionCommand::Start {
            query,
            data_files,
            reply,
        })
        .await
    }

    /// Request cancellation. `Ok(false)` means nothing was active.
    pub async fn cancel(&self) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::Cancel { reply }).await
    }

    /// Return to idle.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Reset { reply }).await
    }

    /// Merge a configuration edit, returning the new configuration.
    pub async fn update_config(&self, patch: AgentConfigPatch) -> Result<AgentConfig, SessionError> {
        self.request(|reply| SessionCommand::UpdateConfig { patch, reply })
            .await
    }

    /// Dismiss the user-visible error.
    pub async fn clear_error(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::ClearError)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    /// Ask the loop to stop.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }

    /// Latest published view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified on every published view.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Wait until a published view satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionView) -> bool,
    ) -> Result<SessionView, SessionError> {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(|view| predicate(view))
            .await
            .map_err(|_| SessionError::Stopped)?;
        Ok(view.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
