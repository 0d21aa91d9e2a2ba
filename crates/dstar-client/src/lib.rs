//! # dstar-client
//!
//! Client-side session controller for a remote DS-STAR analysis agent.
//!
//! - **Connection**: [`ConnectionManager`] owns the WebSocket; [`ConnectionHandle`]
//!   is the send side
//! - **Dispatch**: [`MessageDispatcher`] decodes frames into typed messages
//! - **Controller**: [`SessionController`] is the session state machine
//! - **History**: [`HistoryLog`] records completed sessions, newest first
//! - **Runtime**: [`SessionRuntime`] runs the controller as a single-consumer
//!   task and publishes a [`SessionView`] after every transition
//! - **Uploads**: [`UploadClient`] talks to the HTTP file endpoints

#![deny(unsafe_code)]

pub mod connection;
pub mod controller;
pub mod dispatcher;
pub mod history;
pub mod runtime;
pub mod uploads;

pub use connection::{
    CommandSink, ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionManager,
    derive_ws_url,
};
pub use controller::SessionController;
pub use dispatcher::{MessageDispatcher, decode_frame};
pub use history::{HistoryEntry, HistoryLog};
pub use runtime::{SessionCommand, SessionError, SessionHandle, SessionRuntime, SessionView};
pub use uploads::{HealthStatus, UploadClient, UploadedFile};
