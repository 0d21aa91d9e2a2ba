//! # dstar-core
//!
//! Shared vocabulary for the DS-STAR client.
//!
//! - **Protocol**: [`InboundMessage`] and [`OutboundCommand`] envelopes for the
//!   query WebSocket
//! - **Snapshot**: [`ExecutionSnapshot`] and its plan steps, file descriptors and
//!   execution results
//! - **Config**: [`AgentConfig`] with inclusive bounds and partial patches
//! - **Status**: connection and session status enums
//! - **Errors**: the `thiserror` taxonomy used by every other crate
//! - **Logging**: subscriber setup and test capture

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod snapshot;
pub mod status;

pub use config::{AgentConfig, AgentConfigPatch, ConfigField};
pub use errors::{ConfigError, ProtocolError, TransportError, UploadError, ValidationError};
pub use ids::{HistoryEntryId, SessionId};
pub use protocol::{InboundMessage, OutboundCommand, QUERY_WS_PATH};
pub use snapshot::{ExecutionResult, ExecutionSnapshot, FileDescriptor, Phase, PlanStep, StepStatus};
pub use status::{ConnectionStatus, SessionStatus};
