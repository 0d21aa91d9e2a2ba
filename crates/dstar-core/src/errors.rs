//! Error taxonomy for the DS-STAR client.
//!
//! - [`ValidationError`]: a command was refused before anything was sent
//! - [`ConfigError`]: a configuration value is out of bounds
//! - [`TransportError`]: the WebSocket could not be opened
//! - [`ProtocolError`]: an inbound frame could not be decoded
//! - [`UploadError`]: the HTTP file side-channel failed
//!
//! Remote task failures are not Rust errors: they arrive as protocol messages
//! and end up in the controller's user-visible error field.

use thiserror::Error;

use crate::config::ConfigField;
use crate::status::{ConnectionStatus, SessionStatus};

/// A user command that was refused before anything was sent.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ValidationError {
    /// The query was empty or whitespace.
    #[error("Please enter a query")]
    EmptyQuery,
    /// No data files were supplied.
    #[error("Please upload at least one data file")]
    NoFiles,
    /// The connection is not open.
    #[error("Not connected to server (connection is {0})")]
    NotConnected(ConnectionStatus),
    /// The command is not legal in the current session status.
    #[error("Cannot {command} while session is {status}")]
    InvalidState {
        /// The refused command.
        command: &'static str,
        /// Session status at the time.
        status: SessionStatus,
    },
    /// The configuration has a field out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A configuration value outside its valid range.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// The field's value is outside `min..=max`.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Offending field.
        field: ConfigField,
        /// Supplied value.
        value: f64,
        /// Inclusive minimum.
        min: f64,
        /// Inclusive maximum.
        max: f64,
    },
}

/// Failure to open or use the WebSocket.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URL could not be turned into a WebSocket URL.
    #[error("invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The handshake failed.
    #[error("failed to connect to {url}: {reason}")]
    ConnectFailed {
        /// WebSocket URL.
        url: String,
        /// Underlying error text.
        reason: String,
    },
    /// The handshake did not finish in time.
    #[error("timed out after {timeout_ms}ms connecting to {url}")]
    Timeout {
        /// WebSocket URL.
        url: String,
        /// Configured timeout.
        timeout_ms: u64,
    },
    /// `open` was called while a socket is already open or opening.
    #[error("connection already {0}")]
    AlreadyOpen(ConnectionStatus),
}

/// An inbound frame that is not one of the known messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object.
    #[error("frame is not a JSON object: {0}")]
    NotJson(#[source] serde_json::Error),
    /// The object has no string `type` field.
    #[error("frame has no message type")]
    MissingType,
    /// The `type` is not one the client knows.
    #[error("unknown message type '{0}'")]
    UnknownKind(String),
    /// The `type` is known but the payload does not match it.
    #[error("malformed '{kind}' message: {source}")]
    Malformed {
        /// Message type.
        kind: String,
        /// Decode failure.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Whether the frame may simply be from a newer peer.
    pub fn is_forward_compatible(&self) -> bool {
        matches!(self, Self::UnknownKind(_))
    }
}

/// Failure on the HTTP file side-channel.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The server base URL cannot carry a path.
    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The local file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadFile {
        /// Local path.
        path: String,
        /// IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The request did not complete.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Request URL.
        url: String,
        /// HTTP client failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The server answered with a non-success status.
    #[error("server returned {status} for {url}: {body}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// The response body did not match the expected shape.
    #[error("unexpected response from {url}: {reason}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decode failure.
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_user_facing() {
        assert_eq!(ValidationError::EmptyQuery.to_string(), "Please enter a query");
        assert_eq!(
            ValidationError::NotConnected(ConnectionStatus::Connecting).to_string(),
            "Not connected to server (connection is connecting)"
        );
        assert_eq!(
            ValidationError::InvalidState {
                command: "reset",
                status: SessionStatus::Executing,
            }
            .to_string(),
            "Cannot reset while session is executing"
        );
    }

    #[test]
    fn config_error_names_field_and_range() {
        let err = ConfigError::OutOfRange {
            field: ConfigField::MaxTokens,
            value: 100.0,
            min: 1024.0,
            max: 16384.0,
        };
        assert_eq!(
            err.to_string(),
            "max_tokens must be between 1024 and 16384, got 100"
        );
        let wrapped: ValidationError = err.into();
        assert!(wrapped.to_string().starts_with("max_tokens"));
    }

    #[test]
    fn unknown_kind_is_forward_compatible() {
        assert!(ProtocolError::UnknownKind("heartbeat".into()).is_forward_compatible());
        assert!(!ProtocolError::MissingType.is_forward_compatible());
    }

    #[test]
    fn transport_timeout_display() {
        let err = TransportError::Timeout {
            url: "ws://localhost:8000/ws/query".into(),
            timeout_ms: 5000,
        };
        assert_eq!(
            err.to_string(),
            "timed out after 5000ms connecting to ws://localhost:8000/ws/query"
        );
    }
}
