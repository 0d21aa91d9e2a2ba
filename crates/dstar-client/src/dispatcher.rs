//! Raw frame decoding and routing.

use dstar_core::protocol::INBOUND_KINDS;
use dstar_core::{InboundMessage, ProtocolError};
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::CommandSink;
use crate::controller::SessionController;

/// Decode one text frame into a typed message.
pub fn decode_frame(frame: &str) -> Result<InboundMessage, ProtocolError> {
    let value: Value = serde_json::from_str(frame).map_err(ProtocolError::NotJson)?;
    let kind = value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_owned();
    if !INBOUND_KINDS.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownKind(kind));
    }
    serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { kind, source })
}

/// Decodes frames and forwards them to a controller, counting outcomes.
#[derive(Debug, Default)]
pub struct MessageDispatcher {
    dispatched: u64,
    dropped: u64,
}

impl MessageDispatcher {
    /// Fresh dispatcher with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `frame` and apply it. Bad frames are logged and dropped.
    ///
    /// Returns whether the controller's state changed.
    pub fn dispatch<S: CommandSink>(
        &mut self,
        frame: &str,
        controller: &mut SessionController<S>,
    ) -> bool {
        match decode_frame(frame) {
            Ok(message) => {
                self.dispatched += 1;
                controller.apply(message)
            }
            Err(e) => {
                self.dropped += 1;
                if e.is_forward_compatible() {
                    debug!(error = %e, "dropping unrecognized frame");
                } else {
                    warn!(error = %e, len = frame.len(), "dropping malformed frame");
                }
                false
            }
        }
    }

    /// Frames decoded and handed to the controller.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Frames that failed to decode.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use assert_matches::assert_matches;
    use dstar_core::logging::capture_logs;
    use dstar_core::{ConnectionStatus, OutboundCommand, SessionStatus};
    use tracing::Level;

    #[derive(Default)]
    struct ConnectedSink {
        sent: RefCell<Vec<OutboundCommand>>,
    }

    impl CommandSink for ConnectedSink {
        fn connection_status(&self) -> ConnectionStatus {
            ConnectionStatus::Connected
        }

        fn send(&self, command: &OutboundCommand) {
            self.sent.borrow_mut().push(command.clone());
        }
    }

    fn executing() -> SessionController<ConnectedSink> {
        let mut ctl = SessionController::new(ConnectedSink::default());
        ctl.start_execution("q", vec!["a.csv".into()]).unwrap();
        ctl
    }

    // ── decode_frame ────────────────────────────────────────────────

    #[test]
    fn decode_known_kind() {
        let msg = decode_frame(r#"{"type":"start","session_id":"s1"}"#).unwrap();
        assert_eq!(msg.kind(), "start");
    }

    #[test]
    fn decode_rejects_non_json() {
        assert_matches!(decode_frame("not json"), Err(ProtocolError::NotJson(_)));
    }

    #[test]
    fn decode_rejects_non_object() {
        assert_matches!(decode_frame("[1,2]"), Err(ProtocolError::MissingType));
        assert_matches!(decode_frame(r#"{"type": 3}"#), Err(ProtocolError::MissingType));
    }

    #[test]
    fn decode_reports_unknown_kind() {
        assert_matches!(
            decode_frame(r#"{"type":"heartbeat"}"#),
            Err(ProtocolError::UnknownKind(kind)) if kind == "heartbeat"
        );
    }

    #[test]
    fn decode_reports_malformed_known_kind() {
        assert_matches!(
            decode_frame(r#"{"type":"progress","iteration":"one"}"#),
            Err(ProtocolError::Malformed { kind, .. }) if kind == "progress"
        );
    }

    // ── dispatch ────────────────────────────────────────────────────

    #[test]
    fn dispatch_applies_in_order() {
        let mut ctl = executing();
        let mut dispatcher = MessageDispatcher::new();
        assert!(dispatcher.dispatch(r#"{"type":"start","session_id":"s1"}"#, &mut ctl));
        assert!(dispatcher.dispatch(
            r#"{"type":"progress","iteration":1,"state":{"iteration":1}}"#,
            &mut ctl
        ));
        assert_eq!(ctl.status(), SessionStatus::Executing);
        assert_eq!(dispatcher.dispatched(), 2);
        assert_eq!(dispatcher.dropped(), 0);
    }

    #[test]
    fn unknown_kind_leaves_state_and_logs_debug() {
        let (logs, _guard) = capture_logs();
        let mut ctl = executing();
        let mut dispatcher = MessageDispatcher::new();

        assert!(!dispatcher.dispatch(r#"{"type":"heartbeat","n":1}"#, &mut ctl));
        assert_eq!(ctl.status(), SessionStatus::Starting);
        assert_eq!(ctl.iteration(), 0);
        assert_eq!(dispatcher.dropped(), 1);
        assert!(logs.has_event(Level::DEBUG, "dropping unrecognized frame"));
    }

    #[test]
    fn malformed_frame_logs_warning() {
        let (logs, _guard) = capture_logs();
        let mut ctl = executing();
        let mut dispatcher = MessageDispatcher::new();

        assert!(!dispatcher.dispatch("{oops", &mut ctl));
        assert!(!dispatcher.dispatch(r#"{"type":"complete","state":{}}"#, &mut ctl));
        assert_eq!(ctl.status(), SessionStatus::Starting);
        assert!(ctl.history().is_empty());
        assert_eq!(logs.count_at_level(Level::WARN), 2);
    }

    #[test]
    fn decoded_but_out_of_state_counts_as_dispatched() {
        let mut ctl = SessionController::new(ConnectedSink::default());
        let mut dispatcher = MessageDispatcher::new();
        assert!(!dispatcher.dispatch(r#"{"type":"cancelled"}"#, &mut ctl));
        assert_eq!(dispatcher.dispatched(), 1);
        assert_eq!(ctl.status(), SessionStatus::Idle);
    }
}
