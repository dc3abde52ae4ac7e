//! Structured wire-event logging (spec.md §6): one JSON object per line on
//! stderr, written directly rather than through the `log` formatter, so the
//! one-object-per-line contract survives `env_logger`'s coloring/wrapping.

use crate::codec::MessageKind;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Sent,
    Recv,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Sent => "sent",
            Action::Recv => "recv",
        }
    }
}

#[derive(Serialize)]
struct WireEvent<'a> {
    peer_id: i32,
    action: &'a str,
    message_type: &'a str,
    message_value: String,
    proposal_num: String,
}

/// Render a proposal value (a Unicode scalar packed into an `i32`, 0 meaning
/// "no value") as the single-character string the log schema expects.
#[must_use]
pub fn render_value(value: i32) -> String {
    if value == 0 {
        return String::new();
    }
    char::from_u32(value as u32).map_or_else(String::new, |c| c.to_string())
}

/// Emit one structured wire event to stderr, matching spec.md §6 exactly:
/// `{"peer_id":..,"action":"sent"|"recv","message_type":..,"message_value":"<char>","proposal_num":"<round>.<serverId>"}`.
pub fn log(peer_id: i32, action: Action, kind: MessageKind, value: i32, round: i32, server_id: i32) {
    let event = WireEvent {
        peer_id,
        action: action.as_str(),
        message_type: &kind.to_string(),
        message_value: render_value(value),
        proposal_num: format!("{round}.{server_id}"),
    };
    // Serialization of this struct cannot fail: every field is a plain
    // primitive or owned `String`.
    match serde_json::to_string(&event) {
        Ok(line) => eprintln!("{line}"),
        Err(error) => warn!("failed to serialize wire event: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{render_value, Action};
    use crate::codec::MessageKind;

    #[test]
    fn render_value_sentinel_is_empty() {
        assert_eq!(render_value(0), "");
    }

    #[test]
    fn render_value_ascii() {
        assert_eq!(render_value(0x41), "A");
    }

    #[test]
    fn action_as_str() {
        assert_eq!(Action::Sent.as_str(), "sent");
        assert_eq!(Action::Recv.as_str(), "recv");
    }

    #[test]
    fn message_kind_display_matches_schema_names() {
        assert_eq!(MessageKind::Prepare.to_string(), "prepare");
        assert_eq!(MessageKind::PrepareAck.to_string(), "prepare_ack");
        assert_eq!(MessageKind::Accept.to_string(), "accept");
        assert_eq!(MessageKind::AcceptAck.to_string(), "accept_ack");
    }
}
