use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pomodoro::{SessionMode, SessionStateMachine};

/// Authoritative view of the primary session, pushed to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub seconds_remaining: u32,
    pub running: bool,
    pub mode: SessionMode,
    #[serde(default)]
    pub elapsed_seconds: u32,
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default)]
    pub unbounded: bool,
}

impl From<&SessionStateMachine> for StateSnapshot {
    fn from(machine: &SessionStateMachine) -> Self {
        let state = machine.state();
        Self {
            seconds_remaining: state.seconds_remaining,
            running: state.running,
            mode: state.mode,
            elapsed_seconds: state.elapsed_seconds,
            duration_seconds: machine.current_duration(),
            unbounded: machine.is_unbounded(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncMessage {
    StatePush(StateSnapshot),
    Control { action: ControlAction },
}

const KNOWN_TYPES: [&str; 2] = ["state-push", "control"];

pub fn encode(message: &SyncMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Parses one frame. Frames whose `type` is missing or unknown decode to
/// `Ok(None)` and are dropped by the receiver.
pub fn decode(text: &str) -> serde_json::Result<Option<SyncMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let known = value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| KNOWN_TYPES.contains(&kind));
    if !known {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_push_uses_wire_names() {
        let message = SyncMessage::StatePush(StateSnapshot {
            seconds_remaining: 300,
            running: true,
            mode: SessionMode::ShortBreak,
            elapsed_seconds: 0,
            duration_seconds: 300,
            unbounded: false,
        });
        let json = encode(&message).unwrap();
        assert!(json.contains(r#""type":"state-push""#));
        assert!(json.contains(r#""secondsRemaining":300"#));
        assert!(json.contains(r#""mode":"short-break""#));
    }

    #[test]
    fn minimal_state_push_is_accepted() {
        let decoded =
            decode(r#"{"type":"state-push","secondsRemaining":12,"running":false,"mode":"focus"}"#)
                .unwrap();
        match decoded {
            Some(SyncMessage::StatePush(snapshot)) => {
                assert_eq!(snapshot.seconds_remaining, 12);
                assert_eq!(snapshot.mode, SessionMode::Focus);
                assert!(!snapshot.unbounded);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn control_round_trips_through_text() {
        let decoded = decode(r#"{"type":"control","action":"reset"}"#).unwrap();
        assert_eq!(
            decoded,
            Some(SyncMessage::Control {
                action: ControlAction::Reset
            })
        );
    }

    #[test]
    fn unknown_types_are_ignored() {
        assert_eq!(decode(r#"{"type":"resize","width":10}"#).unwrap(), None);
        assert_eq!(decode(r#"{"action":"start"}"#).unwrap(), None);
        assert_eq!(decode(r#"[1,2,3]"#).unwrap(), None);
    }

    #[test]
    fn malformed_known_types_are_errors() {
        assert!(decode(r#"{"type":"control","action":"skip"}"#).is_err());
        assert!(decode("not json").is_err());
    }
}
