//! Call state derived from NCID messages, and the transition function that
//! moves it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::fields::FieldName;
use crate::identity::{extract_identity, CallerIdentity};
use crate::protocol::{Command, Message};

/// Anomaly reported when a ring arrives without a preceding `CID`/`PID`.
pub const ANOMALY_RING_WITHOUT_CALL: &str = "CIDINFO ring with no call in progress";

/// Anomaly reported when `END` arrives while a call still looks active.
pub const ANOMALY_END_WITHOUT_TERMINATOR: &str = "END with no prior CIDINFO terminator";

/// Normalized line state. Starts as [`CallState::OnHook`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    OnHook,
    IncomingRinging,
    OutgoingRinging,
    InCall,
}

impl CallState {
    /// Human-readable state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnHook => "on hook",
            Self::IncomingRinging => "incoming ringing",
            Self::OutgoingRinging => "outgoing ringing",
            Self::InCall => "in call",
        }
    }

    /// Anything other than on hook.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::OnHook)
    }

    /// Direction of the ringing call, `None` when not ringing.
    pub fn ringing_direction(&self) -> Option<CallDirection> {
        match self {
            Self::IncomingRinging => Some(CallDirection::Incoming),
            Self::OutgoingRinging => Some(CallDirection::Outgoing),
            _ => None,
        }
    }

    /// Material Design icon name for dashboards.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::OnHook => "mdi:phone-hangup",
            Self::IncomingRinging => "mdi:phone-incoming",
            Self::OutgoingRinging => "mdi:phone-outgoing",
            Self::InCall => "mdi:phone-in-talk",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an identified call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        };
        f.write_str(name)
    }
}

/// Meaning of the `RING` field of a `CIDINFO` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingStatus {
    /// `RING` = 0
    Answered,
    /// `RING` = -1
    RemoteHangup,
    /// `RING` = -2
    LocalHangup,
    /// Positive ring count. `None` when the field was missing or not a
    /// known value; such lines are handled as a ring.
    Ringing(Option<u32>),
}

impl RingStatus {
    /// Interpret a raw `RING` value.
    pub fn from_field(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().parse::<i64>()) {
            Some(Ok(0)) => Self::Answered,
            Some(Ok(-1)) => Self::RemoteHangup,
            Some(Ok(-2)) => Self::LocalHangup,
            Some(Ok(n)) if n > 0 => Self::Ringing(u32::try_from(n).ok()),
            _ => {
                trace!("RING value {:?} not recognised, treating as ring", value);
                Self::Ringing(None)
            }
        }
    }
}

/// Result of feeding one message to [`advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the message. The indicated target is always taken.
    pub next: CallState,
    /// Identity carried by the message, when the command carries one.
    pub identity: Option<CallerIdentity>,
    /// Out-of-order protocol sequence that was healed, for logging.
    pub anomaly: Option<&'static str>,
}

impl Transition {
    fn to(next: CallState) -> Self {
        Self {
            next,
            identity: None,
            anomaly: None,
        }
    }

    fn with_identity(mut self, identity: CallerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    fn with_anomaly(mut self, anomaly: &'static str) -> Self {
        self.anomaly = Some(anomaly);
        self
    }
}

/// Advance the call state by one message.
///
/// Unknown commands, free-text messages and call-log replays leave the state
/// unchanged. Out-of-order sequences still land on the indicated state and
/// report an anomaly.
pub fn advance(current: CallState, msg: &Message) -> Transition {
    let Some(command) = msg.kind() else {
        return Transition::to(current);
    };

    match command {
        Command::Cid | Command::Pid => {
            Transition::to(CallState::IncomingRinging).with_identity(extract_identity(msg))
        }
        Command::Out => {
            Transition::to(CallState::OutgoingRinging).with_identity(extract_identity(msg))
        }
        Command::CidInfo => match RingStatus::from_field(msg.field(FieldName::Ring)) {
            RingStatus::Answered => Transition::to(CallState::InCall),
            RingStatus::RemoteHangup | RingStatus::LocalHangup => {
                Transition::to(CallState::OnHook)
            }
            RingStatus::Ringing(_) if current == CallState::IncomingRinging => {
                Transition::to(current)
            }
            RingStatus::Ringing(_) => {
                Transition::to(CallState::IncomingRinging).with_anomaly(ANOMALY_RING_WITHOUT_CALL)
            }
        },
        Command::End => {
            let t = Transition::to(CallState::OnHook).with_identity(extract_identity(msg));
            if current != CallState::OnHook {
                t.with_anomaly(ANOMALY_END_WITHOUT_TERMINATOR)
            } else {
                t
            }
        }
        Command::Hup => Transition::to(CallState::OnHook),
        _ => Transition::to(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidinfo(ring: &str) -> Message {
        Message::new("CIDINFO")
            .with_field(FieldName::Line, "4901")
            .with_field(FieldName::Ring, ring)
    }

    #[test]
    fn test_call_state_display() {
        assert_eq!(CallState::OnHook.to_string(), "on hook");
        assert_eq!(CallState::IncomingRinging.to_string(), "incoming ringing");
        assert_eq!(CallState::OutgoingRinging.to_string(), "outgoing ringing");
        assert_eq!(CallState::InCall.to_string(), "in call");
    }

    #[test]
    fn test_call_state_default_and_activity() {
        assert_eq!(CallState::default(), CallState::OnHook);
        assert!(!CallState::OnHook.is_active());
        assert!(CallState::InCall.is_active());
        assert_eq!(CallState::InCall.icon(), "mdi:phone-in-talk");
        assert_eq!(
            CallState::OutgoingRinging.ringing_direction(),
            Some(CallDirection::Outgoing)
        );
        assert_eq!(CallState::InCall.ringing_direction(), None);
    }

    #[test]
    fn test_call_direction_display_and_serde() {
        assert_eq!(CallDirection::Incoming.to_string(), "incoming");
        assert_eq!(CallDirection::Outgoing.to_string(), "outgoing");
        assert_eq!(
            serde_json::to_string(&CallState::IncomingRinging).unwrap(),
            "\"incoming_ringing\""
        );
        assert_eq!(
            serde_json::from_str::<CallDirection>("\"outgoing\"").unwrap(),
            CallDirection::Outgoing
        );
    }

    #[test]
    fn test_ring_status() {
        assert_eq!(RingStatus::from_field(Some("0")), RingStatus::Answered);
        assert_eq!(RingStatus::from_field(Some("-1")), RingStatus::RemoteHangup);
        assert_eq!(RingStatus::from_field(Some("-2")), RingStatus::LocalHangup);
        assert_eq!(RingStatus::from_field(Some("3")), RingStatus::Ringing(Some(3)));
        assert_eq!(RingStatus::from_field(Some("abc")), RingStatus::Ringing(None));
        assert_eq!(RingStatus::from_field(None), RingStatus::Ringing(None));
    }

    #[test]
    fn test_cid_starts_incoming_ring() {
        let msg = Message::new("CID").with_field(FieldName::Number, "5551234");
        let t = advance(CallState::OnHook, &msg);
        assert_eq!(t.next, CallState::IncomingRinging);
        assert_eq!(t.identity, Some(CallerIdentity::from_number("5551234")));
        assert_eq!(t.anomaly, None);
    }

    #[test]
    fn test_bare_cid_has_empty_identity() {
        let t = advance(CallState::OnHook, &Message::new("CID"));
        assert_eq!(t.next, CallState::IncomingRinging);
        assert_eq!(t.identity, Some(CallerIdentity::default()));
        assert_eq!(t.anomaly, None);
    }

    #[test]
    fn test_pid_starts_incoming_ring() {
        let t = advance(CallState::InCall, &Message::new("PID"));
        assert_eq!(t.next, CallState::IncomingRinging);
        assert!(t
            .identity
            .is_some());
    }

    #[test]
    fn test_out_starts_outgoing_ring() {
        let msg = Message::new("OUT")
            .with_field(FieldName::Number, "012345611")
            .with_field(FieldName::Name, "NO NAME");
        let t = advance(CallState::OnHook, &msg);
        assert_eq!(t.next, CallState::OutgoingRinging);
        assert_eq!(t.identity, Some(CallerIdentity::from_number("012345611")));
    }

    #[test]
    fn test_cidinfo_answer() {
        let t = advance(CallState::IncomingRinging, &cidinfo("0"));
        assert_eq!(t, Transition::to(CallState::InCall));
    }

    #[test]
    fn test_cidinfo_hangups() {
        assert_eq!(
            advance(CallState::InCall, &cidinfo("-2")),
            Transition::to(CallState::OnHook)
        );
        assert_eq!(
            advance(CallState::IncomingRinging, &cidinfo("-1")),
            Transition::to(CallState::OnHook)
        );
    }

    #[test]
    fn test_cidinfo_ring_without_call_self_heals() {
        let t = advance(CallState::OnHook, &cidinfo("3"));
        assert_eq!(t.next, CallState::IncomingRinging);
        assert_eq!(t.identity, None);
        assert_eq!(t.anomaly, Some(ANOMALY_RING_WITHOUT_CALL));
    }

    #[test]
    fn test_cidinfo_ring_while_ringing_is_noop() {
        let t = advance(CallState::IncomingRinging, &cidinfo("2"));
        assert_eq!(t, Transition::to(CallState::IncomingRinging));
    }

    #[test]
    fn test_cidinfo_unparseable_ring() {
        let t = advance(CallState::InCall, &cidinfo("x"));
        assert_eq!(t.next, CallState::IncomingRinging);
        assert!(t
            .anomaly
            .is_some());

        let t = advance(CallState::IncomingRinging, &Message::new("CIDINFO"));
        assert_eq!(t, Transition::to(CallState::IncomingRinging));
    }

    #[test]
    fn test_end_from_active_call() {
        let msg = Message::new("END")
            .with_field(FieldName::Number, "5551234")
            .with_field(FieldName::Name, "-");
        let t = advance(CallState::InCall, &msg);
        assert_eq!(t.next, CallState::OnHook);
        assert_eq!(t.identity, Some(CallerIdentity::from_number("5551234")));
        assert_eq!(t.anomaly, Some(ANOMALY_END_WITHOUT_TERMINATOR));
    }

    #[test]
    fn test_end_when_on_hook() {
        let t = advance(CallState::OnHook, &Message::new("END"));
        assert_eq!(t.next, CallState::OnHook);
        assert_eq!(t.identity, Some(CallerIdentity::default()));
        assert_eq!(t.anomaly, None);
    }

    #[test]
    fn test_hup_is_idempotent() {
        let hup = Message::new("HUP").with_field(FieldName::Number, "1");
        let first = advance(CallState::InCall, &hup);
        assert_eq!(first, Transition::to(CallState::OnHook));
        let second = advance(first.next, &hup);
        assert_eq!(second, Transition::to(CallState::OnHook));
    }

    #[test]
    fn test_noop_commands() {
        for cmd in ["MSG", "+MSG", "CIDLOG", "HUPLOG", "UNKNOWN"] {
            let t = advance(CallState::InCall, &Message::new(cmd));
            assert_eq!(t, Transition::to(CallState::InCall), "{cmd}");
        }
    }
}
