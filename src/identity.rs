//! Caller identity extracted from NCID messages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{NAME_PLACEHOLDERS, NUMBER_PLACEHOLDERS};
use crate::fields::FieldName;
use crate::protocol::Message;

/// Name and number of the party on the current or most recent call.
///
/// Gateway placeholders (`-`, `NO NAME`, `NO NMBR`, `NO-NUMBER`) never appear
/// here; they are normalized to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub name: Option<String>,
    pub number: Option<String>,
}

impl CallerIdentity {
    /// Identity with both parts set.
    pub fn new(name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            number: Some(number.into()),
        }
    }

    /// Identity with only a number.
    pub fn from_number(number: impl Into<String>) -> Self {
        Self {
            name: None,
            number: Some(number.into()),
        }
    }

    /// `true` when neither name nor number is known.
    pub fn is_empty(&self) -> bool {
        self.name
            .is_none()
            && self
                .number
                .is_none()
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.number) {
            (Some(name), Some(number)) => write!(f, "{} ({})", name, number),
            (Some(name), None) => f.write_str(name),
            (None, Some(number)) => f.write_str(number),
            (None, None) => f.write_str("unknown"),
        }
    }
}

fn normalize(value: Option<&str>, placeholders: &[&str]) -> Option<String> {
    value
        .filter(|v| !placeholders.contains(v))
        .map(str::to_string)
}

/// Read `NAME`/`NMBR` from a message. Missing keys resolve to `None`.
pub fn extract_identity(msg: &Message) -> CallerIdentity {
    CallerIdentity {
        name: normalize(msg.field(FieldName::Name), NAME_PLACEHOLDERS),
        number: normalize(msg.field(FieldName::Number), NUMBER_PLACEHOLDERS),
    }
}
