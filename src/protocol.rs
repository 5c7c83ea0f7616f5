//! NCID protocol line parsing
//!
//! The gateway sends two shapes of line:
//!
//! - status lines: three ASCII digits, a space, free text (`200 NCID Server`)
//! - keyed lines: `COMMAND: *KEY1*VALUE1*KEY2*VALUE2*`, where `MSG`/`+MSG`
//!   carry free text terminated by `**` ahead of the keyed section
//!
//! Status lines are recognised with [`parse_status`] before a line is handed
//! to [`parse`]. Both functions are pure.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::constants::{COMMAND_SEPARATOR, FIELD_SEPARATOR, FREE_TEXT_TERMINATOR};

/// Error returned when parsing an unrecognized command token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(pub String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command: {}", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

define_wire_enum! {
    error_type: ParseCommandError,
    /// Command tokens the gateway puts in front of the first `:`.
    ///
    /// The `*LOG` variants are call-log replays the server sends right after
    /// a client connects; they describe past calls and never move the call
    /// state.
    pub enum Command {
        /// Incoming call with caller ID
        Cid => "CID",
        /// Incoming call reported by a smartphone client
        Pid => "PID",
        /// Outgoing call with callee ID
        Out => "OUT",
        /// Per-ring status, `RING` carries count or hangup reason
        CidInfo => "CIDINFO",
        /// Call completed
        End => "END",
        /// Call terminated by the gateway
        Hup => "HUP",
        Msg => "MSG",
        PlusMsg => "+MSG",
        CidLog => "CIDLOG",
        PidLog => "PIDLOG",
        OutLog => "OUTLOG",
        EndLog => "ENDLOG",
        HupLog => "HUPLOG",
        MsgLog => "MSGLOG",
    }
}

impl Command {
    /// Whether lines with this command carry a `**`-terminated free-text prefix.
    pub fn has_free_text(&self) -> bool {
        matches!(self, Command::Msg | Command::PlusMsg)
    }
}

/// Errors from [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Line has no `:` separating command and payload
    #[error("not a keyed line: {line:?}")]
    NotKeyValue { line: String },
    /// `MSG`/`+MSG` line without the `**` free-text terminator
    #[error("malformed message line, missing '**' terminator: {line:?}")]
    MalformedMessage { line: String },
}

/// One parsed keyed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    command: String,
    fields: HashMap<String, String>,
    free_text: Option<String>,
}

impl Message {
    /// Create a message with no fields.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            fields: HashMap::new(),
            free_text: None,
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_field(key, value);
        self
    }

    /// Insert or replace a field.
    pub fn set_field(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.fields
            .insert(
                key.as_ref()
                    .to_string(),
                value.into(),
            );
    }

    /// Raw command token as received.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Typed command, `None` for tokens this crate does not know.
    pub fn kind(&self) -> Option<Command> {
        self.command
            .parse()
            .ok()
    }

    /// Look up a field by [`FieldName`](crate::FieldName) or raw key.
    pub fn field(&self, key: impl AsRef<str>) -> Option<&str> {
        self.fields
            .get(key.as_ref())
            .map(|s| s.as_str())
    }

    /// All fields.
    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }

    /// Free text of `MSG`/`+MSG` lines.
    pub fn free_text(&self) -> Option<&str> {
        self.free_text
            .as_deref()
    }
}

/// Advisory status line (`200 NCID Server: ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Three-digit code
    pub code: u16,
    /// Text after the code
    pub text: String,
}

/// Recognise a status line. Never fails; non-status lines return `None`.
pub fn parse_status(line: &str) -> Option<StatusLine> {
    let bytes = line.as_bytes();
    if bytes.len() < 4
        || !bytes[..3]
            .iter()
            .all(u8::is_ascii_digit)
        || bytes[3] != b' '
    {
        return None;
    }

    let code = line[..3]
        .parse()
        .ok()?;
    Some(StatusLine {
        code,
        text: line[4..]
            .trim_end()
            .to_string(),
    })
}

/// Parse a keyed line into a [`Message`].
///
/// Tokens of the keyed section pair up as key, value; an odd trailing token
/// is dropped. A repeated key keeps its last value.
pub fn parse(line: &str) -> Result<Message, ParseError> {
    let (command, rest) = line
        .split_once(COMMAND_SEPARATOR)
        .ok_or_else(|| ParseError::NotKeyValue {
            line: line.to_string(),
        })?;
    let command = command.trim();

    let has_free_text = command
        .parse::<Command>()
        .map(|c| c.has_free_text())
        .unwrap_or(false);

    let (free_text, keyed) = if has_free_text {
        let (text, keyed) = split_free_text(rest).ok_or_else(|| ParseError::MalformedMessage {
            line: line.to_string(),
        })?;
        (Some(text), keyed)
    } else {
        (None, rest)
    };

    let tokens: Vec<&str> = keyed
        .trim()
        .trim_matches(FIELD_SEPARATOR)
        .split(FIELD_SEPARATOR)
        .collect();

    let fields = tokens
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect();

    Ok(Message {
        command: command.to_string(),
        fields,
        free_text,
    })
}

/// Split `<delim><text>**<keyed>` into the trimmed text and the keyed section.
fn split_free_text(rest: &str) -> Option<(String, &str)> {
    let mut chars = rest.chars();
    chars.next()?;
    let body = chars.as_str();
    let end = body.find(FREE_TEXT_TERMINATOR)?;
    let text = body[..end]
        .trim()
        .to_string();
    Some((text, &body[end + FREE_TEXT_TERMINATOR.len()..]))
}
