//! Typed field names for NCID keyed lines.

/// Error returned when parsing an unrecognized field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFieldNameError(pub String);

impl std::fmt::Display for ParseFieldNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown field name: {}", self.0)
    }
}

impl std::error::Error for ParseFieldNameError {}

define_wire_enum! {
    error_type: ParseFieldNameError,
    /// Field keys that appear in the `*KEY*VALUE*` section of NCID lines.
    ///
    /// Use with [`Message::field()`](crate::Message::field) for type-safe
    /// lookups. Gateways may send keys not listed here; those stay reachable
    /// through the raw string form.
    pub enum FieldName {
        Date => "DATE",
        Time => "TIME",
        Line => "LINE",
        Number => "NMBR",
        Name => "NAME",
        Message => "MESG",
        Ring => "RING",
        Count => "CNT",
        HangupType => "HTYPE",
        CallType => "CTYPE",
        ScallDate => "SCALL",
        EcallDate => "ECALL",
        MessageType => "MTYPE",
        Nmbr2 => "NMBR2",
        Name2 => "NAME2",
        Type => "TYPE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_wire_tokens() {
        assert_eq!(FieldName::Number.to_string(), "NMBR");
        assert_eq!(FieldName::Name.to_string(), "NAME");
        assert_eq!(FieldName::Ring.to_string(), "RING");
        assert_eq!(FieldName::HangupType.to_string(), "HTYPE");
    }

    #[test]
    fn as_ref_str() {
        let k: &str = FieldName::Number.as_ref();
        assert_eq!(k, "NMBR");
    }

    #[test]
    fn from_str_is_case_sensitive() {
        assert_eq!("NMBR".parse::<FieldName>(), Ok(FieldName::Number));
        assert!("nmbr"
            .parse::<FieldName>()
            .is_err());
    }

    #[test]
    fn from_str_unknown() {
        let err = "X-VENDOR".parse::<FieldName>();
        assert_eq!(
            err.unwrap_err()
                .to_string(),
            "unknown field name: X-VENDOR"
        );
    }
}
