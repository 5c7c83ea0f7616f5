//! Byte buffer that frames the TCP stream into protocol lines

use crate::constants::{LINE_TERMINATOR, MAX_LINE_LENGTH};
use crate::error::{NcidError, NcidResult};

/// Accumulates socket reads and yields complete lines.
///
/// Lines are decoded as UTF-8 (lossy, gateways occasionally send Latin-1
/// caller names) with any trailing `\r` removed.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    data: Vec<u8>,
    /// Bytes before this offset have already been scanned for a terminator
    scanned: usize,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data
            .extend_from_slice(bytes);
    }

    /// Fail when the pending partial line is larger than the framing limit.
    pub(crate) fn check_size_limits(&self) -> NcidResult<()> {
        if self
            .data
            .len()
            > MAX_LINE_LENGTH
            && !self.data[..MAX_LINE_LENGTH].contains(&LINE_TERMINATOR)
        {
            return Err(NcidError::LineTooLong {
                len: self
                    .data
                    .len(),
                limit: MAX_LINE_LENGTH,
            });
        }
        Ok(())
    }

    /// Take the next complete line out of the buffer, if any.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let offset = self.data[self.scanned..]
            .iter()
            .position(|b| *b == LINE_TERMINATOR);

        let Some(offset) = offset else {
            self.scanned = self
                .data
                .len();
            return None;
        };

        let end = self.scanned + offset;
        let mut line: Vec<u8> = self
            .data
            .drain(..=end)
            .collect();
        self.scanned = 0;

        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(
            String::from_utf8_lossy(&line)
                .into_owned(),
        )
    }

    /// Drop any partial line, used when a connection is replaced.
    pub(crate) fn clear(&mut self) {
        self.data
            .clear();
        self.scanned = 0;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.data
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let mut buf = LineBuffer::new();
        buf.extend_from_slice(b"CID: *NMBR*1*\n");
        assert_eq!(buf.next_line(), Some("CID: *NMBR*1*".to_string()));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_crlf_stripped() {
        let mut buf = LineBuffer::new();
        buf.extend_from_slice(b"200 Server\r\n");
        assert_eq!(buf.next_line(), Some("200 Server".to_string()));
    }

    #[test]
    fn test_partial_then_complete() {
        let mut buf = LineBuffer::new();
        buf.extend_from_slice(b"CIDINFO: *RI");
        assert_eq!(buf.next_line(), None);
        buf.extend_from_slice(b"NG*0*\nHUP:");
        assert_eq!(buf.next_line(), Some("CIDINFO: *RING*0*".to_string()));
        assert_eq!(buf.next_line(), None);
        buf.extend_from_slice(b" *LINE*1*\n");
        assert_eq!(buf.next_line(), Some("HUP: *LINE*1*".to_string()));
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut buf = LineBuffer::new();
        buf.extend_from_slice(b"a: *\nb: *\n\nc: *\n");
        assert_eq!(buf.next_line(), Some("a: *".to_string()));
        assert_eq!(buf.next_line(), Some("b: *".to_string()));
        assert_eq!(buf.next_line(), Some(String::new()));
        assert_eq!(buf.next_line(), Some("c: *".to_string()));
        assert_eq!(buf.next_line(), None);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut buf = LineBuffer::new();
        buf.extend_from_slice(b"CID: *NAME*JOS\xc9*\n");
        let line = buf
            .next_line()
            .unwrap();
        assert!(line.starts_with("CID: *NAME*JOS"));
    }

    #[test]
    fn test_size_limit() {
        let mut buf = LineBuffer::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_LENGTH + 1]);
        assert!(matches!(
            buf.check_size_limits(),
            Err(NcidError::LineTooLong { .. })
        ));

        buf.clear();
        buf.extend_from_slice(b"short\n");
        assert!(buf
            .check_size_limits()
            .is_ok());
    }
}
