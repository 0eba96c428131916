//! Newline-delimited framing for the inbound byte stream.
//!
//! A single socket read may carry part of a command, several commands, or
//! the tail of one and the head of the next. [`LineFramer`] buffers bytes
//! until a `\n` arrives and only then decodes the line as UTF-8, so
//! multi-byte characters split across reads survive intact.

use crate::error::FramingError;

#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_line_length: usize,
}

impl LineFramer {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_length,
        }
    }

    /// Feeds newly read bytes and returns every line they complete.
    ///
    /// A trailing `\r` is stripped and blank lines are skipped. Exceeding the
    /// line limit discards the buffered bytes and returns an error.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, FramingError> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
            self.append(&rest[..newline])?;
            if let Some(line) = self.take_line() {
                lines.push(line);
            }
            rest = &rest[newline + 1..];
        }

        self.append(rest)?;
        Ok(lines)
    }

    /// Flushes an unterminated final line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.take_line()
    }

    /// Bytes buffered for the line currently being assembled.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), FramingError> {
        if self.pending.len() + bytes.len() > self.max_line_length {
            self.pending.clear();
            return Err(FramingError::LineTooLong {
                limit: self.max_line_length,
            });
        }
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    fn take_line(&mut self) -> Option<String> {
        let mut raw = std::mem::take(&mut self.pending);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        let line = String::from_utf8_lossy(&raw).into_owned();
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_read_yields_every_line() {
        let mut framer = LineFramer::new(64);
        let lines = framer.push(b"ready\nstatus\nchat hi there\n").unwrap();
        assert_eq!(lines, vec!["ready", "status", "chat hi there"]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn split_read_is_reassembled() {
        let mut framer = LineFramer::new(64);
        assert!(framer.push(b"cha").unwrap().is_empty());
        assert!(framer.push(b"t hel").unwrap().is_empty());
        assert_eq!(framer.push(b"lo\nrea").unwrap(), vec!["chat hello"]);
        assert_eq!(framer.push(b"dy\n").unwrap(), vec!["ready"]);
    }

    #[test]
    fn crlf_and_blank_lines() {
        let mut framer = LineFramer::new(64);
        let lines = framer.push(b"status\r\n\r\n   \nunready\r\n").unwrap();
        assert_eq!(lines, vec!["status", "unready"]);
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let mut framer = LineFramer::new(64);
        let text = "chat héllo\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(framer.push(&text[..split]).unwrap().is_empty());
        assert_eq!(framer.push(&text[split..]).unwrap(), vec!["chat héllo"]);
    }

    #[test]
    fn unterminated_tail_is_flushed_on_finish() {
        let mut framer = LineFramer::new(64);
        assert_eq!(framer.push(b"ready\nchat bye").unwrap(), vec!["ready"]);
        assert_eq!(framer.finish().as_deref(), Some("chat bye"));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn overlong_line_is_rejected() {
        let mut framer = LineFramer::new(8);
        assert_eq!(
            framer.push(b"chat this is too long"),
            Err(FramingError::LineTooLong { limit: 8 })
        );
        assert_eq!(framer.buffered(), 0);

        let mut framer = LineFramer::new(8);
        assert!(framer.push(b"chat ").unwrap().is_empty());
        assert!(framer.push(b"more\n").is_err());
    }

    #[test]
    fn line_at_limit_is_accepted() {
        let mut framer = LineFramer::new(5);
        assert_eq!(framer.push(b"ready\n").unwrap(), vec!["ready"]);
    }
}
