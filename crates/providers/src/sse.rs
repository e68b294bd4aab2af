//! Server-Sent Events line splitting.
//!
//! Network chunks can end anywhere, including inside a multi-byte UTF-8
//! sequence, so lines are cut on raw bytes and only decoded once complete.

/// Accumulates response bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and drain every complete line from the buffer.
    ///
    /// Lines come back without their `\n` / `\r\n` terminator.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let mut line = &self.buf[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }
}

/// The payload of a `data:` line, if this is one.
///
/// Comments (`:`), `event:` and `id:` lines yield `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}
