//! Byte-level HTTP/1 message framing shared by the raw TCP service and the
//! WebSocket tunnel.

use thiserror::Error;

/// Upper bound on a buffered message, headers included.
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Message exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Offset just past the blank line that ends the header block.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// Header lines after the start line, as `(lowercased name, trimmed value)`.
pub fn header_lines(head: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(head)
        .split("\r\n")
        .skip(1)
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// The declared body length. A missing or non-numeric value yields `None`.
pub fn content_length(head: &[u8]) -> Option<usize> {
    header_lines(head)
        .into_iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse().ok())
}

/// Status code from an HTTP/1 status line such as `HTTP/1.1 101 Switching Protocols`.
pub fn status_code(head: &[u8]) -> Option<u16> {
    let line_end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(head.len());
    let line = std::str::from_utf8(&head[..line_end]).ok()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Accumulates bytes until one `Content-Length` delimited message is complete.
///
/// A message without a usable `Content-Length` never completes; it is only
/// ended by the size limit.
#[derive(Debug)]
pub struct MessageFrame {
    buf: Vec<u8>,
    limit: usize,
}

impl Default for MessageFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFrame {
    pub fn new() -> Self {
        Self::with_limit(MAX_MESSAGE_BYTES)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends a chunk. Returns the body, exactly `Content-Length` bytes, once complete.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.limit {
            return Err(FrameError::TooLarge { limit: self.limit });
        }

        let Some(header_end) = find_header_end(&self.buf) else {
            return Ok(None);
        };
        let Some(length) = content_length(&self.buf[..header_end]) else {
            return Ok(None);
        };
        if self.buf.len() - header_end < length {
            return Ok(None);
        }
        Ok(Some(self.buf[header_end..header_end + length].to_vec()))
    }
}
