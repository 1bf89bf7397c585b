//! Line framing for the event stream
//!
//! The response body arrives in arbitrary chunks. A frame is only emitted once
//! the newline that terminates its line has been received; everything after
//! the last newline stays buffered until more bytes arrive or the stream ends.

/// Field prefix that marks a payload line
pub const DATA_PREFIX: &str = "data: ";

/// One `data:` payload from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: String,
}

impl Frame {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// Extract every complete frame from `pending`.
///
/// Returns the frames plus the number of bytes consumed; bytes past that
/// offset belong to an unterminated line. Lines are split on raw bytes, so a
/// UTF-8 sequence cut by a chunk boundary is only decoded once it is whole.
pub fn split_frames(pending: &[u8]) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut consumed = 0;

    while let Some(offset) = pending[consumed..].iter().position(|&b| b == b'\n') {
        let end = consumed + offset;
        if let Some(frame) = parse_line(&pending[consumed..end]) {
            frames.push(frame);
        }
        consumed = end + 1;
    }

    (frames, consumed)
}

/// Parse a single line (without its newline) into a frame.
///
/// Non-data lines (`event:`, `id:`, `: keepalive` comments) and blank
/// payloads produce nothing.
fn parse_line(line: &[u8]) -> Option<Frame> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    let data = text.strip_prefix(DATA_PREFIX)?;
    if data.trim().is_empty() {
        return None;
    }
    Some(Frame::new(data))
}

/// Accumulates chunks and hands out complete frames
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline
    scanned: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the frames it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);
        if !self.pending[self.scanned..].contains(&b'\n') {
            self.scanned = self.pending.len();
            return Vec::new();
        }
        let (frames, consumed) = split_frames(&self.pending);
        self.pending.drain(..consumed);
        self.scanned = self.pending.len();
        frames
    }

    /// Bytes of the trailing, not yet terminated line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush the trailing line at end of stream.
    ///
    /// Servers are not required to terminate the last line, so a final
    /// `data:` line without a newline still counts.
    pub fn finish(&mut self) -> Option<Frame> {
        let rest = std::mem::take(&mut self.pending);
        self.scanned = 0;
        parse_line(&rest)
    }
}
