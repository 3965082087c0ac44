//! Byte buffers behind the interactive stream

use std::collections::VecDeque;

/// A delivered line without its trailing `\n` or `\r\n`, if it has one
pub fn line_body(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n")
        .map(|rest| rest.strip_suffix(b"\r").unwrap_or(rest))
        .unwrap_or(line)
}

/// FIFO of bytes not yet consumed by the interpreter.
///
/// Refilled only by [`InputBuffer::load_line`] or [`InputBuffer::load_raw`],
/// drained one byte at a time by [`InputBuffer::pop`].
#[derive(Debug, Default, Clone)]
pub struct InputBuffer {
    pending: VecDeque<u8>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.pending.pop_front()
    }

    /// Queue one delivered line followed by a single `\n` terminator.
    ///
    /// A line that already ends in `\n` or `\r\n` keeps exactly one `\n`.
    pub fn load_line(&mut self, line: &[u8]) {
        self.pending.extend(line_body(line).iter().copied());
        self.pending.push_back(b'\n');
    }

    /// Queue bytes verbatim
    pub fn load_raw(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Append-only record of everything written for display
#[derive(Debug, Default, Clone)]
pub struct OutputAccumulator {
    bytes: Vec<u8>,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Display text; invalid UTF-8 is replaced rather than rejected
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
