//! Queue of complete messages handed out without crossing boundaries.

use std::collections::VecDeque;

/// FIFO of whole messages with a cursor into the front one.
///
/// `read` and `discard` never touch more than one message, so a caller with a
/// short buffer drains a message over several calls and never receives the
/// tail of one message glued to the head of the next.
#[derive(Debug, Default, Clone)]
pub struct MessageQueue {
    messages: VecDeque<Vec<u8>>,
    cursor: usize,
}

impl MessageQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a complete message.  Empty messages are ignored.
    pub fn push(&mut self, message: Vec<u8>) {
        if !message.is_empty() {
            self.messages.push_back(message);
        }
    }

    /// Number of messages not yet fully consumed.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Unconsumed bytes of the front message.
    pub fn front_remaining(&self) -> usize {
        self.messages
            .front()
            .map_or(0, |front| front.len() - self.cursor)
    }

    /// Copies up to `out.len()` bytes of the front message into `out`.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.front_remaining());
        if let Some(front) = self.messages.front() {
            out[..n].copy_from_slice(&front[self.cursor..self.cursor + n]);
        }
        self.advance(n);
        n
    }

    /// Drops up to `n` bytes of the front message.
    pub fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.front_remaining());
        self.advance(n);
        n
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.cursor = 0;
    }

    fn advance(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.cursor += n;
        if self.front_remaining() == 0 {
            self.messages.pop_front();
            self.cursor = 0;
        }
    }
}
