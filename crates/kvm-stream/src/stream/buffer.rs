//! Byte FIFO owned by a single stream layer.

use std::collections::VecDeque;

/// An ordered byte queue with an implicit read cursor (the front) and write
/// cursor (the back).
///
/// Bytes leave in exactly the order they entered; once read or discarded they
/// are gone.
#[derive(Debug, Default, Clone)]
pub struct StreamBuffer {
    data: VecDeque<u8>,
}

impl StreamBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drops every buffered byte.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends `bytes` at the back.
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend(bytes);
    }

    /// Moves up to `out.len()` bytes from the front into `out`.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.data.len());
        for (dst, src) in out.iter_mut().zip(self.data.drain(..n)) {
            *dst = src;
        }
        n
    }

    /// Drops up to `n` bytes from the front, returning how many were dropped.
    pub fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.data.len());
        self.data.drain(..n);
        n
    }

    /// Removes exactly `n` bytes from the front, or nothing if fewer are
    /// buffered.
    pub fn take(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.data.len() < n {
            return None;
        }
        Some(self.data.drain(..n).collect())
    }

    /// Copies the first `out.len()` bytes into `out` without consuming them.
    /// Returns `false` if not enough bytes are buffered.
    pub fn peek(&self, out: &mut [u8]) -> bool {
        if self.data.len() < out.len() {
            return false;
        }
        for (dst, src) in out.iter_mut().zip(self.data.iter()) {
            *dst = *src;
        }
        true
    }

    /// Returns the longest contiguous run of bytes at the front.
    ///
    /// Useful for handing data to a native write without copying; call
    /// [`StreamBuffer::discard`] with the number of bytes actually written.
    pub fn front_chunk(&self) -> &[u8] {
        let (front, back) = self.data.as_slices();
        if front.is_empty() {
            back
        } else {
            front
        }
    }

    /// Removes and returns every buffered byte.
    pub fn take_all(&mut self) -> Vec<u8> {
        self.data.drain(..).collect()
    }
}
