//! In-memory pipe implementing [`NativeHandle`].
//!
//! A [`MemoryPipe`] connects two [`MemoryHandle`]s back to back: bytes written
//! on one end become readable on the other.  Because everything runs on one
//! thread, the pipe is built on `Rc<RefCell<..>>` rather than locks.
//!
//! A [`PipeMonitor`] obtained before the handle is moved into a
//! [`crate::TransportStream`] lets a test:
//!
//! - inspect every byte an end has ever written (the "wire transcript"),
//! - fragment delivery (e.g. one byte per native read),
//! - bound write capacity to provoke partial writes and queueing,
//! - inject read or write failures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::Shutdown;
use std::rc::Rc;

use super::NativeHandle;

#[derive(Debug, Default)]
struct Direction {
    bytes: VecDeque<u8>,
    transcript: Vec<u8>,
    writer_closed: bool,
    reader_closed: bool,
    capacity: Option<usize>,
    max_read_chunk: Option<usize>,
    fail_next_write: Option<io::ErrorKind>,
    fail_next_read: Option<io::ErrorKind>,
    write_calls: usize,
}

#[derive(Debug, Default)]
struct Pipe {
    a_to_b: Direction,
    b_to_a: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    A,
    B,
}

impl Pipe {
    fn outbound(&mut self, end: End) -> &mut Direction {
        match end {
            End::A => &mut self.a_to_b,
            End::B => &mut self.b_to_a,
        }
    }

    fn inbound(&mut self, end: End) -> &mut Direction {
        match end {
            End::A => &mut self.b_to_a,
            End::B => &mut self.a_to_b,
        }
    }
}

/// Factory for connected in-memory handle pairs.
pub struct MemoryPipe;

impl MemoryPipe {
    /// Creates two connected ends named `"memory:a"` and `"memory:b"`.
    pub fn pair() -> (MemoryHandle, MemoryHandle) {
        Self::pair_named("memory:a", "memory:b")
    }

    /// Creates two connected ends.  Each end's `peer_name` reports the name of
    /// the *other* end.
    pub fn pair_named(a: &str, b: &str) -> (MemoryHandle, MemoryHandle) {
        let pipe = Rc::new(RefCell::new(Pipe::default()));
        (
            MemoryHandle {
                pipe: Rc::clone(&pipe),
                end: End::A,
                peer: b.to_string(),
            },
            MemoryHandle {
                pipe,
                end: End::B,
                peer: a.to_string(),
            },
        )
    }
}

/// One end of a [`MemoryPipe`].
#[derive(Debug)]
pub struct MemoryHandle {
    pipe: Rc<RefCell<Pipe>>,
    end: End,
    peer: String,
}

impl MemoryHandle {
    /// Returns a monitor for this end that stays valid after the handle is
    /// moved into a stream.
    pub fn monitor(&self) -> PipeMonitor {
        PipeMonitor {
            pipe: Rc::clone(&self.pipe),
            end: self.end,
        }
    }
}

impl NativeHandle for MemoryHandle {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.pipe.borrow_mut();
        let inbound = pipe.inbound(self.end);
        if let Some(kind) = inbound.fail_next_read.take() {
            return Err(kind.into());
        }
        if inbound.reader_closed {
            return Ok(0);
        }
        if inbound.bytes.is_empty() {
            return if inbound.writer_closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let limit = inbound.max_read_chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(limit).min(inbound.bytes.len());
        for (dst, src) in buf.iter_mut().zip(inbound.bytes.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = self.pipe.borrow_mut();
        let outbound = pipe.outbound(self.end);
        outbound.write_calls += 1;
        if let Some(kind) = outbound.fail_next_write.take() {
            return Err(kind.into());
        }
        if outbound.writer_closed || outbound.reader_closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let free = match outbound.capacity {
            Some(cap) => cap.saturating_sub(outbound.bytes.len()),
            None => buf.len(),
        };
        if free == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(free);
        outbound.bytes.extend(&buf[..n]);
        outbound.transcript.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    /// Writes everything regardless of the configured capacity: on a single
    /// thread nobody could drain the pipe while we wait.
    fn write_blocking(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut pipe = self.pipe.borrow_mut();
        let outbound = pipe.outbound(self.end);
        outbound.write_calls += 1;
        if let Some(kind) = outbound.fail_next_write.take() {
            return Err(kind.into());
        }
        if outbound.writer_closed || outbound.reader_closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        outbound.bytes.extend(buf);
        outbound.transcript.extend_from_slice(buf);
        Ok(())
    }

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        let mut pipe = self.pipe.borrow_mut();
        if matches!(how, Shutdown::Read | Shutdown::Both) {
            let inbound = pipe.inbound(self.end);
            inbound.reader_closed = true;
            inbound.bytes.clear();
        }
        if matches!(how, Shutdown::Write | Shutdown::Both) {
            pipe.outbound(self.end).writer_closed = true;
        }
        Ok(())
    }

    fn peer_name(&self) -> String {
        self.peer.clone()
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        let mut pipe = self.pipe.borrow_mut();
        pipe.outbound(self.end).writer_closed = true;
        pipe.inbound(self.end).reader_closed = true;
    }
}

/// Test-side view of one pipe end.
#[derive(Debug, Clone)]
pub struct PipeMonitor {
    pipe: Rc<RefCell<Pipe>>,
    end: End,
}

impl PipeMonitor {
    /// Every byte this end has written, in order.
    pub fn transcript(&self) -> Vec<u8> {
        self.pipe.borrow_mut().outbound(self.end).transcript.clone()
    }

    /// Number of native write attempts made by this end.
    pub fn write_calls(&self) -> usize {
        self.pipe.borrow_mut().outbound(self.end).write_calls
    }

    /// Bytes waiting to be read by this end.
    pub fn pending_inbound(&self) -> usize {
        self.pipe.borrow_mut().inbound(self.end).bytes.len()
    }

    /// Limits each native read on this end to `chunk` bytes.
    pub fn set_max_read_chunk(&self, chunk: Option<usize>) {
        self.pipe.borrow_mut().inbound(self.end).max_read_chunk = chunk;
    }

    /// Limits how many unread bytes this end may have in flight.
    pub fn set_write_capacity(&self, capacity: Option<usize>) {
        self.pipe.borrow_mut().outbound(self.end).capacity = capacity;
    }

    /// Makes this end's next native write fail with `kind`.
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.pipe.borrow_mut().outbound(self.end).fail_next_write = Some(kind);
    }

    /// Makes this end's next native read fail with `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.pipe.borrow_mut().inbound(self.end).fail_next_read = Some(kind);
    }
}
