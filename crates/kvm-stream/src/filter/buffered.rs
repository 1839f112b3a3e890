//! Read/write buffering filter.
//!
//! `write` appends to a send buffer and returns at once.  The buffer is pushed
//! to the inner stream on the next readiness notification, on `flush`, or
//! once it reaches the high-water mark.  At the mark `write` flushes the inner
//! stream, blocking until the bytes are on the wire, so a peer that stops
//! reading cannot make the chain hold more than one mark's worth of output.  On the read side, readiness notifications fill a
//! receive buffer from the inner stream so that `read` is usually served from
//! memory.

use tracing::trace;

use crate::config::StreamConfig;
use crate::event::{Event, EventKind, EventTarget, SharedEventQueue};
use crate::stream::{Readiness, Stream, StreamBuffer, StreamState};

/// Buffering filter over `S`.
pub struct BufferedStream<S> {
    inner: S,
    target: EventTarget,
    events: SharedEventQueue,
    state: StreamState,
    input: StreamBuffer,
    output: StreamBuffer,
    high_water_mark: usize,
    scratch: Vec<u8>,
}

impl<S: Stream> BufferedStream<S> {
    /// Wraps `inner`; the high-water mark and pull size come from `config`.
    pub fn new(inner: S, events: SharedEventQueue, config: &StreamConfig) -> Self {
        let target = inner.event_target();
        Self {
            inner,
            target,
            events,
            state: StreamState::Open,
            input: StreamBuffer::new(),
            output: StreamBuffer::new(),
            high_water_mark: config.high_water_mark.max(1),
            scratch: vec![0u8; config.read_chunk_size.max(1)],
        }
    }

    /// Bytes accepted by `write` that have not been passed to the inner stream.
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    /// The wrapped stream.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The wrapped stream, mutably.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    fn drain_output(&mut self) {
        if self.output.is_empty() {
            return;
        }
        let pending = self.output.take_all();
        trace!(target = %self.target, bytes = pending.len(), "draining send buffer");
        self.inner.write(&pending);
    }

    fn pull_once(&mut self) -> usize {
        let n = self.inner.read(&mut self.scratch);
        self.input.write(&self.scratch[..n]);
        n
    }
}

impl<S: Stream> Stream for BufferedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.state().can_read() {
            return 0;
        }
        if self.input.is_empty() {
            self.pull_once();
        }
        self.input.read(buf)
    }

    fn skip(&mut self, n: usize) -> usize {
        if !self.state().can_read() {
            return 0;
        }
        let from_buffer = self.input.discard(n);
        from_buffer + self.inner.skip(n - from_buffer)
    }

    fn write(&mut self, buf: &[u8]) {
        if !self.state().can_write() {
            self.events.add_event(Event::with_error(
                EventKind::OutputError,
                self.target,
                self.state().write_refusal(),
            ));
            return;
        }
        if buf.is_empty() {
            return;
        }
        self.output.write(buf);
        if self.output.len() >= self.high_water_mark {
            trace!(target = %self.target, buffered = self.output.len(), "high-water mark reached");
            self.drain_output();
            self.inner.flush();
        }
    }

    fn flush(&mut self) {
        if !self.state().can_write() {
            return;
        }
        self.drain_output();
        self.inner.flush();
    }

    fn shutdown_input(&mut self) {
        if !self.state().can_read() {
            return;
        }
        self.input.clear();
        self.inner.shutdown_input();
        self.state = self.state.after_input_shutdown();
    }

    fn shutdown_output(&mut self) {
        if !self.state().can_write() {
            return;
        }
        self.output.clear();
        self.inner.shutdown_output();
        self.state = self.state.after_output_shutdown();
    }

    fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.input.clear();
        self.output.clear();
        self.inner.close();
        self.state = StreamState::Closed;
    }

    fn handle_readiness(&mut self, readiness: Readiness) {
        self.inner.handle_readiness(readiness);
        if self.state().can_read() {
            while self.inner.is_ready() {
                if self.pull_once() == 0 {
                    break;
                }
            }
        }
        if self.state().can_write() {
            self.drain_output();
        }
    }

    fn is_ready(&self) -> bool {
        self.state().can_read() && (!self.input.is_empty() || self.inner.is_ready())
    }

    fn size(&self) -> usize {
        if self.state().can_read() {
            self.input.len() + self.inner.size()
        } else {
            0
        }
    }

    fn event_target(&self) -> EventTarget {
        self.target
    }

    fn source(&self) -> String {
        self.inner.source()
    }

    /// A closed inner stream closes this layer too.
    fn state(&self) -> StreamState {
        if self.inner.state().is_closed() {
            StreamState::Closed
        } else {
            self.state
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
