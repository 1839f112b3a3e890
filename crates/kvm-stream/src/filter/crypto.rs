//! Transparent encrypt-on-write / decrypt-on-read filter.
//!
//! Each `write` is sealed into one record (see [`crate::cipher`]) and handed to
//! the inner stream as a single write.  On the read side every complete inner
//! message is opened as one record, so the inner stream must preserve message
//! boundaries: in practice a [`crate::FramingFilter`].  Both peers must stack
//! the filters in the same order and hold ciphers of opposite
//! [`crate::Role`]s; nothing is negotiated.
//!
//! A record that fails to open is fatal for the connection: the filter
//! publishes [`EventKind::InputFormatError`] and shuts down both directions.

use tracing::{trace, warn};

use crate::cipher::Cipher;
use crate::error::{ProtocolViolation, StreamError};
use crate::event::{Event, EventKind, EventTarget, SharedEventQueue};
use crate::stream::{MessageQueue, Readiness, Stream, StreamState};

/// Encryption filter over a message-preserving stream `S`.
pub struct CryptoFilter<S> {
    inner: S,
    target: EventTarget,
    events: SharedEventQueue,
    state: StreamState,
    cipher: Cipher,
    plaintext: MessageQueue,
}

impl<S: Stream> CryptoFilter<S> {
    /// Wraps `inner`, sealing and opening records with `cipher`.
    pub fn new(inner: S, events: SharedEventQueue, cipher: Cipher) -> Self {
        let target = inner.event_target();
        Self {
            inner,
            target,
            events,
            state: StreamState::Open,
            cipher,
            plaintext: MessageQueue::new(),
        }
    }

    /// Number of decrypted records not yet fully read.
    pub fn pending_records(&self) -> usize {
        self.plaintext.len()
    }

    /// The wrapped stream.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The wrapped stream, mutably.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Opens every complete record the inner stream holds.
    fn open_available(&mut self) {
        while self.state.can_read() && self.inner.is_ready() {
            let mut record = vec![0u8; self.inner.size()];
            let n = self.inner.read(&mut record);
            if n == 0 {
                break;
            }
            record.truncate(n);
            match self.cipher.open(&record) {
                Ok(plaintext) => {
                    trace!(target = %self.target, bytes = plaintext.len(), "record opened");
                    self.plaintext.push(plaintext);
                }
                Err(violation) => self.reject(violation),
            }
        }
    }

    fn reject(&mut self, violation: ProtocolViolation) {
        warn!(target = %self.target, source = %self.inner.source(), %violation, "record rejected");
        self.events.add_event(Event::with_error(
            EventKind::InputFormatError,
            self.target,
            StreamError::from(violation),
        ));
        self.shutdown_input();
        self.shutdown_output();
    }
}

impl<S: Stream> Stream for CryptoFilter<S> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.state().can_read() || buf.is_empty() {
            return 0;
        }
        if self.plaintext.is_empty() {
            self.open_available();
        }
        if !self.state().can_read() {
            return 0;
        }
        self.plaintext.read(buf)
    }

    fn skip(&mut self, n: usize) -> usize {
        if !self.state().can_read() || n == 0 {
            return 0;
        }
        if self.plaintext.is_empty() {
            self.open_available();
        }
        if !self.state().can_read() {
            return 0;
        }
        self.plaintext.discard(n)
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
        match self.cipher.seal(buf) {
            Ok(record) => self.inner.write(&record),
            Err(err) => {
                warn!(target = %self.target, %err, "seal failed");
                self.events.add_event(Event::with_error(
                    EventKind::OutputError,
                    self.target,
                    StreamError::from(err),
                ));
            }
        }
    }

    fn flush(&mut self) {
        if self.state().can_write() {
            self.inner.flush();
        }
    }

    fn shutdown_input(&mut self) {
        if !self.state().can_read() {
            return;
        }
        self.plaintext.clear();
        self.inner.shutdown_input();
        self.state = self.state.after_input_shutdown();
    }

    fn shutdown_output(&mut self) {
        if !self.state().can_write() {
            return;
        }
        self.inner.shutdown_output();
        self.state = self.state.after_output_shutdown();
    }

    fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.plaintext.clear();
        self.inner.close();
        self.state = StreamState::Closed;
    }

    fn handle_readiness(&mut self, readiness: Readiness) {
        self.inner.handle_readiness(readiness);
        if readiness == Readiness::Readable && self.state().can_read() {
            self.open_available();
        }
    }

    fn is_ready(&self) -> bool {
        self.state().can_read() && !self.plaintext.is_empty()
    }

    fn size(&self) -> usize {
        if self.state().can_read() {
            self.plaintext.front_remaining()
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
