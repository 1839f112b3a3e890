//! Length-prefixed message framing.
//!
//! Wire format, repeated:
//! ```text
//! [payload_len:4, big-endian u32][payload:payload_len]
//! ```
//!
//! # Decode state machine (for beginners)
//!
//! TCP delivers a *byte* stream: one `send` of 100 bytes may arrive as
//! 3 + 60 + 37 bytes, and two sends may arrive glued together.  The decoder
//! therefore accumulates raw bytes and walks a two-state machine:
//!
//! ```text
//!            4 bytes buffered                payload_len bytes buffered
//! AwaitingLength ──────────────▶ AwaitingPayload ──────────────▶ (frame complete)
//!       ▲                                                              │
//!       └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only complete frames are ever exposed to the caller, and a single `read`
//! never returns bytes from two different frames.  A declared length above the
//! configured ceiling is a protocol violation: the filter publishes
//! [`EventKind::InputFormatError`] and shuts its input down instead of trying
//! to buffer the announced payload.

use tracing::{trace, warn};

use crate::config::StreamConfig;
use crate::error::{ProtocolViolation, StreamError};
use crate::event::{Event, EventKind, EventTarget, SharedEventQueue};
use crate::stream::{MessageQueue, Readiness, Stream, StreamBuffer, StreamState};

/// Width of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Longest payload the 4-byte length prefix can describe.
pub const MAX_ENCODABLE_LEN: usize = u32::MAX as usize;

/// Builds the on-wire bytes for one frame.
///
/// # Errors
///
/// Returns [`ProtocolViolation::FrameTooLarge`] if `payload` is longer than
/// [`MAX_ENCODABLE_LEN`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolViolation> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolViolation::FrameTooLarge {
        declared: payload.len(),
        limit: MAX_ENCODABLE_LEN,
    })?;
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingLength,
    AwaitingPayload { len: usize },
}

/// Message-framing filter over `S`.
pub struct FramingFilter<S> {
    inner: S,
    target: EventTarget,
    events: SharedEventQueue,
    state: StreamState,
    raw: StreamBuffer,
    decode: DecodeState,
    frames: MessageQueue,
    max_frame_len: usize,
    scratch: Vec<u8>,
}

impl<S: Stream> FramingFilter<S> {
    /// Wraps `inner`; the frame ceiling comes from `config.max_frame_len`,
    /// capped at [`MAX_ENCODABLE_LEN`].
    pub fn new(inner: S, events: SharedEventQueue, config: &StreamConfig) -> Self {
        let target = inner.event_target();
        Self {
            inner,
            target,
            events,
            state: StreamState::Open,
            raw: StreamBuffer::new(),
            decode: DecodeState::AwaitingLength,
            frames: MessageQueue::new(),
            max_frame_len: config.max_frame_len.min(MAX_ENCODABLE_LEN),
            scratch: vec![0u8; config.read_chunk_size.max(1)],
        }
    }

    /// Number of complete frames not yet fully read.
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Largest payload accepted in either direction.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// The wrapped stream.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The wrapped stream, mutably.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    fn pull_from_inner(&mut self) {
        loop {
            let n = self.inner.read(&mut self.scratch);
            if n == 0 {
                break;
            }
            self.raw.write(&self.scratch[..n]);
        }
    }

    fn decode_frames(&mut self) {
        while self.state.can_read() {
            match self.decode {
                DecodeState::AwaitingLength => {
                    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
                    if !self.raw.peek(&mut prefix) {
                        break;
                    }
                    self.raw.discard(LENGTH_PREFIX_LEN);
                    let len = u32::from_be_bytes(prefix) as usize;
                    if len > self.max_frame_len {
                        self.reject(ProtocolViolation::FrameTooLarge {
                            declared: len,
                            limit: self.max_frame_len,
                        });
                        break;
                    }
                    if len == 0 {
                        trace!(target = %self.target, "empty frame dropped");
                        continue;
                    }
                    self.decode = DecodeState::AwaitingPayload { len };
                }
                DecodeState::AwaitingPayload { len } => match self.raw.take(len) {
                    Some(payload) => {
                        trace!(target = %self.target, len, "frame complete");
                        self.frames.push(payload);
                        self.decode = DecodeState::AwaitingLength;
                    }
                    None => break,
                },
            }
        }
    }

    fn reject(&mut self, violation: ProtocolViolation) {
        warn!(target = %self.target, source = %self.inner.source(), %violation, "framing violation");
        self.events.add_event(Event::with_error(
            EventKind::InputFormatError,
            self.target,
            StreamError::from(violation),
        ));
        self.shutdown_input();
    }

    fn ensure_frame(&mut self) {
        if self.frames.is_empty() {
            self.pull_from_inner();
            self.decode_frames();
        }
    }
}

impl<S: Stream> Stream for FramingFilter<S> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.state().can_read() || buf.is_empty() {
            return 0;
        }
        self.ensure_frame();
        if !self.state().can_read() {
            return 0;
        }
        self.frames.read(buf)
    }

    fn skip(&mut self, n: usize) -> usize {
        if !self.state().can_read() || n == 0 {
            return 0;
        }
        self.ensure_frame();
        if !self.state().can_read() {
            return 0;
        }
        self.frames.discard(n)
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
        let framed = if buf.len() > self.max_frame_len {
            Err(ProtocolViolation::FrameTooLarge {
                declared: buf.len(),
                limit: self.max_frame_len,
            })
        } else {
            encode_frame(buf)
        };
        match framed {
            Ok(framed) => self.inner.write(&framed),
            Err(violation) => {
                warn!(target = %self.target, len = buf.len(), "outgoing frame exceeds ceiling");
                self.events.add_event(Event::with_error(
                    EventKind::OutputError,
                    self.target,
                    StreamError::from(violation),
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
        self.raw.clear();
        self.frames.clear();
        self.decode = DecodeState::AwaitingLength;
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
        self.raw.clear();
        self.frames.clear();
        self.inner.close();
        self.state = StreamState::Closed;
    }

    fn handle_readiness(&mut self, readiness: Readiness) {
        self.inner.handle_readiness(readiness);
        if readiness == Readiness::Readable && self.state().can_read() {
            self.pull_from_inner();
            self.decode_frames();
        }
    }

    fn is_ready(&self) -> bool {
        self.state().can_read() && !self.frames.is_empty()
    }

    fn size(&self) -> usize {
        if !self.state().can_read() {
            return 0;
        }
        self.frames.front_remaining()
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
