//! Terminal stream over a real transport handle.
//!
//! [`TransportStream`] is the only layer that performs native I/O and the only
//! one that originates transport-level events.  It never reads on its own
//! initiative: the event loop tells it the handle is readable or writable via
//! [`Stream::handle_readiness`], and it then performs **one** bounded native
//! read (or retries its queued writes).
//!
//! # Native handles
//!
//! Anything that can do non-blocking reads and best-effort writes implements
//! [`NativeHandle`]:
//!
//! - [`tcp::TcpHandle`] – a `std::net::TcpStream` in non-blocking mode.
//! - [`memory::MemoryHandle`] – one end of an in-memory pipe, used by tests
//!   and demos to control fragmentation, capacity and failures precisely.

pub mod memory;
pub mod tcp;

use std::io;
use std::net::Shutdown;

use tracing::{debug, error, trace, warn};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::event::{Event, EventKind, EventTarget, SharedEventQueue};
use crate::stream::{Readiness, Stream, StreamBuffer, StreamState};

/// A byte-oriented OS handle: socket, pipe, or equivalent.
///
/// `try_read` and `try_write` must never block; "not ready" is reported as an
/// [`io::ErrorKind::WouldBlock`] error.  `try_read` returning `Ok(0)` means the
/// peer closed its side.
#[cfg_attr(test, mockall::automock)]
pub trait NativeHandle {
    /// Reads whatever is available into `buf`.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Writes as much of `buf` as the handle accepts right now.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
    /// Writes all of `buf`, blocking as long as necessary.
    fn write_blocking(&mut self, buf: &[u8]) -> io::Result<()>;
    /// Half- or fully closes the handle.
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()>;
    /// Describes the remote end, e.g. `"192.168.1.20:24800"`.
    fn peer_name(&self) -> String;
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Root of every chain: adapts a [`NativeHandle`] to the [`Stream`] contract.
pub struct TransportStream<H> {
    handle: Option<H>,
    target: EventTarget,
    events: SharedEventQueue,
    state: StreamState,
    input: StreamBuffer,
    output: StreamBuffer,
    scratch: Vec<u8>,
    source: String,
    peer_eof: bool,
}

impl<H: NativeHandle> TransportStream<H> {
    /// Wraps `handle`, generating the chain's event target.
    pub fn new(handle: H, events: SharedEventQueue, config: &StreamConfig) -> Self {
        let source = handle.peer_name();
        let target = EventTarget::new();
        debug!(%target, %source, "transport stream created");
        Self {
            handle: Some(handle),
            target,
            events,
            state: StreamState::Open,
            input: StreamBuffer::new(),
            output: StreamBuffer::new(),
            scratch: vec![0u8; config.read_chunk_size.max(1)],
            source,
            peer_eof: false,
        }
    }

    /// Bytes accepted by `write` but not yet taken by the native handle.
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    /// `true` once the peer has closed its sending side.
    pub fn peer_closed(&self) -> bool {
        self.peer_eof
    }

    /// The native handle, until the stream is closed.
    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    fn publish(&self, kind: EventKind) {
        self.events.add_event(Event::new(kind, self.target));
    }

    fn publish_error(&self, kind: EventKind, error: StreamError) {
        self.events.add_event(Event::with_error(kind, self.target, error));
    }

    /// Reports an unrecoverable native failure and closes the chain root.
    fn fail(&mut self, kind: EventKind, err: io::Error) {
        let error = StreamError::from(err);
        error!(target = %self.target, source = %self.source, %error, "transport failed");
        if kind != EventKind::Disconnected {
            self.publish_error(kind, error.clone());
        }
        self.release();
        self.publish_error(EventKind::Disconnected, error);
    }

    fn release(&mut self) {
        self.input.clear();
        self.output.clear();
        self.handle = None;
        self.state = StreamState::Closed;
    }

    fn on_readable(&mut self) {
        if !self.state.can_read() || self.peer_eof {
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        match handle.try_read(&mut self.scratch) {
            Ok(0) => {
                debug!(target = %self.target, "peer closed its output");
                self.peer_eof = true;
                self.publish(EventKind::InputShutdown);
            }
            Ok(n) => {
                trace!(target = %self.target, bytes = n, "native read");
                self.input.write(&self.scratch[..n]);
                self.publish(EventKind::InputReady);
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => self.fail(EventKind::Disconnected, e),
        }
    }

    fn on_writable(&mut self) {
        if !self.state.can_write() || self.output.is_empty() {
            return;
        }
        if let Err(e) = self.push_output() {
            self.fail(EventKind::OutputError, e);
            return;
        }
        if self.output.is_empty() {
            self.publish(EventKind::OutputFlushed);
        }
    }

    /// Hands queued output to the handle until it stops accepting bytes.
    fn push_output(&mut self) -> io::Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        while !self.output.is_empty() {
            let chunk = self.output.front_chunk();
            let want = chunk.len();
            match handle.try_write(chunk) {
                Ok(0) => break,
                Ok(n) => {
                    trace!(target = %self.target, bytes = n, "native write (queued)");
                    self.output.discard(n);
                    if n < want {
                        break;
                    }
                }
                Err(e) if is_transient(&e) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<H: NativeHandle> Stream for TransportStream<H> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.state.can_read() {
            return 0;
        }
        self.input.read(buf)
    }

    fn skip(&mut self, n: usize) -> usize {
        if !self.state.can_read() {
            return 0;
        }
        self.input.discard(n)
    }

    fn write(&mut self, buf: &[u8]) {
        if !self.state.can_write() {
            self.publish_error(EventKind::OutputError, self.state.write_refusal());
            return;
        }
        if buf.is_empty() {
            return;
        }
        // Earlier bytes are still queued; appending keeps call order.
        if !self.output.is_empty() {
            self.output.write(buf);
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        match handle.try_write(buf) {
            Ok(n) => {
                trace!(target = %self.target, bytes = n, "native write");
                if n < buf.len() {
                    self.output.write(&buf[n..]);
                }
            }
            Err(e) if is_transient(&e) => self.output.write(buf),
            Err(e) => self.fail(EventKind::OutputError, e),
        }
    }

    fn flush(&mut self) {
        if !self.state.can_write() || self.output.is_empty() {
            return;
        }
        let pending = self.output.take_all();
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        match handle.write_blocking(&pending) {
            Ok(()) => {
                trace!(target = %self.target, bytes = pending.len(), "flushed");
                self.publish(EventKind::OutputFlushed);
            }
            Err(e) => self.fail(EventKind::OutputError, e),
        }
    }

    fn shutdown_input(&mut self) {
        if !self.state.can_read() {
            return;
        }
        self.input.clear();
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.shutdown(Shutdown::Read) {
                debug!(target = %self.target, "native input shutdown: {e}");
            }
        }
        self.state = self.state.after_input_shutdown();
        debug!(target = %self.target, state = ?self.state, "input shut down");
        self.publish(EventKind::InputShutdown);
        if self.state == StreamState::BothShutdown {
            self.publish(EventKind::Disconnected);
        }
    }

    fn shutdown_output(&mut self) {
        if !self.state.can_write() {
            return;
        }
        self.output.clear();
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.shutdown(Shutdown::Write) {
                debug!(target = %self.target, "native output shutdown: {e}");
            }
        }
        self.state = self.state.after_output_shutdown();
        debug!(target = %self.target, state = ?self.state, "output shut down");
        self.publish(EventKind::OutputShutdown);
        if self.state == StreamState::BothShutdown {
            self.publish(EventKind::Disconnected);
        }
    }

    fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.shutdown(Shutdown::Both) {
                debug!(target = %self.target, "native close: {e}");
            }
        }
        self.release();
        debug!(target = %self.target, "transport closed");
    }

    fn handle_readiness(&mut self, readiness: Readiness) {
        match readiness {
            Readiness::Readable => self.on_readable(),
            Readiness::Writable => self.on_writable(),
        }
    }

    fn is_ready(&self) -> bool {
        self.state.can_read() && !self.input.is_empty()
    }

    fn size(&self) -> usize {
        if self.state.can_read() {
            self.input.len()
        } else {
            0
        }
    }

    fn event_target(&self) -> EventTarget {
        self.target
    }

    fn source(&self) -> String {
        self.source.clone()
    }

    fn state(&self) -> StreamState {
        self.state
    }
}

impl<H> Drop for TransportStream<H> {
    fn drop(&mut self) {
        if self.handle.is_some() && !self.output.is_empty() {
            warn!(target = %self.target, bytes = self.output.len(), "transport dropped with unflushed output");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::event::{ChannelEventQueue, EventReceiver};

    fn mock_handle() -> MockNativeHandle {
        let mut handle = MockNativeHandle::new();
        handle
            .expect_peer_name()
            .return_const("mock-peer".to_string());
        handle.expect_shutdown().returning(|_| Ok(()));
        handle
    }

    fn make_transport(handle: MockNativeHandle) -> (TransportStream<MockNativeHandle>, EventReceiver) {
        let (queue, rx) = ChannelEventQueue::new();
        let transport = TransportStream::new(handle, Arc::new(queue), &StreamConfig::default());
        (transport, rx)
    }

    fn kinds(rx: &mut EventReceiver) -> Vec<EventKind> {
        rx.drain().into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_fresh_transport_is_not_ready_and_reads_zero() {
        // Arrange
        let (mut transport, mut rx) = make_transport(mock_handle());

        // Act
        let mut buf = [0u8; 16];
        let n = transport.read(&mut buf);

        // Assert
        assert!(!transport.is_ready());
        assert_eq!(n, 0);
        assert_eq!(transport.size(), 0);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_readable_notification_buffers_one_native_read() {
        // Arrange
        let mut handle = mock_handle();
        handle.expect_try_read().times(1).returning(|buf| {
            buf[..10].copy_from_slice(b"0123456789");
            Ok(10)
        });
        let (mut transport, mut rx) = make_transport(handle);

        // Act
        transport.handle_readiness(Readiness::Readable);

        // Assert
        assert!(transport.is_ready());
        assert!(transport.size() <= 10);
        assert_eq!(kinds(&mut rx), vec![EventKind::InputReady]);
        let mut buf = [0u8; 32];
        assert_eq!(transport.read(&mut buf), 10);
        assert_eq!(&buf[..10], b"0123456789");
    }

    #[test]
    fn test_would_block_read_publishes_nothing() {
        let mut handle = mock_handle();
        handle
            .expect_try_read()
            .returning(|_| Err(io::ErrorKind::WouldBlock.into()));
        let (mut transport, mut rx) = make_transport(handle);

        transport.handle_readiness(Readiness::Readable);

        assert!(!transport.is_ready());
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_partial_write_queues_remainder_until_writable() {
        // Arrange – the handle accepts 3 bytes, then the rest.
        let mut handle = mock_handle();
        let mut seq = mockall::Sequence::new();
        handle
            .expect_try_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(3));
        handle
            .expect_try_write()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|buf| buf == b"def")
            .returning(|buf| Ok(buf.len()));
        let (mut transport, mut rx) = make_transport(handle);

        // Act
        transport.write(b"abcdef");
        let queued = transport.pending_output();
        transport.handle_readiness(Readiness::Writable);

        // Assert
        assert_eq!(queued, 3);
        assert_eq!(transport.pending_output(), 0);
        assert_eq!(kinds(&mut rx), vec![EventKind::OutputFlushed]);
    }

    #[test]
    fn test_write_behind_queued_output_does_not_touch_handle() {
        let mut handle = mock_handle();
        handle
            .expect_try_write()
            .times(1)
            .returning(|_| Err(io::ErrorKind::WouldBlock.into()));
        let (mut transport, _rx) = make_transport(handle);

        transport.write(b"first");
        transport.write(b"second");

        assert_eq!(transport.pending_output(), 11);
    }

    #[test]
    fn test_flush_hands_queue_to_blocking_write() {
        // Arrange
        let mut handle = mock_handle();
        handle
            .expect_try_write()
            .returning(|_| Err(io::ErrorKind::WouldBlock.into()));
        handle
            .expect_write_blocking()
            .times(1)
            .withf(|buf| buf == b"queued")
            .returning(|_| Ok(()));
        let (mut transport, mut rx) = make_transport(handle);
        transport.write(b"queued");

        // Act
        transport.flush();

        // Assert
        assert_eq!(transport.pending_output(), 0);
        assert_eq!(kinds(&mut rx), vec![EventKind::OutputFlushed]);
    }

    #[test]
    fn test_write_after_output_shutdown_emits_one_error_and_no_io() {
        // Arrange
        let mut handle = mock_handle();
        handle.expect_try_write().never();
        handle.expect_write_blocking().never();
        let (mut transport, mut rx) = make_transport(handle);
        transport.shutdown_output();
        rx.drain();

        // Act
        transport.write(b"late");

        // Assert
        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::OutputError);
        assert_eq!(events[0].error, Some(StreamError::OutputShutdown));
    }

    #[test]
    fn test_native_read_failure_closes_and_disconnects() {
        let mut handle = mock_handle();
        handle
            .expect_try_read()
            .returning(|_| Err(io::ErrorKind::ConnectionReset.into()));
        let (mut transport, mut rx) = make_transport(handle);

        transport.handle_readiness(Readiness::Readable);

        assert_eq!(transport.state(), StreamState::Closed);
        assert!(transport.handle().is_none());
        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Disconnected);
        assert!(matches!(
            events[0].error,
            Some(StreamError::Transport {
                kind: io::ErrorKind::ConnectionReset,
                ..
            })
        ));
    }

    #[test]
    fn test_native_write_failure_reports_output_error_then_disconnect() {
        let mut handle = mock_handle();
        handle
            .expect_try_write()
            .returning(|_| Err(io::ErrorKind::BrokenPipe.into()));
        let (mut transport, mut rx) = make_transport(handle);

        transport.write(b"doomed");

        assert_eq!(transport.state(), StreamState::Closed);
        assert_eq!(
            kinds(&mut rx),
            vec![EventKind::OutputError, EventKind::Disconnected]
        );
    }

    #[test]
    fn test_peer_eof_keeps_buffered_input_readable() {
        // Arrange
        let mut handle = mock_handle();
        let mut seq = mockall::Sequence::new();
        handle
            .expect_try_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|buf| {
                buf[..2].copy_from_slice(b"hi");
                Ok(2)
            });
        handle
            .expect_try_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(0));
        let (mut transport, mut rx) = make_transport(handle);

        // Act
        transport.handle_readiness(Readiness::Readable);
        transport.handle_readiness(Readiness::Readable);
        // A further notification after EOF must not touch the handle.
        transport.handle_readiness(Readiness::Readable);

        // Assert
        assert!(transport.peer_closed());
        assert_eq!(
            kinds(&mut rx),
            vec![EventKind::InputReady, EventKind::InputShutdown]
        );
        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf), 2);
    }

    #[test]
    fn test_close_twice_is_idempotent() {
        // Arrange
        let (mut transport, mut rx) = make_transport(mock_handle());

        // Act
        transport.close();
        let after_first = (transport.state(), transport.handle().is_none());
        transport.close();

        // Assert
        assert_eq!(after_first, (StreamState::Closed, true));
        assert_eq!(transport.state(), StreamState::Closed);
        assert!(rx.drain().is_empty());
        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf), 0);
    }

    #[test]
    fn test_write_after_close_reports_closed() {
        let (mut transport, mut rx) = make_transport(mock_handle());
        transport.close();

        transport.write(b"x");
        transport.flush();

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error, Some(StreamError::Closed));
    }

    #[test]
    fn test_both_shutdowns_publish_disconnected_once() {
        let (mut transport, mut rx) = make_transport(mock_handle());

        transport.shutdown_input();
        transport.shutdown_output();
        transport.shutdown_output();

        assert_eq!(transport.state(), StreamState::BothShutdown);
        assert_eq!(
            kinds(&mut rx),
            vec![
                EventKind::InputShutdown,
                EventKind::OutputShutdown,
                EventKind::Disconnected
            ]
        );
    }

    #[test]
    fn test_source_reports_peer_name() {
        let (transport, _rx) = make_transport(mock_handle());
        assert_eq!(transport.source(), "mock-peer");
    }
}
