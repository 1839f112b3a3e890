//! The bidirectional stream contract.
//!
//! # One interface, four variants (for beginners)
//!
//! Every piece of the I/O stack – the socket adapter at the bottom and each
//! filter stacked on top of it – implements the same [`Stream`] trait.  A
//! filter owns exactly one inner stream and forwards calls to it, transforming
//! the bytes on the way:
//!
//! ```text
//! caller ─▶ CryptoFilter ─▶ FramingFilter ─▶ BufferedStream ─▶ TransportStream ─▶ socket
//! ```
//!
//! Because filters are generic over `S: Stream`, a chain is an ordinary nested
//! value (`CryptoFilter<FramingFilter<...>>`) with strictly linear ownership.
//! `Box<dyn Stream>` also implements the trait for chains built at runtime.
//!
//! # Contract every implementation honours
//!
//! - `read` never blocks.  `0` means "nothing right now" (or input shut down).
//! - `write` never returns an error.  Failures become
//!   [`EventKind::OutputError`](crate::event::EventKind::OutputError) events.
//! - `flush` is the only operation allowed to block.
//! - `is_ready` / `size` answer from buffered state and never block.
//! - `close` is idempotent; after it `read` returns 0, `write` publishes an
//!   error event and `flush` returns immediately.

pub mod buffer;
pub mod messages;
pub mod state;

pub use buffer::StreamBuffer;
pub use messages::MessageQueue;
pub use state::StreamState;

use crate::event::EventTarget;

/// Readiness notification delivered by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The transport handle has data available.
    Readable,
    /// The transport handle can accept more output.
    Writable,
}

/// Bidirectional, event-reporting byte stream.
pub trait Stream {
    /// Reads up to `buf.len()` bytes without blocking.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Discards up to `n` bytes of input without copying them anywhere.
    ///
    /// The default implementation reads through a small scratch buffer.
    fn skip(&mut self, n: usize) -> usize {
        let mut scratch = [0u8; 512];
        let mut skipped = 0;
        while skipped < n {
            let want = (n - skipped).min(scratch.len());
            let got = self.read(&mut scratch[..want]);
            if got == 0 {
                break;
            }
            skipped += got;
        }
        skipped
    }

    /// Writes all of `buf`, possibly buffering it.
    fn write(&mut self, buf: &[u8]);

    /// Blocks until everything buffered by this stream and the streams below
    /// it has been handed to the transport.
    fn flush(&mut self);

    /// Discards pending input; later reads return 0.
    fn shutdown_input(&mut self);

    /// Discards unsent output; later writes publish error events.
    fn shutdown_output(&mut self);

    /// Discards all buffered data and releases the inner stream or handle.
    fn close(&mut self);

    /// Propagates a readiness notification down to the transport and lets each
    /// layer pull or push buffered data on the way back up.
    fn handle_readiness(&mut self, readiness: Readiness);

    /// `true` iff an immediate `read` is guaranteed to return data.
    fn is_ready(&self) -> bool;

    /// Conservative count of bytes `read` can return without blocking.
    fn size(&self) -> usize;

    /// The chain's shared event target.
    fn event_target(&self) -> EventTarget;

    /// Human-readable origin of the data, e.g. the peer address.
    fn source(&self) -> String;

    /// Current lifecycle state of this layer.
    fn state(&self) -> StreamState;
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }

    fn skip(&mut self, n: usize) -> usize {
        (**self).skip(n)
    }

    fn write(&mut self, buf: &[u8]) {
        (**self).write(buf)
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn shutdown_input(&mut self) {
        (**self).shutdown_input()
    }

    fn shutdown_output(&mut self) {
        (**self).shutdown_output()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn handle_readiness(&mut self, readiness: Readiness) {
        (**self).handle_readiness(readiness)
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn event_target(&self) -> EventTarget {
        (**self).event_target()
    }

    fn source(&self) -> String {
        (**self).source()
    }

    fn state(&self) -> StreamState {
        (**self).state()
    }
}
