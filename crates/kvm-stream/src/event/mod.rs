//! Events published by stream chains.
//!
//! # How streams talk back (for beginners)
//!
//! Streams never call user code directly.  When something happens – bytes
//! arrived, a write failed, the peer hung up – the stream *publishes* an
//! [`Event`] on an [`EventQueue`].  Every event is tagged with an
//! [`EventTarget`]: an opaque identity shared by every layer of one chain.
//! A consumer subscribes to the target of the chain it owns and does not need
//! to know how many filters are stacked on top of the transport.
//!
//! ```text
//! CryptoFilter ─┐
//! FramingFilter ├── all report EventTarget #7f3a…  (copied at construction)
//! BufferedStream│
//! TransportStream ─ generates EventTarget #7f3a…
//! ```
//!
//! The queue itself is an external collaborator; this crate only needs the
//! one-method [`EventQueue`] trait.  [`ChannelEventQueue`] is a ready-made
//! implementation on top of a Tokio unbounded channel, and [`EventDispatcher`]
//! routes drained events to handlers keyed by `(kind, target)`.

pub mod dispatcher;
pub mod queue;

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::StreamError;

pub use dispatcher::EventDispatcher;
pub use queue::{ChannelEventQueue, EventReceiver};

/// Identity of one stream chain.
///
/// Compared by value of the wrapped UUID, never by the structure of the
/// chain.  The root transport generates it; every filter copies it from the
/// stream it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTarget(Uuid);

impl EventTarget {
    /// Generates a fresh, globally unique target.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kinds of event a stream chain can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// New input arrived at the root transport; read the outermost stream
    /// until it returns 0.
    InputReady,
    /// A write failed or was attempted on a shut-down output side.
    OutputError,
    /// The transport's write queue has been fully handed to the OS.
    OutputFlushed,
    /// The output side was shut down.
    OutputShutdown,
    /// The input side was shut down, locally or by the peer (EOF).
    InputShutdown,
    /// The peer violated the framing or encryption protocol.
    InputFormatError,
    /// The transport is gone; the chain is closed.
    Disconnected,
}

/// One published event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Which chain it happened on.
    pub target: EventTarget,
    /// The failure behind error events, if any.
    pub error: Option<StreamError>,
}

impl Event {
    /// Creates an event without an error payload.
    pub fn new(kind: EventKind, target: EventTarget) -> Self {
        Self {
            kind,
            target,
            error: None,
        }
    }

    /// Creates an event carrying `error`.
    pub fn with_error(kind: EventKind, target: EventTarget, error: StreamError) -> Self {
        Self {
            kind,
            target,
            error: Some(error),
        }
    }
}

/// The publishing side of the process-wide event queue.
///
/// Implementations must deliver events FIFO per target.  `add_event` must not
/// block: it is called from inside stream operations.
pub trait EventQueue: Send + Sync {
    /// Enqueues `event` for later dispatch.
    fn add_event(&self, event: Event);
}

/// Shared handle to an event queue, as held by every stream.
pub type SharedEventQueue = Arc<dyn EventQueue>;
