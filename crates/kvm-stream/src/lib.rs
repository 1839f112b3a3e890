//! # kvm-stream
//!
//! Composable bidirectional streams for KVM-Over-IP: the byte pipe every
//! higher layer (protocol state machine, clipboard sync, input replay) sits on.
//!
//! # Architecture overview (for beginners)
//!
//! A connection is a *chain* of layers, each implementing the same
//! [`Stream`] trait and owning the layer beneath it:
//!
//! - **`transport`** – [`TransportStream`], the root.  Adapts a native handle
//!   (TCP socket, in-memory pipe) to the contract: bounded non-blocking reads,
//!   queued partial writes, blocking `flush`.
//!
//! - **`filter`** – [`BufferedStream`] (send/receive buffering with a
//!   high-water mark), [`FramingFilter`] (length-prefixed messages) and
//!   [`CryptoFilter`] (authenticated encryption per message).
//!
//! - **`event`** – nothing in a chain returns an error.  Readiness and failure
//!   are published as [`Event`]s on an [`EventQueue`] under one
//!   [`EventTarget`] shared by the whole chain.
//!
//! - **`chain`** – builders for the usual stacks, e.g. [`secure_chain`].
//!
//! The model is single-threaded: one loop delivers readiness to the outermost
//! stream with [`Stream::handle_readiness`], then reads it until it returns 0.

pub mod chain;
pub mod cipher;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod stream;
pub mod transport;

pub use chain::{framed_chain, secure_chain, FramedChain, SecureChain};
pub use cipher::{Cipher, Role};
pub use config::{ConfigError, StreamConfig};
pub use error::{CipherError, ProtocolViolation, StreamError};
pub use event::{
    ChannelEventQueue, Event, EventDispatcher, EventKind, EventQueue, EventReceiver, EventTarget,
    SharedEventQueue,
};
pub use filter::{BufferedStream, CryptoFilter, FramingFilter};
pub use stream::{MessageQueue, Readiness, Stream, StreamBuffer, StreamState};
pub use transport::memory::{MemoryHandle, MemoryPipe, PipeMonitor};
pub use transport::tcp::TcpHandle;
pub use transport::{NativeHandle, TransportStream};
