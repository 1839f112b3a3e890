//! Filters: streams that wrap exactly one inner stream.
//!
//! Each filter copies the inner stream's [`crate::event::EventTarget`] when it
//! is constructed, checks its own [`crate::StreamState`] before forwarding a
//! call (so a refused write produces exactly one error event, from the
//! outermost layer that refused it), and forwards shutdown/close downward.

pub mod buffered;
pub mod crypto;
pub mod framing;

pub use buffered::BufferedStream;
pub use crypto::CryptoFilter;
pub use framing::FramingFilter;
