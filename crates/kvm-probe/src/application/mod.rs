//! Application layer: sessions that speak to any [`kvm_stream::Stream`].

pub mod echo;

pub use echo::{EchoSession, LinkWatch, PingReply, PingSession};
