//! kvm-probe library entry point.
//!
//! Re-exports the module tree shared by `main.rs` and the tests.
//!
//! # What does kvm-probe do? (for beginners)
//!
//! The probe is a field diagnostic for the stream stack.  One machine runs
//! `kvm-probe listen`, another runs `kvm-probe connect HOST:PORT`.  Both build
//! the same encrypted, framed chain over TCP:
//!
//! ```text
//! CryptoFilter ─▶ FramingFilter ─▶ BufferedStream ─▶ TransportStream ─▶ TCP
//! ```
//!
//! The connecting side sends a message, the listener echoes it back, and the
//! round-trip time is reported.  A wrong shared secret shows up as a
//! decryption failure on the listener; a firewall shows up as a connect
//! timeout.

/// Application layer: transport-agnostic echo and ping sessions.
pub mod application;

/// Infrastructure layer: config file and tokio-driven TCP sockets.
pub mod infrastructure;
