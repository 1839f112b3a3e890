//! Lifecycle state machine shared by every stream.
//!
//! ```text
//!            shutdown_input()               shutdown_output()
//!   Open ───────────────────▶ InputShutdown ─────────────────▶ BothShutdown
//!     │                                                           ▲
//!     │ shutdown_output()                       shutdown_input()  │
//!     └─────────────────────▶ OutputShutdown ─────────────────────┘
//!
//!   any state ── close() ──▶ Closed   (terminal, absorbing)
//! ```
//!
//! Transitions are pure functions returning the next state, so repeated calls
//! in a terminal-adjacent state return the same state and are therefore safe.

use crate::error::StreamError;

/// Lifecycle state of one stream instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Both directions usable.
    #[default]
    Open,
    /// Reads return 0; writes still allowed.
    InputShutdown,
    /// Writes are refused; reads still allowed.
    OutputShutdown,
    /// Both directions shut down, handles still held.
    BothShutdown,
    /// Buffers and the inner stream/transport have been released.
    Closed,
}

impl StreamState {
    /// `true` while reads may return data.
    pub fn can_read(self) -> bool {
        matches!(self, StreamState::Open | StreamState::OutputShutdown)
    }

    /// `true` while writes are accepted.
    pub fn can_write(self) -> bool {
        matches!(self, StreamState::Open | StreamState::InputShutdown)
    }

    /// `true` once `close()` has run.
    pub fn is_closed(self) -> bool {
        self == StreamState::Closed
    }

    /// State after a `shutdown_input()` call.
    pub fn after_input_shutdown(self) -> Self {
        match self {
            StreamState::Open => StreamState::InputShutdown,
            StreamState::OutputShutdown => StreamState::BothShutdown,
            other => other,
        }
    }

    /// State after a `shutdown_output()` call.
    pub fn after_output_shutdown(self) -> Self {
        match self {
            StreamState::Open => StreamState::OutputShutdown,
            StreamState::InputShutdown => StreamState::BothShutdown,
            other => other,
        }
    }

    /// The error reported when a write is refused in this state.
    pub fn write_refusal(self) -> StreamError {
        if self.is_closed() {
            StreamError::Closed
        } else {
            StreamError::OutputShutdown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_allows_both_directions() {
        let state = StreamState::default();
        assert_eq!(state, StreamState::Open);
        assert!(state.can_read());
        assert!(state.can_write());
    }

    #[test]
    fn test_shutdowns_combine_to_both_shutdown_in_either_order() {
        // Arrange
        let open = StreamState::Open;

        // Act
        let a = open.after_input_shutdown().after_output_shutdown();
        let b = open.after_output_shutdown().after_input_shutdown();

        // Assert
        assert_eq!(a, StreamState::BothShutdown);
        assert_eq!(b, StreamState::BothShutdown);
        assert!(!a.can_read());
        assert!(!a.can_write());
    }

    #[test]
    fn test_repeated_shutdown_is_idempotent() {
        let once = StreamState::Open.after_input_shutdown();
        let twice = once.after_input_shutdown();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_closed_is_absorbing() {
        let closed = StreamState::Closed;
        assert_eq!(closed.after_input_shutdown(), StreamState::Closed);
        assert_eq!(closed.after_output_shutdown(), StreamState::Closed);
        assert!(!closed.can_read());
        assert!(!closed.can_write());
    }

    #[test]
    fn test_write_refusal_distinguishes_closed_from_shutdown() {
        assert_eq!(StreamState::Closed.write_refusal(), StreamError::Closed);
        assert_eq!(
            StreamState::OutputShutdown.write_refusal(),
            StreamError::OutputShutdown
        );
    }
}
