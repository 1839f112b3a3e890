//! Error taxonomy for the stream core.
//!
//! # Errors are events, not return values (for beginners)
//!
//! Most functions in this crate do **not** return `Result`.  A `write()` that
//! fails, a frame that is too large, or a record that fails its integrity check
//! is reported *asynchronously* by publishing an [`crate::event::Event`] on the
//! chain's event target.  The error value travels inside the event so the
//! consumer can log it or decide to reconnect.
//!
//! Three families exist:
//!
//! - **Transport** – the native socket or pipe failed.  Fatal to the chain.
//! - **Protocol violation** – the peer sent something we refuse to process
//!   (oversized frame, corrupted ciphertext).  Fatal to the connection.
//! - **Backpressure** – not an error at all; a writer simply waits.  There is
//!   deliberately no variant for it.

use std::io;

use thiserror::Error;

/// Errors carried by stream events.
///
/// The type is `Clone + PartialEq` so that tests can compare the payload of a
/// received event directly.  For that reason I/O failures are captured as an
/// [`io::ErrorKind`] plus the rendered message instead of the `io::Error`
/// itself (which is neither `Clone` nor `PartialEq`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The native transport failed.
    #[error("transport failure ({kind:?}): {message}")]
    Transport { kind: io::ErrorKind, message: String },

    /// The peer violated the framing or encryption protocol.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Outgoing data could not be encrypted.
    #[error("encryption failure: {0}")]
    Encryption(#[from] CipherError),

    /// A write was attempted after the output side was shut down.
    #[error("write attempted after output shutdown")]
    OutputShutdown,

    /// A write was attempted after the stream was closed.
    #[error("stream is closed")]
    Closed,
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        StreamError::Transport {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Ways in which a peer can break the wire protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A frame header declared a payload longer than the configured ceiling.
    #[error("declared frame length {declared} exceeds the limit of {limit} bytes")]
    FrameTooLarge { declared: usize, limit: usize },

    /// An encrypted record failed authentication.
    #[error("record failed decryption or integrity check")]
    DecryptionFailed,

    /// An encrypted record is shorter than nonce plus tag.
    #[error("encrypted record of {len} bytes is too short")]
    RecordTooShort { len: usize },
}

/// Failures while building a cipher or sealing a record.
///
/// Opening a record never yields this type: a record that will not open is
/// the peer's fault and is reported as a [`ProtocolViolation`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The shared secret was empty.
    #[error("shared secret must not be empty")]
    EmptySecret,

    /// Raw key material had the wrong length.
    #[error("key must be {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    /// The AEAD refused to encrypt the plaintext.
    #[error("failed to seal record of {len} bytes")]
    SealFailed { len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts_to_transport_variant() {
        // Arrange
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");

        // Act
        let err: StreamError = io_err.into();

        // Assert
        assert_eq!(
            err,
            StreamError::Transport {
                kind: io::ErrorKind::ConnectionReset,
                message: "peer reset".to_string(),
            }
        );
    }

    #[test]
    fn test_protocol_violation_display_names_both_lengths() {
        let err = StreamError::from(ProtocolViolation::FrameTooLarge {
            declared: 10,
            limit: 4,
        });
        let text = err.to_string();
        assert!(text.contains("10"));
        assert!(text.contains('4'));
    }
}
