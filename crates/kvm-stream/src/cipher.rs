//! Authenticated record encryption used by [`crate::CryptoFilter`].
//!
//! # Record layout (for beginners)
//!
//! Every plaintext handed to [`Cipher::seal`] becomes one self-contained
//! *record*:
//!
//! ```text
//! [nonce:12][ciphertext:plaintext_len][tag:16]
//! ```
//!
//! The nonce is drawn fresh from the OS random source for every record, so
//! two records carrying the same plaintext never look alike on the wire.  The
//! 16-byte Poly1305 tag authenticates nonce-bound ciphertext: flipping any bit
//! makes [`Cipher::open`] fail with [`ProtocolViolation::DecryptionFailed`].
//!
//! # Directions and ordering
//!
//! Both peers start from the same 32-byte key ([`Cipher::from_secret`] derives
//! it from a shared passphrase with BLAKE3's key-derivation mode).  Each side
//! then derives one key per direction, picked by its [`Role`], so a record
//! sent back to its author does not open.  Every record also authenticates
//! its position in its direction as associated data: a replayed, dropped or
//! reordered record fails to open.

use std::fmt;

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::error::{CipherError, ProtocolViolation};

/// Nonce width in bytes.
pub const NONCE_LEN: usize = 12;
/// Authentication tag width in bytes.
pub const TAG_LEN: usize = 16;
/// Bytes a record adds on top of its plaintext.
pub const RECORD_OVERHEAD: usize = NONCE_LEN + TAG_LEN;
/// Key width in bytes.
pub const KEY_LEN: usize = 32;

const KEY_CONTEXT: &str = "kvm-over-ip stream 2026 record key v1";
const INITIATOR_CONTEXT: &str = "kvm-over-ip stream 2026 initiator to responder v1";
const RESPONDER_CONTEXT: &str = "kvm-over-ip stream 2026 responder to initiator v1";

/// Which end of a connection a [`Cipher`] serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The side that opened the connection.
    Initiator,
    /// The side that accepted it.
    Responder,
}

impl Role {
    /// The role of the other end.
    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    fn sending_context(self) -> &'static str {
        match self {
            Role::Initiator => INITIATOR_CONTEXT,
            Role::Responder => RESPONDER_CONTEXT,
        }
    }
}

/// A ChaCha20-Poly1305 cipher for one end of one session.
pub struct Cipher {
    role: Role,
    sealer: ChaCha20Poly1305,
    opener: ChaCha20Poly1305,
    sealed: u64,
    opened: u64,
}

impl Cipher {
    /// Builds a cipher from the shared session key.
    pub fn from_key(key: [u8; KEY_LEN], role: Role) -> Self {
        let sending = blake3::derive_key(role.sending_context(), &key);
        let receiving = blake3::derive_key(role.peer().sending_context(), &key);
        Self {
            role,
            sealer: ChaCha20Poly1305::new(Key::from_slice(&sending)),
            opener: ChaCha20Poly1305::new(Key::from_slice(&receiving)),
            sealed: 0,
            opened: 0,
        }
    }

    /// Builds a cipher from a key slice of exactly [`KEY_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::KeyLength`] for any other length.
    pub fn from_key_slice(key: &[u8], role: Role) -> Result<Self, CipherError> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| CipherError::KeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        Ok(Self::from_key(key, role))
    }

    /// Derives the session key from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::EmptySecret`] if `secret` is empty.
    pub fn from_secret(secret: &str, role: Role) -> Result<Self, CipherError> {
        if secret.is_empty() {
            return Err(CipherError::EmptySecret);
        }
        Ok(Self::from_key(
            blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            role,
        ))
    }

    /// The end this cipher serves.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Encrypts `plaintext` into the next outgoing record.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::SealFailed`] if the AEAD rejects the input.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let position = self.sealed.to_be_bytes();
        let ciphertext = self
            .sealer
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: &position,
                },
            )
            .map_err(|_| CipherError::SealFailed {
                len: plaintext.len(),
            })?;
        self.sealed = self.sealed.wrapping_add(1);
        let mut record = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        record.extend_from_slice(&nonce);
        record.extend_from_slice(&ciphertext);
        Ok(record)
    }

    /// Authenticates and decrypts the next incoming record.
    ///
    /// # Errors
    ///
    /// - [`ProtocolViolation::RecordTooShort`] if `record` cannot hold a nonce
    ///   and a tag.
    /// - [`ProtocolViolation::DecryptionFailed`] if authentication fails,
    ///   including a record that is out of sequence or came from this end.
    pub fn open(&mut self, record: &[u8]) -> Result<Vec<u8>, ProtocolViolation> {
        if record.len() < RECORD_OVERHEAD {
            return Err(ProtocolViolation::RecordTooShort { len: record.len() });
        }
        let (nonce, ciphertext) = record.split_at(NONCE_LEN);
        let position = self.opened.to_be_bytes();
        let plaintext = self
            .opener
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &position,
                },
            )
            .map_err(|_| ProtocolViolation::DecryptionFailed)?;
        self.opened = self.opened.wrapping_add(1);
        Ok(plaintext)
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &"ChaCha20-Poly1305")
            .field("role", &self.role)
            .field("sealed", &self.sealed)
            .field("opened", &self.opened)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
