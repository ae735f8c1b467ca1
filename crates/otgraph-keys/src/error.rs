//! Error types for payload keys.

use thiserror::Error;

use otgraph_core::SimKeyHash;

/// Errors that can occur while sealing or opening payloads.
#[derive(Debug, Error)]
pub enum KeysError {
    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// The payload was sealed with a different key.
    #[error("payload sealed with {expected:?}, not {actual:?}")]
    WrongKey {
        expected: SimKeyHash,
        actual: SimKeyHash,
    },

    /// No key in the ring matches the payload.
    #[error("no key for {0:?}")]
    UnknownKey(SimKeyHash),
}

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, KeysError>;
