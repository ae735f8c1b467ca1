//! Error types for otgraph core.

use thiserror::Error;

use crate::types::CommitId;

/// Core errors raised while encoding, decoding or verifying records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("malformed commit id: {0}")]
    MalformedIdentity(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("no level above parent {0}")]
    LevelOverflow(CommitId),
}

/// Errors raised while validating an untrusted commit stream.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("unexpected commit {got}, expected {expected:?}")]
    UnexpectedCommit {
        expected: Option<CommitId>,
        got: CommitId,
    },

    #[error("commit id mismatch: claimed {claimed}, computed {computed}")]
    CommitIdMismatch {
        claimed: CommitId,
        computed: CommitId,
    },

    #[error("stream ended while commit {missing} was still expected")]
    UnexpectedEndOfStream { missing: CommitId },

    #[error("malformed commit id: {0}")]
    MalformedIdentity(String),

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::MalformedIdentity(msg) => ValidationError::MalformedIdentity(msg),
            CoreError::MalformedRecord(msg) | CoreError::DecodingError(msg) => {
                ValidationError::StructuralError(msg)
            }
            e @ CoreError::LevelOverflow(_) => ValidationError::StructuralError(e.to_string()),
        }
    }
}
