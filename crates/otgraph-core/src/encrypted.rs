//! Opaque encrypted payloads carried by commits and snapshots.
//!
//! The engine never decrypts these; the cipher lives in `otgraph-keys`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ciphertext plus the nonce it was sealed with.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    pub fn new(nonce: [u8; 12], ciphertext: Vec<u8>) -> Self {
        Self { nonce, ciphertext }
    }
}

impl fmt::Debug for EncryptedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedData")
            .field("nonce", &hex::encode(self.nonce))
            .field("len", &self.ciphertext.len())
            .finish()
    }
}

/// Identifies which symmetric key sealed a payload without revealing it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimKeyHash(pub [u8; 32]);

impl SimKeyHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SimKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimKeyHash({})", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for SimKeyHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
