//! ChaCha20-Poly1305 payload keys.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use otgraph_core::{EncryptedData, SimKeyHash};

use crate::error::{KeysError, Result};

/// BLAKE3 derive-key context for [`SimKeyHash`].
const SIM_KEY_HASH_CONTEXT: &str = "otgraph 2024 sim-key-hash v1";

/// A 256-bit symmetric key sealing commit and snapshot payloads.
#[derive(Clone)]
pub struct SimKey([u8; 32]);

impl SimKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Identifier of this key. One-way, so it can travel in the clear.
    pub fn hash(&self) -> SimKeyHash {
        let mut hasher = blake3::Hasher::new_derive_key(SIM_KEY_HASH_CONTEXT);
        hasher.update(&self.0);
        SimKeyHash(*hasher.finalize().as_bytes())
    }

    /// Seal `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedData> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| KeysError::EncryptionError(e.to_string()))?;

        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| KeysError::EncryptionError(e.to_string()))?;
        Ok(EncryptedData::new(nonce, ciphertext))
    }

    /// Open a payload that claims to be sealed with the key hashing to
    /// `sealed_with`.
    pub fn decrypt(&self, data: &EncryptedData, sealed_with: &SimKeyHash) -> Result<Vec<u8>> {
        let own = self.hash();
        if own != *sealed_with {
            return Err(KeysError::WrongKey {
                expected: *sealed_with,
                actual: own,
            });
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| KeysError::DecryptionError(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_slice())
            .map_err(|e| KeysError::DecryptionError(e.to_string()))
    }
}

impl std::fmt::Debug for SimKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimKey({:?})", self.hash())
    }
}
