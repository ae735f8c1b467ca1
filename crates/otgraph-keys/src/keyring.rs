//! A set of payload keys indexed by their hash.

use std::collections::HashMap;

use otgraph_core::{RawCommit, RawSnapshot, SimKeyHash};

use crate::crypto::SimKey;
use crate::error::{KeysError, Result};

/// Keys a client holds for one repository.
///
/// Commits name the key that sealed them by [`SimKeyHash`]; the ring finds
/// the matching key so callers never juggle hashes themselves.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: HashMap<SimKeyHash, SimKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key. Returns its hash.
    pub fn insert(&mut self, key: SimKey) -> SimKeyHash {
        let hash = key.hash();
        self.keys.insert(hash, key);
        hash
    }

    pub fn get(&self, hash: &SimKeyHash) -> Option<&SimKey> {
        self.keys.get(hash)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Decrypt the diffs of a commit.
    pub fn open_commit(&self, commit: &RawCommit) -> Result<Vec<u8>> {
        let key = self
            .get(&commit.sim_key_hash)
            .ok_or(KeysError::UnknownKey(commit.sim_key_hash))?;
        key.decrypt(&commit.encrypted_diffs, &commit.sim_key_hash)
    }

    /// Decrypt the materialized state of a snapshot.
    pub fn open_snapshot(&self, snapshot: &RawSnapshot) -> Result<Vec<u8>> {
        let key = self
            .get(&snapshot.sim_key_hash)
            .ok_or(KeysError::UnknownKey(snapshot.sim_key_hash))?;
        key.decrypt(&snapshot.encrypted_diffs, &snapshot.sim_key_hash)
    }
}
