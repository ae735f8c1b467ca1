//! Identity types: commit ids and repository ids.
//!
//! Both are plain values with a deterministic binary form and a total order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::crypto::{Ed25519PublicKey, Sha256Hash};
use crate::error::CoreError;

/// Size of the big-endian level header in the binary form of a [`CommitId`].
pub const COMMIT_ID_HEADER_LEN: usize = 8;

/// Content identity of a commit: its DAG level plus the SHA-256 of its
/// canonical encoding.
///
/// The root sentinel has level 1 and no hash. Ordering puts higher levels
/// first, then compares hashes byte-lexicographically (root first), so a
/// sorted collection yields the newest commits first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId {
    level: u64,
    hash: Option<Sha256Hash>,
}

impl CommitId {
    /// The implicit root every repository shares.
    pub const ROOT: Self = Self {
        level: 1,
        hash: None,
    };

    /// Build a non-root id from its parts.
    pub const fn new(level: u64, hash: Sha256Hash) -> Self {
        Self {
            level,
            hash: Some(hash),
        }
    }

    /// Hash `data` (a canonical commit encoding) into an id at `level`.
    pub fn of_commit_data(level: u64, data: &[u8]) -> Self {
        Self::new(level, Sha256Hash::hash(data))
    }

    pub const fn level(&self) -> u64 {
        self.level
    }

    pub const fn hash(&self) -> Option<&Sha256Hash> {
        self.hash.as_ref()
    }

    pub const fn is_root(&self) -> bool {
        self.level == 1 && self.hash.is_none()
    }

    /// Binary form: 8-byte big-endian level followed by the hash bytes
    /// (empty for the root).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(COMMIT_ID_HEADER_LEN + 32);
        buf.extend_from_slice(&self.level.to_be_bytes());
        if let Some(hash) = &self.hash {
            buf.extend_from_slice(hash.as_bytes());
        }
        buf
    }

    /// Parse the binary form produced by [`CommitId::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() < COMMIT_ID_HEADER_LEN {
            return Err(CoreError::MalformedIdentity(format!(
                "{} bytes is shorter than the level header",
                bytes.len()
            )));
        }

        let (header, rest) = bytes.split_at(COMMIT_ID_HEADER_LEN);
        let mut level_bytes = [0u8; COMMIT_ID_HEADER_LEN];
        level_bytes.copy_from_slice(header);
        let level = u64::from_be_bytes(level_bytes);

        match rest.len() {
            0 if level == 1 => Ok(Self::ROOT),
            0 => Err(CoreError::MalformedIdentity(format!(
                "hashless id at level {level}"
            ))),
            32 if level >= 2 => {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(rest);
                Ok(Self::new(level, Sha256Hash(hash)))
            }
            32 => Err(CoreError::MalformedIdentity(format!(
                "non-root id at level {level}"
            ))),
            n => Err(CoreError::MalformedIdentity(format!(
                "hash must be 0 or 32 bytes, got {n}"
            ))),
        }
    }

    /// Convert to hex of the binary form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse from the hex of the binary form.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::MalformedIdentity(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Ord for CommitId {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .level
            .cmp(&self.level)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for CommitId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({self})")
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hash {
            Some(hash) => write!(f, "{}:{}", self.level, &hash.to_hex()[..16]),
            None => write!(f, "{}:root", self.level),
        }
    }
}

impl TryFrom<&[u8]> for CommitId {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(slice)
    }
}

/// Identity of a repository: the owner's public key plus a repository name.
///
/// All repositories sharing an owner form one namespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: Ed25519PublicKey,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: Ed25519PublicKey, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

impl fmt::Debug for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoId({self})")
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
