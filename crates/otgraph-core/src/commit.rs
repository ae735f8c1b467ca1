//! Commit graph records.
//!
//! A [`RawCommit`] is an immutable DAG node. Its level is never stored or
//! transferred: it is derived from the parents, and the [`CommitId`] embeds
//! it, so a forged level shows up as a hash mismatch.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::canonical;
use crate::error::CoreError;
use crate::encrypted::{EncryptedData, SimKeyHash};
use crate::types::{CommitId, RepoId};

/// An immutable node of the commit graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
    /// OT epoch the diffs belong to.
    pub epoch: u64,

    /// Parent ids. Never empty: the first commit of a repository has the root
    /// as its only parent.
    pub parents: BTreeSet<CommitId>,

    /// Encrypted OT diffs. Opaque to the engine.
    pub encrypted_diffs: EncryptedData,

    /// Identifies the key that sealed `encrypted_diffs`.
    pub sim_key_hash: SimKeyHash,

    /// Creation time, Unix milliseconds.
    pub timestamp: i64,
}

impl RawCommit {
    pub fn new(
        epoch: u64,
        parents: BTreeSet<CommitId>,
        encrypted_diffs: EncryptedData,
        sim_key_hash: SimKeyHash,
        timestamp: i64,
    ) -> Self {
        Self {
            epoch,
            parents,
            encrypted_diffs,
            sim_key_hash,
            timestamp,
        }
    }

    /// DAG depth: 1 with no parents, otherwise one above the deepest parent.
    pub fn level(&self) -> Result<u64, CoreError> {
        // Parents iterate highest level first.
        match self.parents.first() {
            None => Ok(1),
            Some(deepest) => deepest
                .level()
                .checked_add(1)
                .ok_or(CoreError::LevelOverflow(*deepest)),
        }
    }

    /// Canonical encoding, the preimage of the commit hash.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical::encode_commit(self)
    }

    /// Compute the content id of this commit.
    pub fn compute_id(&self) -> Result<CommitId, CoreError> {
        Ok(CommitId::of_commit_data(self.level()?, &self.canonical_bytes()))
    }

    /// Pair the commit with its computed id.
    pub fn into_entry(self) -> Result<CommitEntry, CoreError> {
        Ok(CommitEntry {
            id: self.compute_id()?,
            commit: self,
        })
    }
}

/// A commit together with the id it is claimed to have.
///
/// Comparison and equality look only at the id. For entries received from a
/// peer the id is a claim until a validator has recomputed it.
#[derive(Debug, Clone)]
pub struct CommitEntry {
    pub id: CommitId,
    pub commit: RawCommit,
}

impl CommitEntry {
    pub fn new(id: CommitId, commit: RawCommit) -> Self {
        Self { id, commit }
    }
}

impl PartialEq for CommitEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CommitEntry {}

impl Ord for CommitEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for CommitEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A pointer to a DAG tip. Only meaningful inside a signature envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawCommitHead {
    pub repo: RepoId,
    pub commit_id: CommitId,
    pub timestamp: i64,
}

impl RawCommitHead {
    pub fn new(repo: RepoId, commit_id: CommitId, timestamp: i64) -> Self {
        Self {
            repo,
            commit_id,
            timestamp,
        }
    }
}

/// Materialized repository state at a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSnapshot {
    pub repo: RepoId,
    pub commit_id: CommitId,
    pub encrypted_diffs: EncryptedData,
    pub sim_key_hash: SimKeyHash,
}

/// A request from the owner of `fork` to merge it into `repo`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawPullRequest {
    pub repo: RepoId,
    pub fork: RepoId,
}
