//! Store trait: the abstract interface for repository persistence.
//!
//! A store keeps, per repository, immutable commits with a parent index,
//! the current signed heads and signed snapshots, plus signed pull requests
//! per namespace owner. Implementations include SQLite (primary) and
//! in-memory (for tests).

use std::collections::BTreeSet;

use async_trait::async_trait;
use otgraph_core::{
    CommitEntry, CommitId, Ed25519PublicKey, RawCommit, RawCommitHead, RawPullRequest,
    RawSnapshot, RepoId, Signed, Verified,
};

use crate::error::{Result, StoreError};

/// Outcome of [`Store::save_heads`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadsUpdate {
    /// Heads that were inserted or refreshed with a newer timestamp.
    pub added: Vec<CommitId>,
    /// Existing heads removed because a stored commit now extends them.
    pub removed: Vec<CommitId>,
    /// Incoming heads that were not applied: unknown commit, already
    /// extended, or not newer than the stored head.
    pub ignored: Vec<CommitId>,
}

impl HeadsUpdate {
    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// The Store trait: async interface for repository persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Idempotent commits**: saving a commit that exists is a no-op. Commits
///   must be validated before they reach the store.
/// - **Idempotent heads**: saving an equal or older head is a no-op. A head
///   whose commit has stored children is superseded and removed.
/// - **Root**: every repository implicitly contains [`CommitId::ROOT`].
/// - **Signed records** are only accepted in their [`Verified`] form.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Repository Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Names of the repositories stored for `owner`.
    async fn list_repos(&self, owner: &Ed25519PublicKey) -> Result<BTreeSet<String>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Commit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist validated commits. Returns how many were new.
    async fn save_commits(&self, repo: &RepoId, entries: &[CommitEntry]) -> Result<usize>;

    /// Load a commit by id. The root has no body and is never returned.
    async fn load_commit(&self, repo: &RepoId, id: &CommitId) -> Result<Option<RawCommit>>;

    /// Whether the commit is stored. Always true for the root.
    async fn has_commit(&self, repo: &RepoId, id: &CommitId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Head Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Current heads of a repository.
    async fn get_heads(&self, repo: &RepoId) -> Result<Vec<Signed<RawCommitHead>>>;

    /// Apply verified heads. See [`HeadsUpdate`] for the outcome.
    async fn save_heads(
        &self,
        repo: &RepoId,
        heads: &[Verified<RawCommitHead>],
    ) -> Result<HeadsUpdate>;

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshot Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a snapshot. Returns false if one already exists at that commit.
    async fn save_snapshot(&self, snapshot: &Verified<RawSnapshot>) -> Result<bool>;

    async fn load_snapshot(
        &self,
        repo: &RepoId,
        id: &CommitId,
    ) -> Result<Option<Signed<RawSnapshot>>>;

    /// Commit ids that have a stored snapshot.
    async fn list_snapshots(&self, repo: &RepoId) -> Result<BTreeSet<CommitId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Pull Request Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a pull request under the owner of its target repository.
    /// Returns false if it was already stored.
    async fn save_pull_request(&self, request: &Verified<RawPullRequest>) -> Result<bool>;

    /// Pull requests targeting any repository of `owner`.
    async fn get_pull_requests(
        &self,
        owner: &Ed25519PublicKey,
    ) -> Result<Vec<Signed<RawPullRequest>>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Ids of the current heads.
    fn head_ids(
        &self,
        repo: &RepoId,
    ) -> impl std::future::Future<Output = Result<BTreeSet<CommitId>>> + Send;

    /// The local frontier a download starts from: the head ids, or the root
    /// for an empty repository.
    fn frontier(
        &self,
        repo: &RepoId,
    ) -> impl std::future::Future<Output = Result<BTreeSet<CommitId>>> + Send;

    /// Of `ids`, those that are not stored.
    fn missing_commits(
        &self,
        repo: &RepoId,
        ids: &[CommitId],
    ) -> impl std::future::Future<Output = Result<Vec<CommitId>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn head_ids(&self, repo: &RepoId) -> Result<BTreeSet<CommitId>> {
        let heads = self.get_heads(repo).await?;
        Ok(heads.iter().map(|h| h.value.commit_id).collect())
    }

    async fn frontier(&self, repo: &RepoId) -> Result<BTreeSet<CommitId>> {
        let mut ids = self.head_ids(repo).await?;
        if ids.is_empty() {
            ids.insert(CommitId::ROOT);
        }
        Ok(ids)
    }

    async fn missing_commits(&self, repo: &RepoId, ids: &[CommitId]) -> Result<Vec<CommitId>> {
        let mut missing = Vec::new();
        for id in ids {
            if !self.has_commit(repo, id).await? {
                missing.push(*id);
            }
        }
        Ok(missing)
    }
}

/// Reject a record filed under the wrong repository.
pub(crate) fn ensure_repo(expected: &RepoId, got: &RepoId) -> Result<()> {
    if expected != got {
        return Err(StoreError::RepoMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        });
    }
    Ok(())
}
