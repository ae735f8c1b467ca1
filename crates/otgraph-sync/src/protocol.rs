//! The node-to-node protocol surface.
//!
//! Every node answers these calls for the repositories it stores. A client
//! or another node drives them through a [`Peer`](crate::Peer) handle; the
//! transport behind the handle is not this crate's concern.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use futures::stream::BoxStream;
use otgraph_core::{
    CommitEntry, CommitId, Ed25519PublicKey, RawCommit, RawCommitHead, RawPullRequest,
    RawSnapshot, RepoId, Signed,
};

use crate::error::{Result, SyncError};

/// A lazily produced commit stream, highest [`CommitId`] first.
///
/// Dropping the stream closes it; the producer stops on the next poll.
pub type CommitStream = BoxStream<'static, Result<CommitEntry>>;

/// Message size limits.
pub mod limits {
    /// Max signed heads in one `save_heads` or `upload` call.
    pub const MAX_HEADS: usize = 1024;
    /// Max start nodes in one `download` call.
    pub const MAX_START_NODES: usize = 1024;
    /// Max repository name length in bytes.
    pub const MAX_REPO_NAME: usize = 256;
}

/// Operations a node exposes to clients and other nodes.
#[async_trait]
pub trait NodeProtocol: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Repository Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Repository names stored under `owner`.
    async fn list(&self, owner: &Ed25519PublicKey) -> Result<BTreeSet<String>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Commit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store commits. Idempotent; heads are not touched.
    async fn save(&self, repo: &RepoId, commits: BTreeMap<CommitId, RawCommit>) -> Result<()>;

    async fn load_commit(&self, repo: &RepoId, id: &CommitId) -> Result<Option<RawCommit>>;

    /// Every commit reachable from this node's heads and not reachable from
    /// `start_nodes`, highest id first.
    async fn download(&self, repo: &RepoId, start_nodes: BTreeSet<CommitId>)
        -> Result<CommitStream>;

    /// Validate and store `commits`, then apply `heads`.
    async fn upload(
        &self,
        repo: &RepoId,
        heads: Vec<Signed<RawCommitHead>>,
        commits: CommitStream,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Head Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply signed heads whose commits are already stored.
    async fn save_heads(&self, repo: &RepoId, heads: Vec<Signed<RawCommitHead>>) -> Result<()>;

    async fn get_heads(&self, repo: &RepoId) -> Result<Vec<Signed<RawCommitHead>>>;

    /// Current heads; the long-polling variant of [`NodeProtocol::get_heads`].
    async fn poll_heads(&self, repo: &RepoId) -> Result<Vec<Signed<RawCommitHead>>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshot Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn save_snapshot(&self, snapshot: Signed<RawSnapshot>) -> Result<()>;

    async fn load_snapshot(
        &self,
        repo: &RepoId,
        id: &CommitId,
    ) -> Result<Option<Signed<RawSnapshot>>>;

    /// Snapshot ids this node has and `known` does not contain.
    async fn list_snapshots(
        &self,
        repo: &RepoId,
        known: BTreeSet<CommitId>,
    ) -> Result<BTreeSet<CommitId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Pull Request Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn send_pull_request(&self, request: Signed<RawPullRequest>) -> Result<()>;

    async fn get_pull_requests(
        &self,
        owner: &Ed25519PublicKey,
    ) -> Result<Vec<Signed<RawPullRequest>>>;
}

/// Reject oversized head lists before doing any work.
pub fn check_heads_len(heads: &[Signed<RawCommitHead>]) -> Result<()> {
    if heads.len() > limits::MAX_HEADS {
        return Err(SyncError::InvalidMessage(format!(
            "{} heads exceed limit of {}",
            heads.len(),
            limits::MAX_HEADS
        )));
    }
    Ok(())
}

/// Reject oversized start node sets before doing any work.
pub fn check_start_nodes_len(start_nodes: &BTreeSet<CommitId>) -> Result<()> {
    if start_nodes.len() > limits::MAX_START_NODES {
        return Err(SyncError::InvalidMessage(format!(
            "{} start nodes exceed limit of {}",
            start_nodes.len(),
            limits::MAX_START_NODES
        )));
    }
    Ok(())
}

/// Reject repository names outside the allowed length.
pub fn check_repo(repo: &RepoId) -> Result<()> {
    if repo.name.is_empty() || repo.name.len() > limits::MAX_REPO_NAME {
        return Err(SyncError::InvalidMessage(format!(
            "repository name must be 1..={} bytes",
            limits::MAX_REPO_NAME
        )));
    }
    Ok(())
}
