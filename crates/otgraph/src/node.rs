//! The Node: one participant in a replicated namespace network.
//!
//! A node owns a local store, answers the [`NodeProtocol`] for peers and
//! clients, and drives fetch and push through a shared [`Synchronizer`].
//! Whether it pushes on its own is decided per namespace by its
//! [`NodeRole`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use otgraph_core::{
    verify_entry, CommitEntry, CommitId, Ed25519PublicKey, RawCommit, RawCommitHead,
    RawPullRequest, RawSnapshot, RepoId, Signed, ValidationError,
};
use otgraph_store::{Store, StoreExt};
use otgraph_sync::protocol::{check_heads_len, check_repo, check_start_nodes_len};
use otgraph_sync::{
    ingest_commits, verify_heads, walk_commits, CommitStream, Discovery, FetchReport, NodeId,
    NodeProtocol, Peer, PushReport, SyncError, SyncReport, Synchronizer,
};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::namespace::{NamespaceTable, NodeRole};

/// The main Node struct.
pub struct Node<S: Store + ?Sized> {
    id: NodeId,
    store: Arc<S>,
    sync: Synchronizer<S>,
    discovery: Arc<dyn Discovery>,
    namespaces: NamespaceTable,
    config: NodeConfig,
    shutdown: CancellationToken,
}

impl<S: Store + ?Sized + 'static> Node<S> {
    /// Create a new node.
    pub fn new(
        id: NodeId,
        store: Arc<S>,
        discovery: Arc<dyn Discovery>,
        config: NodeConfig,
    ) -> Self {
        Self {
            id,
            sync: Synchronizer::new(store.clone(), config.sync.clone()),
            store,
            discovery,
            namespaces: NamespaceTable::new(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// This node's role for `owner`'s namespace.
    pub async fn role(&self, owner: &Ed25519PublicKey) -> Result<NodeRole> {
        let masters = self.discovery.find_masters(owner).await?;
        Ok(NodeRole::of(&self.id, &masters))
    }

    /// Cancel every in-flight and future sync of this node.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn operation_token(&self) -> Result<CancellationToken> {
        if self.shutdown.is_cancelled() {
            return Err(NodeError::Shutdown);
        }
        Ok(self.shutdown.child_token())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Pull `repo` from `peer`.
    pub async fn fetch(&self, repo: &RepoId, peer: &Peer) -> Result<FetchReport> {
        let cancel = self.operation_token()?;
        let _guard = self.namespaces.lock(repo).await;
        Ok(self.sync.fetch(repo, peer, &cancel).await?)
    }

    /// Pull `repo` from several peers at once.
    pub async fn fetch_all(&self, repo: &RepoId, peers: &[Peer]) -> Result<FetchReport> {
        let cancel = self.operation_token()?;
        let _guard = self.namespaces.lock(repo).await;
        Ok(self.sync.fetch_all(repo, peers, &cancel).await?)
    }

    /// Pull `repo` from the masters of its namespace.
    pub async fn fetch_from_masters(&self, repo: &RepoId) -> Result<FetchReport> {
        let masters = self.remote_masters(repo).await?;
        if masters.is_empty() {
            return Err(NodeError::NoMaster(repo.clone()));
        }
        self.fetch_all(repo, &masters).await
    }

    /// Push `repo` to `peer`.
    pub async fn push(&self, repo: &RepoId, peer: &Peer) -> Result<PushReport> {
        let cancel = self.operation_token()?;
        let _guard = self.namespaces.lock(repo).await;
        Ok(self.sync.push(repo, peer, &cancel).await?)
    }

    /// Fetch from and push to `peer`.
    pub async fn sync(&self, repo: &RepoId, peer: &Peer) -> Result<SyncReport> {
        let cancel = self.operation_token()?;
        let _guard = self.namespaces.lock(repo).await;
        Ok(self.sync.sync(repo, peer, &cancel).await?)
    }

    /// Copy missing snapshots of `repo` from `peer`.
    pub async fn fetch_snapshots(&self, repo: &RepoId, peer: &Peer) -> Result<usize> {
        let cancel = self.operation_token()?;
        Ok(self.sync.fetch_snapshots(repo, peer, &cancel).await?)
    }

    async fn remote_masters(&self, repo: &RepoId) -> Result<Vec<Peer>> {
        let masters = self.discovery.find_masters(&repo.owner).await?;
        Ok(masters.into_iter().filter(|m| m.id != self.id).collect())
    }

    /// Push a freshly accepted write to the masters if this node is a
    /// replica. Failures are logged; the write itself already succeeded.
    async fn push_to_masters(&self, repo: &RepoId) {
        if !self.config.auto_push || self.config.push.max_attempts == 0 {
            return;
        }

        let masters = match self.discovery.find_masters(&repo.owner).await {
            Ok(masters) => masters,
            Err(e) => {
                tracing::warn!(repo = %repo, error = %e, "master discovery failed");
                return;
            }
        };
        if NodeRole::of(&self.id, &masters).is_master() {
            return;
        }
        if masters.is_empty() {
            tracing::debug!(repo = %repo, "no master to push to");
            return;
        }

        for master in &masters {
            if let Err(e) = self.push_with_retry(repo, master).await {
                tracing::warn!(repo = %repo, master = %master.id, error = %e, "auto-push failed");
            }
        }
    }

    async fn push_with_retry(&self, repo: &RepoId, master: &Peer) -> Result<PushReport> {
        let policy = &self.config.push;
        let mut attempt = 1;
        loop {
            match self.push(repo, master).await {
                Ok(report) => {
                    tracing::debug!(repo = %repo, master = %master.id, sent = report.sent, "auto-push done");
                    return Ok(report);
                }
                Err(e) if attempt < policy.max_attempts && !self.is_shut_down() => {
                    let delay = policy.backoff(attempt);
                    tracing::debug!(
                        repo = %repo,
                        master = %master.id,
                        attempt,
                        ?delay,
                        error = %e,
                        "auto-push failed, retrying"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Err(NodeError::Shutdown),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: Store + ?Sized + 'static> NodeProtocol for Node<S> {
    async fn list(&self, owner: &Ed25519PublicKey) -> otgraph_sync::Result<BTreeSet<String>> {
        Ok(self.store.list_repos(owner).await?)
    }

    async fn save(
        &self,
        repo: &RepoId,
        commits: BTreeMap<CommitId, RawCommit>,
    ) -> otgraph_sync::Result<()> {
        check_repo(repo)?;
        let entries: Vec<CommitEntry> = commits
            .into_iter()
            .map(|(id, commit)| CommitEntry::new(id, commit))
            .collect();
        for entry in &entries {
            verify_entry(entry)?;
        }

        let _guard = self.namespaces.lock(repo).await;
        let batch: BTreeSet<CommitId> = entries.iter().map(|e| e.id).collect();
        for entry in &entries {
            for parent in &entry.commit.parents {
                if !batch.contains(parent) && !self.store.has_commit(repo, parent).await? {
                    return Err(ValidationError::StructuralError(format!(
                        "parent {parent} of {} is not stored",
                        entry.id
                    ))
                    .into());
                }
            }
        }
        let saved = self.store.save_commits(repo, &entries).await?;
        tracing::debug!(repo = %repo, saved, "commits saved");
        Ok(())
    }

    async fn load_commit(
        &self,
        repo: &RepoId,
        id: &CommitId,
    ) -> otgraph_sync::Result<Option<RawCommit>> {
        Ok(self.store.load_commit(repo, id).await?)
    }

    async fn download(
        &self,
        repo: &RepoId,
        start_nodes: BTreeSet<CommitId>,
    ) -> otgraph_sync::Result<CommitStream> {
        check_repo(repo)?;
        check_start_nodes_len(&start_nodes)?;
        let heads = self.store.head_ids(repo).await?;
        let commits = walk_commits(self.store.clone(), repo.clone(), heads, start_nodes);
        Ok(commits
            .take_until(self.shutdown.clone().cancelled_owned())
            .boxed())
    }

    async fn upload(
        &self,
        repo: &RepoId,
        heads: Vec<Signed<RawCommitHead>>,
        commits: CommitStream,
    ) -> otgraph_sync::Result<()> {
        check_repo(repo)?;
        check_heads_len(&heads)?;
        let heads = verify_heads(repo, heads)?;
        let cancel = self
            .operation_token()
            .map_err(|_| SyncError::Cancelled)?;

        let changed = {
            let _guard = self.namespaces.lock(repo).await;
            let terminal = self.store.frontier(repo).await?;
            let ingested = ingest_commits(
                self.store.as_ref(),
                repo,
                heads.iter().map(|h| h.commit_id),
                terminal,
                commits,
                self.config.sync.max_commits_per_transfer,
                &cancel,
            )
            .await?;
            let saved = self.store.save_commits(repo, &ingested.entries).await?;
            let update = self.store.save_heads(repo, &heads).await?;
            tracing::info!(
                repo = %repo,
                saved,
                heads_added = update.added.len(),
                "upload accepted"
            );
            saved > 0 || update.is_changed()
        };

        if changed {
            self.push_to_masters(repo).await;
        }
        Ok(())
    }

    async fn save_heads(
        &self,
        repo: &RepoId,
        heads: Vec<Signed<RawCommitHead>>,
    ) -> otgraph_sync::Result<()> {
        check_repo(repo)?;
        check_heads_len(&heads)?;
        let heads = verify_heads(repo, heads)?;

        let update = {
            let _guard = self.namespaces.lock(repo).await;
            self.store.save_heads(repo, &heads).await?
        };
        if !update.ignored.is_empty() {
            tracing::debug!(repo = %repo, ignored = update.ignored.len(), "stale heads ignored");
        }
        if update.is_changed() {
            self.push_to_masters(repo).await;
        }
        Ok(())
    }

    async fn get_heads(&self, repo: &RepoId) -> otgraph_sync::Result<Vec<Signed<RawCommitHead>>> {
        Ok(self.store.get_heads(repo).await?)
    }

    async fn poll_heads(&self, repo: &RepoId) -> otgraph_sync::Result<Vec<Signed<RawCommitHead>>> {
        self.get_heads(repo).await
    }

    async fn save_snapshot(&self, snapshot: Signed<RawSnapshot>) -> otgraph_sync::Result<()> {
        check_repo(&snapshot.value.repo)?;
        let snapshot = snapshot
            .into_verified()
            .map_err(|e| SyncError::from(ValidationError::from(e)))?;
        if self.store.save_snapshot(&snapshot).await? {
            tracing::debug!(repo = %snapshot.repo, commit = %snapshot.commit_id, "snapshot saved");
        }
        Ok(())
    }

    async fn load_snapshot(
        &self,
        repo: &RepoId,
        id: &CommitId,
    ) -> otgraph_sync::Result<Option<Signed<RawSnapshot>>> {
        Ok(self.store.load_snapshot(repo, id).await?)
    }

    async fn list_snapshots(
        &self,
        repo: &RepoId,
        known: BTreeSet<CommitId>,
    ) -> otgraph_sync::Result<BTreeSet<CommitId>> {
        let stored = self.store.list_snapshots(repo).await?;
        Ok(stored.difference(&known).copied().collect())
    }

    async fn send_pull_request(&self, request: Signed<RawPullRequest>) -> otgraph_sync::Result<()> {
        check_repo(&request.value.repo)?;
        check_repo(&request.value.fork)?;
        let request = request
            .into_verified()
            .map_err(|e| SyncError::from(ValidationError::from(e)))?;
        self.store.save_pull_request(&request).await?;
        Ok(())
    }

    async fn get_pull_requests(
        &self,
        owner: &Ed25519PublicKey,
    ) -> otgraph_sync::Result<Vec<Signed<RawPullRequest>>> {
        Ok(self.store.get_pull_requests(owner).await?)
    }
}
