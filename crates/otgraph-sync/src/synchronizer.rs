//! Repository synchronization with remote nodes.
//!
//! Pulls missing commits and heads from peers, pushes local ones to them,
//! and copies snapshots. Every transfer is validated in full before
//! anything is written, commits are saved before heads, and a failed or
//! cancelled transfer leaves the store untouched.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use otgraph_core::{CommitId, RawCommitHead, RepoId, ValidationError, Verified};
use otgraph_store::{HeadsUpdate, Store, StoreExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::ingest::{cancellable, ingest_commits, verify_heads};
use crate::merger::merge_streams;
use crate::peer::Peer;
use crate::walk::walk_commits;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum commits read from one transfer.
    pub max_commits_per_transfer: usize,
    /// Whether [`Synchronizer::sync`] also copies snapshots.
    pub sync_snapshots: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_commits_per_transfer: 1_000_000,
            sync_snapshots: true,
        }
    }
}

/// Result of pulling from one or more peers.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// New commits stored.
    pub received: usize,
    /// Commits the peers re-sent that were already stored.
    pub skipped: usize,
    /// Commits the peers gained after their heads were read. Left for the
    /// next fetch.
    pub ignored: usize,
    /// Peers that answered.
    pub peers: usize,
    /// How the remote heads were applied.
    pub heads: HeadsUpdate,
}

/// Result of pushing to a peer.
#[derive(Debug, Clone, Default)]
pub struct PushReport {
    /// Commits streamed to the peer.
    pub sent: usize,
    /// Whether the peer already had everything.
    pub up_to_date: bool,
    /// Set when the peer had heads unknown locally and was fetched first.
    pub fetched_first: Option<FetchReport>,
}

/// Result of a full sync with a peer.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub fetch: FetchReport,
    pub push: PushReport,
    /// Snapshots copied from the peer.
    pub snapshots: usize,
}

/// Drives fetch and push for repositories of one local store.
///
/// The synchronizer does not serialize operations on a repository; callers
/// that share a store run at most one operation per repository at a time.
pub struct Synchronizer<S: Store + ?Sized> {
    store: Arc<S>,
    config: SyncConfig,
}

impl<S: Store + ?Sized + 'static> Synchronizer<S> {
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Pull missing commits and heads of `repo` from `peer`.
    pub async fn fetch(
        &self,
        repo: &RepoId,
        peer: &Peer,
        cancel: &CancellationToken,
    ) -> Result<FetchReport> {
        self.fetch_all(repo, std::slice::from_ref(peer), cancel)
            .await
    }

    /// Pull from several peers at once, merging their streams.
    ///
    /// Peers whose heads cannot be read or verified are skipped. Once the
    /// streams are open, any failure aborts the whole fetch.
    pub async fn fetch_all(
        &self,
        repo: &RepoId,
        peers: &[Peer],
        cancel: &CancellationToken,
    ) -> Result<FetchReport> {
        // Phase 1: Collect and verify remote heads
        let mut heads: Vec<Verified<RawCommitHead>> = Vec::new();
        let mut live: Vec<&Peer> = Vec::new();
        let mut last_error = None;
        for peer in peers {
            let remote = cancellable(cancel, peer.node.get_heads(repo))
                .await?
                .and_then(|signed| verify_heads(repo, signed));
            match remote {
                Ok(verified) => {
                    heads.extend(verified);
                    live.push(peer);
                }
                Err(e) => {
                    tracing::warn!(repo = %repo, peer = %peer.id, error = %e, "skipping peer");
                    last_error = Some(e);
                }
            }
        }
        if live.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                SyncError::PeerUnavailable(format!("no peers to fetch {repo} from"))
            }));
        }

        let mut report = FetchReport {
            peers: live.len(),
            ..FetchReport::default()
        };
        let head_ids: BTreeSet<CommitId> = heads.iter().map(|h| h.commit_id).collect();
        let missing = self
            .store
            .missing_commits(repo, &head_ids.iter().copied().collect::<Vec<_>>())
            .await?;

        // Phase 2: Download and validate everything we lack
        if !missing.is_empty() {
            let start_nodes = self.store.frontier(repo).await?;
            let mut streams = Vec::with_capacity(live.len());
            for peer in &live {
                streams.push(
                    cancellable(cancel, peer.node.download(repo, start_nodes.clone())).await??,
                );
            }

            let ingested = ingest_commits(
                self.store.as_ref(),
                repo,
                head_ids.iter().copied(),
                start_nodes,
                merge_streams(streams),
                self.config.max_commits_per_transfer,
                cancel,
            )
            .await?;

            // Phase 3: Persist commits
            report.received = self.store.save_commits(repo, &ingested.entries).await?;
            report.skipped = ingested.skipped;
            report.ignored = ingested.ignored;
        }

        // Phase 4: Persist heads
        report.heads = self.store.save_heads(repo, &heads).await?;

        tracing::info!(
            repo = %repo,
            peers = report.peers,
            received = report.received,
            heads_added = report.heads.added.len(),
            "fetch complete"
        );
        Ok(report)
    }

    /// Push local commits and heads of `repo` to `peer`.
    ///
    /// If the peer has heads unknown locally, they are fetched first so the
    /// push is a fast-forward from the peer's point of view.
    pub async fn push(
        &self,
        repo: &RepoId,
        peer: &Peer,
        cancel: &CancellationToken,
    ) -> Result<PushReport> {
        let mut report = PushReport::default();

        // Phase 1: Learn what the peer has
        let remote = verify_heads(
            repo,
            cancellable(cancel, peer.node.get_heads(repo)).await??,
        )?;
        let remote_ids: Vec<CommitId> = remote.iter().map(|h| h.commit_id).collect();

        // Phase 2: Catch up first if the peer is ahead somewhere
        if !self.store.missing_commits(repo, &remote_ids).await?.is_empty() {
            tracing::debug!(repo = %repo, peer = %peer.id, "peer has unknown heads, fetching first");
            report.fetched_first = Some(self.fetch(repo, peer, cancel).await?);
        }

        // Phase 3: Decide whether anything needs sending
        let local = self.store.get_heads(repo).await?;
        let remote_set: BTreeSet<CommitId> = remote_ids.iter().copied().collect();
        if local.iter().all(|h| remote_set.contains(&h.value.commit_id)) {
            report.up_to_date = true;
            return Ok(report);
        }

        // Phase 4: Stream the difference
        let mut known = remote_set;
        if known.is_empty() {
            known.insert(CommitId::ROOT);
        }
        let local_ids: Vec<CommitId> = local.iter().map(|h| h.value.commit_id).collect();
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = sent.clone();
        let commits = walk_commits(self.store.clone(), repo.clone(), local_ids, known)
            .inspect(move |entry| {
                if entry.is_ok() {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
            .boxed();

        cancellable(cancel, peer.node.upload(repo, local, commits)).await??;
        report.sent = sent.load(Ordering::Relaxed);

        tracing::info!(repo = %repo, peer = %peer.id, sent = report.sent, "push complete");
        Ok(report)
    }

    /// Fetch, then push, then copy snapshots if configured.
    pub async fn sync(
        &self,
        repo: &RepoId,
        peer: &Peer,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let fetch = self.fetch(repo, peer, cancel).await?;
        let push = self.push(repo, peer, cancel).await?;
        let snapshots = if self.config.sync_snapshots {
            self.fetch_snapshots(repo, peer, cancel).await?
        } else {
            0
        };
        Ok(SyncReport {
            fetch,
            push,
            snapshots,
        })
    }

    /// Copy snapshots the peer has and we lack. Returns how many were stored.
    pub async fn fetch_snapshots(
        &self,
        repo: &RepoId,
        peer: &Peer,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let local = self.store.list_snapshots(repo).await?;
        let missing = cancellable(cancel, peer.node.list_snapshots(repo, local)).await??;

        let mut saved = 0;
        for id in missing {
            let Some(snapshot) =
                cancellable(cancel, peer.node.load_snapshot(repo, &id)).await??
            else {
                continue;
            };
            if snapshot.value.repo != *repo || snapshot.value.commit_id != id {
                return Err(ValidationError::StructuralError(format!(
                    "peer {} answered snapshot {id} with another record",
                    peer.id
                ))
                .into());
            }
            let verified = snapshot
                .into_verified()
                .map_err(|e| SyncError::from(ValidationError::from(e)))?;
            if self.store.save_snapshot(&verified).await? {
                saved += 1;
            }
        }

        if saved > 0 {
            tracing::debug!(repo = %repo, peer = %peer.id, saved, "snapshots copied");
        }
        Ok(saved)
    }
}
