//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use otgraph_core::{
    CommitEntry, CommitId, Ed25519PublicKey, RawCommit, RawCommitHead, RawPullRequest,
    RawSnapshot, RepoId, Signed, Verified,
};

use crate::error::{Result, StoreError};
use crate::traits::{ensure_repo, HeadsUpdate, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    repos: BTreeMap<RepoId, RepoState>,

    /// Pull requests keyed by the owner of the target repository.
    pull_requests: HashMap<Ed25519PublicKey, BTreeMap<RawPullRequest, Signed<RawPullRequest>>>,
}

#[derive(Default)]
struct RepoState {
    commits: HashMap<CommitId, RawCommit>,

    /// Parent index: parent -> children.
    children: HashMap<CommitId, BTreeSet<CommitId>>,

    heads: BTreeMap<CommitId, Signed<RawCommitHead>>,
    snapshots: BTreeMap<CommitId, Signed<RawSnapshot>>,
}

impl RepoState {
    fn has_commit(&self, id: &CommitId) -> bool {
        id.is_root() || self.commits.contains_key(id)
    }

    fn has_children(&self, id: &CommitId) -> bool {
        self.children.get(id).is_some_and(|c| !c.is_empty())
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_repos(&self, owner: &Ed25519PublicKey) -> Result<BTreeSet<String>> {
        let inner = self.read()?;
        Ok(inner
            .repos
            .keys()
            .filter(|repo| repo.owner == *owner)
            .map(|repo| repo.name.clone())
            .collect())
    }

    async fn save_commits(&self, repo: &RepoId, entries: &[CommitEntry]) -> Result<usize> {
        let mut inner = self.write()?;
        let state = inner.repos.entry(repo.clone()).or_default();

        let mut inserted = 0;
        for entry in entries {
            if state.commits.contains_key(&entry.id) {
                continue;
            }
            for parent in &entry.commit.parents {
                state.children.entry(*parent).or_default().insert(entry.id);
            }
            state.commits.insert(entry.id, entry.commit.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn load_commit(&self, repo: &RepoId, id: &CommitId) -> Result<Option<RawCommit>> {
        let inner = self.read()?;
        Ok(inner
            .repos
            .get(repo)
            .and_then(|state| state.commits.get(id))
            .cloned())
    }

    async fn has_commit(&self, repo: &RepoId, id: &CommitId) -> Result<bool> {
        if id.is_root() {
            return Ok(true);
        }
        let inner = self.read()?;
        Ok(inner.repos.get(repo).is_some_and(|state| state.has_commit(id)))
    }

    async fn get_heads(&self, repo: &RepoId) -> Result<Vec<Signed<RawCommitHead>>> {
        let inner = self.read()?;
        Ok(inner
            .repos
            .get(repo)
            .map(|state| state.heads.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_heads(
        &self,
        repo: &RepoId,
        heads: &[Verified<RawCommitHead>],
    ) -> Result<HeadsUpdate> {
        for head in heads {
            ensure_repo(repo, &head.repo)?;
        }

        let mut inner = self.write()?;
        let state = inner.repos.entry(repo.clone()).or_default();
        let mut update = HeadsUpdate::default();

        for head in heads {
            let id = head.commit_id;
            let stale = !state.has_commit(&id)
                || state.has_children(&id)
                || state
                    .heads
                    .get(&id)
                    .is_some_and(|existing| existing.value.timestamp >= head.timestamp);
            if stale {
                update.ignored.push(id);
                continue;
            }
            state.heads.insert(id, head.signed().clone());
            update.added.push(id);
        }

        let superseded: Vec<CommitId> = state
            .heads
            .keys()
            .filter(|id| state.has_children(id))
            .copied()
            .collect();
        for id in superseded {
            state.heads.remove(&id);
            update.removed.push(id);
        }

        Ok(update)
    }

    async fn save_snapshot(&self, snapshot: &Verified<RawSnapshot>) -> Result<bool> {
        let mut inner = self.write()?;
        let state = inner.repos.entry(snapshot.repo.clone()).or_default();
        if state.snapshots.contains_key(&snapshot.commit_id) {
            return Ok(false);
        }
        state
            .snapshots
            .insert(snapshot.commit_id, snapshot.signed().clone());
        Ok(true)
    }

    async fn load_snapshot(
        &self,
        repo: &RepoId,
        id: &CommitId,
    ) -> Result<Option<Signed<RawSnapshot>>> {
        let inner = self.read()?;
        Ok(inner
            .repos
            .get(repo)
            .and_then(|state| state.snapshots.get(id))
            .cloned())
    }

    async fn list_snapshots(&self, repo: &RepoId) -> Result<BTreeSet<CommitId>> {
        let inner = self.read()?;
        Ok(inner
            .repos
            .get(repo)
            .map(|state| state.snapshots.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn save_pull_request(&self, request: &Verified<RawPullRequest>) -> Result<bool> {
        let mut inner = self.write()?;
        let requests = inner
            .pull_requests
            .entry(request.repo.owner)
            .or_default();
        if requests.contains_key(request.value()) {
            return Ok(false);
        }
        requests.insert(request.value().clone(), request.signed().clone());
        Ok(true)
    }

    async fn get_pull_requests(
        &self,
        owner: &Ed25519PublicKey,
    ) -> Result<Vec<Signed<RawPullRequest>>> {
        let inner = self.read()?;
        Ok(inner
            .pull_requests
            .get(owner)
            .map(|requests| requests.values().cloned().collect())
            .unwrap_or_default())
    }
}
