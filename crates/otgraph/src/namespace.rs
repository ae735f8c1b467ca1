//! Per-repository serialization and node roles.

use std::collections::HashMap;
use std::sync::Arc;

use otgraph_core::RepoId;
use otgraph_sync::{NodeId, Peer};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Whether this node is authoritative for a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Listed as a master by discovery; never pushes on its own.
    Master,
    /// Pushes accepted writes to the masters.
    Replica,
}

impl NodeRole {
    /// Role of `node` given the masters discovery returned.
    pub fn of(node: &NodeId, masters: &[Peer]) -> Self {
        if masters.iter().any(|peer| peer.id == *node) {
            NodeRole::Master
        } else {
            NodeRole::Replica
        }
    }

    pub fn is_master(self) -> bool {
        self == NodeRole::Master
    }
}

/// One async lock per repository.
///
/// Every operation that writes commits or heads for a repository holds its
/// lock, so at most one save-then-heads sequence runs per repository and
/// readers only ever see heads from a completed one.
#[derive(Debug, Default)]
pub struct NamespaceTable {
    locks: Mutex<HashMap<RepoId, Arc<Mutex<()>>>>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `repo`.
    pub async fn lock(&self, repo: &RepoId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(repo.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of repositories currently locked or waited on.
    pub async fn active(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
