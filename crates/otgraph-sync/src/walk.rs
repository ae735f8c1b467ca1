//! Lazy graph walk that answers a download.
//!
//! The walk keeps a frontier of ids ordered highest first, each tagged with
//! whether the requester already has it. Ids reachable from a known id are
//! known too, and because parents always sort after their children, a
//! known tag always reaches an id before the id is popped. The walk ends as
//! soon as only known ids remain, so it never touches history the requester
//! already has (as long as the start nodes are stored here).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use otgraph_core::{CommitEntry, CommitId, RepoId};
use otgraph_store::Store;

use crate::error::SyncError;
use crate::protocol::CommitStream;

struct WalkState<S: ?Sized> {
    store: Arc<S>,
    repo: RepoId,
    /// id -> known by the requester
    frontier: BTreeMap<CommitId, bool>,
    unknown: usize,
}

impl<S: ?Sized> WalkState<S> {
    fn insert(&mut self, id: CommitId, known: bool) {
        if id.is_root() {
            return;
        }
        match self.frontier.get_mut(&id) {
            Some(slot) => {
                if known && !*slot {
                    *slot = true;
                    self.unknown -= 1;
                }
            }
            None => {
                self.frontier.insert(id, known);
                if !known {
                    self.unknown += 1;
                }
            }
        }
    }
}

/// Stream every commit reachable from `heads` and not reachable from `known`.
///
/// Commits are produced one at a time as the consumer polls, highest
/// [`CommitId`] first. Known ids that are not stored locally simply stop the
/// walk along that path without propagating further.
pub fn walk_commits<S>(
    store: Arc<S>,
    repo: RepoId,
    heads: impl IntoIterator<Item = CommitId>,
    known: impl IntoIterator<Item = CommitId>,
) -> CommitStream
where
    S: Store + ?Sized + 'static,
{
    let mut state = WalkState {
        store,
        repo,
        frontier: BTreeMap::new(),
        unknown: 0,
    };
    for id in known {
        state.insert(id, true);
    }
    for id in heads {
        state.insert(id, false);
    }

    stream::try_unfold(state, |mut state| async move {
        while state.unknown > 0 {
            let Some((id, known)) = state.frontier.pop_first() else {
                break;
            };
            if !known {
                state.unknown -= 1;
            }

            let commit = state.store.load_commit(&state.repo, &id).await?;
            let Some(commit) = commit else {
                if known {
                    continue;
                }
                return Err(SyncError::MissingCommit(id));
            };

            for parent in &commit.parents {
                state.insert(*parent, known);
            }

            if !known {
                tracing::trace!(repo = %state.repo, commit = %id, "walk emits commit");
                return Ok(Some((CommitEntry::new(id, commit), state)));
            }
        }
        Ok::<_, SyncError>(None)
    })
    .boxed()
}

/// Collect a walk into memory. Convenient for small transfers and tests.
pub async fn collect_walk(mut commits: CommitStream) -> Result<Vec<CommitEntry>, SyncError> {
    let mut out = Vec::new();
    while let Some(entry) = commits.next().await {
        out.push(entry?);
    }
    Ok(out)
}

/// Ids of a set of entries, for assertions and logging.
pub fn entry_ids(entries: &[CommitEntry]) -> BTreeSet<CommitId> {
    entries.iter().map(|e| e.id).collect()
}
