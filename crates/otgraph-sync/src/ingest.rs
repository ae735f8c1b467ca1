//! Receiving side of a transfer: verify heads, validate a commit stream.

use std::collections::BTreeSet;
use std::future::Future;

use futures::StreamExt;
use otgraph_core::{
    CommitEntry, CommitId, RawCommitHead, RepoId, Signed, StreamValidator, ValidationError,
    Verified,
};
use otgraph_store::Store;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::protocol::CommitStream;

/// Commits accepted from one stream, not yet stored.
#[derive(Debug, Default)]
pub struct Ingested {
    /// Validated entries in stream order.
    pub entries: Vec<CommitEntry>,
    /// Entries skipped because they were already stored.
    pub skipped: usize,
    /// Entries outside the history of the declared heads, dropped unstored.
    pub ignored: usize,
}

/// Verify signed heads for `repo`.
///
/// Every head must name `repo` and carry a valid signature by its owner.
pub fn verify_heads(
    repo: &RepoId,
    heads: Vec<Signed<RawCommitHead>>,
) -> Result<Vec<Verified<RawCommitHead>>> {
    heads
        .into_iter()
        .map(|head| {
            if head.value.repo != *repo {
                return Err(SyncError::from(ValidationError::StructuralError(
                    format!("head for {} offered for {repo}", head.value.repo),
                )));
            }
            head.into_verified()
                .map_err(|e| SyncError::from(ValidationError::from(e)))
        })
        .collect()
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Validate `commits` against `heads` down to `terminal`.
///
/// Parents and heads the store already holds are retired from the
/// validator, and entries the store already holds are skipped. Entries that
/// sort above everything still expected cannot belong to the declared
/// history (the sender's heads moved on after they were read) and are
/// dropped. Reading stops as soon as nothing more is expected, which drops
/// the stream and stops the sender.
///
/// Nothing is written: the caller persists [`Ingested::entries`] and then
/// the heads, and drops everything if this fails. At most `limit` entries
/// are read.
pub async fn ingest_commits<S>(
    store: &S,
    repo: &RepoId,
    heads: impl IntoIterator<Item = CommitId>,
    terminal: BTreeSet<CommitId>,
    mut commits: CommitStream,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Ingested>
where
    S: Store + ?Sized,
{
    let heads: Vec<CommitId> = heads.into_iter().collect();
    let mut validator = StreamValidator::new(heads.iter().copied(), terminal);
    for id in &heads {
        if store.has_commit(repo, id).await? {
            validator.mark_known(id);
        }
    }

    let mut ingested = Ingested::default();
    let mut read = 0;
    while let Some(&want) = validator.next_expected() {
        let Some(next) = cancellable(cancel, commits.next()).await? else {
            break;
        };
        let entry = next?;

        read += 1;
        if read > limit {
            return Err(SyncError::TransferTooLarge { limit });
        }

        if entry.id != want {
            if store.has_commit(repo, &entry.id).await? {
                ingested.skipped += 1;
                continue;
            }
            // Above every expected id, so outside the declared history.
            if entry.id < want {
                ingested.ignored += 1;
                continue;
            }
        }

        let newly_expected = validator.accept(&entry)?;
        for parent in newly_expected {
            if store.has_commit(repo, &parent).await? {
                validator.mark_known(&parent);
            }
        }
        ingested.entries.push(entry);
    }
    drop(commits);

    validator.finish()?;
    tracing::debug!(
        repo = %repo,
        accepted = ingested.entries.len(),
        skipped = ingested.skipped,
        ignored = ingested.ignored,
        "commit stream validated"
    );
    Ok(ingested)
}
