//! K-way merge of commit streams from several peers.
//!
//! Each source is sorted highest [`CommitId`] first. The merger keeps one
//! pending entry per source in a min-heap and always emits the smallest id,
//! dropping ids it has just emitted, so the output is sorted and free of
//! duplicates. Memory is bounded by the number of sources.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use otgraph_core::{CommitEntry, CommitId};

use crate::error::{Result, SyncError};
use crate::protocol::CommitStream;

struct MergeState {
    sources: Vec<CommitStream>,
    /// Last id taken from each source, to reject unsorted input.
    last_taken: Vec<Option<CommitId>>,
    heap: BinaryHeap<Reverse<(CommitEntry, usize)>>,
    last_emitted: Option<CommitId>,
    primed: bool,
}

impl MergeState {
    fn push(&mut self, source: usize, entry: CommitEntry) -> Result<()> {
        if let Some(prev) = self.last_taken[source] {
            if entry.id <= prev {
                return Err(SyncError::InvalidMessage(format!(
                    "source {source} sent {} after {prev}",
                    entry.id
                )));
            }
        }
        self.last_taken[source] = Some(entry.id);
        self.heap.push(Reverse((entry, source)));
        Ok(())
    }

    async fn prime(&mut self) -> Result<()> {
        let firsts = join_all(self.sources.iter_mut().map(|s| s.next())).await;
        for (source, first) in firsts.into_iter().enumerate() {
            if let Some(entry) = first {
                self.push(source, entry?)?;
            }
        }
        self.primed = true;
        Ok(())
    }

    async fn refill(&mut self, source: usize) -> Result<()> {
        if let Some(entry) = self.sources[source].next().await {
            self.push(source, entry?)?;
        }
        Ok(())
    }
}

/// Merge sorted commit streams into one sorted stream without duplicates.
///
/// The first error from any source ends the merged stream. Dropping the
/// merged stream drops (and so closes) every source.
pub fn merge_streams(sources: Vec<CommitStream>) -> CommitStream {
    let state = MergeState {
        last_taken: vec![None; sources.len()],
        sources,
        heap: BinaryHeap::new(),
        last_emitted: None,
        primed: false,
    };

    stream::try_unfold(state, |mut state| async move {
        if !state.primed {
            state.prime().await?;
        }
        while let Some(Reverse((entry, source))) = state.heap.pop() {
            state.refill(source).await?;
            if state.last_emitted == Some(entry.id) {
                continue;
            }
            state.last_emitted = Some(entry.id);
            return Ok(Some((entry, state)));
        }
        Ok::<_, SyncError>(None)
    })
    .boxed()
}
