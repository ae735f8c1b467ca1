//! Validation of untrusted commit streams.
//!
//! A peer answering a download sends commits newest first. The
//! [`StreamValidator`] checks each entry as it arrives and keeps only the open
//! ancestor frontier in memory, so a stream is accepted only if it is a
//! closed subgraph from the declared heads down to ids the receiver already
//! knows.

use std::collections::BTreeSet;

use crate::commit::CommitEntry;
use crate::error::ValidationError;
use crate::types::CommitId;

/// Check that an entry's claimed id matches its content.
pub fn verify_entry(entry: &CommitEntry) -> Result<(), ValidationError> {
    // The root is never transferred.
    if entry.id.is_root() {
        return Err(ValidationError::StructuralError(
            "root commit cannot be transferred".into(),
        ));
    }
    if entry.commit.parents.is_empty() {
        return Err(ValidationError::StructuralError(format!(
            "commit {} has no parents",
            entry.id
        )));
    }

    let computed = entry.commit.compute_id()?;
    if computed != entry.id {
        return Err(ValidationError::CommitIdMismatch {
            claimed: entry.id,
            computed,
        });
    }
    Ok(())
}

/// Online validator for one incoming commit stream.
#[derive(Debug, Clone)]
pub struct StreamValidator {
    /// Ids that must still arrive, highest level first.
    expected: BTreeSet<CommitId>,

    /// Ids the receiver already has. The stream stops at these.
    terminal: BTreeSet<CommitId>,

    accepted: usize,
}

impl StreamValidator {
    /// Create a validator for a stream from `heads` down to `terminal`.
    ///
    /// Heads that are already terminal (or the root) are not expected.
    pub fn new(
        heads: impl IntoIterator<Item = CommitId>,
        terminal: impl IntoIterator<Item = CommitId>,
    ) -> Self {
        let terminal: BTreeSet<CommitId> = terminal.into_iter().collect();
        let expected = heads
            .into_iter()
            .filter(|id| !id.is_root() && !terminal.contains(id))
            .collect();

        Self {
            expected,
            terminal,
            accepted: 0,
        }
    }

    /// The next id the stream must deliver.
    pub fn next_expected(&self) -> Option<&CommitId> {
        self.expected.first()
    }

    /// Whether nothing more is expected.
    pub fn is_complete(&self) -> bool {
        self.expected.is_empty()
    }

    /// Number of entries accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Retire an expected id the receiver turned out to already hold.
    ///
    /// Returns `true` if the id was expected.
    pub fn mark_known(&mut self, id: &CommitId) -> bool {
        self.terminal.insert(*id);
        self.expected.remove(id)
    }

    /// Validate the next entry of the stream.
    ///
    /// On success returns the parents that became newly expected, so the
    /// caller can check them against local storage and call
    /// [`StreamValidator::mark_known`].
    pub fn accept(&mut self, entry: &CommitEntry) -> Result<Vec<CommitId>, ValidationError> {
        // 1. Take the highest expected id
        let want = match self.expected.pop_first() {
            Some(want) => want,
            // 2. Nothing was expected: the stream overran the frontier
            None => {
                return Err(ValidationError::UnexpectedCommit {
                    expected: None,
                    got: entry.id,
                })
            }
        };

        // 3. Must be exactly the id we wanted
        if entry.id != want {
            return Err(ValidationError::UnexpectedCommit {
                expected: Some(want),
                got: entry.id,
            });
        }

        // 4. Content must hash to the claimed id, level included
        verify_entry(entry)?;

        // 5. Every non-terminal parent must follow
        let mut newly_expected = Vec::new();
        for parent in &entry.commit.parents {
            if parent.is_root() || self.terminal.contains(parent) {
                continue;
            }
            if self.expected.insert(*parent) {
                newly_expected.push(*parent);
            }
        }

        self.accepted += 1;
        Ok(newly_expected)
    }

    /// Close the stream. Fails if an ancestor never arrived.
    pub fn finish(self) -> Result<usize, ValidationError> {
        match self.expected.first() {
            Some(missing) => Err(ValidationError::UnexpectedEndOfStream { missing: *missing }),
            None => Ok(self.accepted),
        }
    }
}
