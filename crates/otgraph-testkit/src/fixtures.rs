//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};

use futures::stream::{self, StreamExt};
use otgraph_core::{
    CommitEntry, CommitId, Ed25519PublicKey, Keypair, RawCommit, RawCommitHead, RawPullRequest,
    RawSnapshot, RepoId, Signed,
};
use otgraph_keys::SimKey;
use otgraph_sync::CommitStream;

/// Base timestamp for fixture clocks (2023-11-14T22:13:20Z).
const BASE_TIMESTAMP: i64 = 1_700_000_000_000;

/// A repository owner with a payload key and a default repository.
pub struct TestFixture {
    pub keypair: Keypair,
    pub sim_key: SimKey,
    pub repo: RepoId,
    clock: AtomicI64,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair and key.
    pub fn new() -> Self {
        Self::from_parts(Keypair::generate(), SimKey::generate())
    }

    /// Create with a deterministic keypair and key from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::from_parts(Keypair::from_seed(&seed), SimKey::from_bytes(seed))
    }

    fn from_parts(keypair: Keypair, sim_key: SimKey) -> Self {
        let repo = RepoId::new(keypair.public_key(), "test-repo");
        Self {
            keypair,
            sim_key,
            repo,
            clock: AtomicI64::new(BASE_TIMESTAMP),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Another repository of the same owner.
    pub fn repo_named(&self, name: &str) -> RepoId {
        RepoId::new(self.keypair.public_key(), name)
    }

    /// Next timestamp of the fixture clock. Strictly increasing.
    pub fn tick(&self) -> i64 {
        self.clock.fetch_add(1_000, Ordering::Relaxed) + 1_000
    }

    /// Create a commit sealing `payload` under the fixture key.
    pub fn commit(&self, parents: &[CommitId], payload: &[u8]) -> CommitEntry {
        let encrypted = self
            .sim_key
            .encrypt(payload)
            .expect("encryption with a valid key");
        RawCommit::new(
            0,
            parents.iter().copied().collect(),
            encrypted,
            self.sim_key.hash(),
            self.tick(),
        )
        .into_entry()
        .expect("parents below the top level")
    }

    /// Sign a head of the default repository.
    pub fn head(&self, id: CommitId) -> Signed<RawCommitHead> {
        self.head_for(&self.repo, id)
    }

    /// Sign a head of `repo`.
    pub fn head_for(&self, repo: &RepoId, id: CommitId) -> Signed<RawCommitHead> {
        Signed::sign(RawCommitHead::new(repo.clone(), id, self.tick()), &self.keypair)
    }

    /// Sign heads of the default repository.
    pub fn heads(&self, ids: impl IntoIterator<Item = CommitId>) -> Vec<Signed<RawCommitHead>> {
        ids.into_iter().map(|id| self.head(id)).collect()
    }

    /// Sign a snapshot of the default repository holding `state`.
    pub fn snapshot(&self, id: CommitId, state: &[u8]) -> Signed<RawSnapshot> {
        let encrypted_diffs = self
            .sim_key
            .encrypt(state)
            .expect("encryption with a valid key");
        Signed::sign(
            RawSnapshot {
                repo: self.repo.clone(),
                commit_id: id,
                encrypted_diffs,
                sim_key_hash: self.sim_key.hash(),
            },
            &self.keypair,
        )
    }

    /// Ask `target` to merge this fixture's default repository.
    pub fn pull_request(&self, target: &RepoId) -> Signed<RawPullRequest> {
        Signed::sign(
            RawPullRequest {
                repo: target.clone(),
                fork: self.repo.clone(),
            },
            &self.keypair,
        )
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a commit DAG for one fixture and tracks its tips.
pub struct GraphBuilder<'a> {
    fixture: &'a TestFixture,
    entries: BTreeMap<CommitId, CommitEntry>,
    heads: BTreeSet<CommitId>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(fixture: &'a TestFixture) -> Self {
        Self {
            fixture,
            entries: BTreeMap::new(),
            heads: BTreeSet::new(),
        }
    }

    /// Add a commit with the given parents and return its id.
    pub fn commit(&mut self, parents: &[CommitId]) -> CommitId {
        let payload = format!("commit {}", self.entries.len());
        let entry = self.fixture.commit(parents, payload.as_bytes());
        let id = entry.id;
        for parent in parents {
            self.heads.remove(parent);
        }
        self.heads.insert(id);
        self.entries.insert(id, entry);
        id
    }

    /// Add `len` commits, each on top of the previous one. Returns their ids
    /// oldest first.
    pub fn chain(&mut self, from: CommitId, len: usize) -> Vec<CommitId> {
        let mut ids = Vec::with_capacity(len);
        let mut parent = from;
        for _ in 0..len {
            parent = self.commit(&[parent]);
            ids.push(parent);
        }
        ids
    }

    /// Ids no built commit extends.
    pub fn heads(&self) -> BTreeSet<CommitId> {
        self.heads.clone()
    }

    /// Signed heads for [`GraphBuilder::heads`].
    pub fn signed_heads(&self) -> Vec<Signed<RawCommitHead>> {
        self.fixture.heads(self.heads.iter().copied())
    }

    pub fn get(&self, id: &CommitId) -> Option<&CommitEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All commits, highest id first.
    pub fn entries(&self) -> Vec<CommitEntry> {
        self.entries.values().cloned().collect()
    }

    /// All commits keyed by id, as `NodeProtocol::save` takes them.
    pub fn commits(&self) -> BTreeMap<CommitId, RawCommit> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.commit.clone()))
            .collect()
    }

    /// The named commits keyed by id. Unknown ids are left out.
    pub fn subset(
        &self,
        ids: impl IntoIterator<Item = CommitId>,
    ) -> BTreeMap<CommitId, RawCommit> {
        ids.into_iter()
            .filter_map(|id| self.entries.get(&id).map(|e| (id, e.commit.clone())))
            .collect()
    }

    /// All commits as a sorted stream.
    pub fn stream(&self) -> CommitStream {
        commit_stream(self.entries())
    }
}

/// Sort entries highest id first and serve them as a [`CommitStream`].
pub fn commit_stream(entries: impl IntoIterator<Item = CommitEntry>) -> CommitStream {
    let mut entries: Vec<CommitEntry> = entries.into_iter().collect();
    entries.sort();
    stream::iter(entries.into_iter().map(Ok)).boxed()
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[31] = 0xa5;
            TestFixture::with_seed(seed)
        })
        .collect()
}
