//! Proptest generators for property-based testing.

use std::collections::BTreeSet;

use proptest::prelude::*;

use otgraph_core::{CommitEntry, CommitId, Ed25519PublicKey, Keypair, RepoId, Sha256Hash};

use crate::fixtures::TestFixture;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Ed25519PublicKey.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a non-root CommitId.
pub fn commit_id() -> impl Strategy<Value = CommitId> {
    (2u64..=u64::MAX, any::<[u8; 32]>())
        .prop_map(|(level, hash)| CommitId::new(level, Sha256Hash(hash)))
}

/// Generate a repository name.
pub fn repo_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,31}".prop_map(String::from)
}

/// Generate a RepoId.
pub fn repo_id() -> impl Strategy<Value = RepoId> {
    (public_key(), repo_name()).prop_map(|(owner, name)| RepoId::new(owner, name))
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// The shape of a commit DAG, independent of content.
///
/// Node `i` lists its parents as indices into `0..=i`, where `0` is the
/// root and `k` is node `k - 1`. Every shape is therefore acyclic.
#[derive(Debug, Clone)]
pub struct DagShape {
    pub parents: Vec<BTreeSet<usize>>,
}

impl DagShape {
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

impl Arbitrary for DagShape {
    type Parameters = usize;
    type Strategy = BoxedStrategy<Self>;

    /// `max_nodes` of zero means the default of 24.
    fn arbitrary_with(max_nodes: Self::Parameters) -> Self::Strategy {
        let max_nodes = if max_nodes == 0 { 24 } else { max_nodes };
        (1..=max_nodes)
            .prop_flat_map(|n| {
                (0..n)
                    .map(|i| prop::collection::btree_set(0..=i, 1..=2))
                    .collect::<Vec<_>>()
            })
            .prop_map(|parents| DagShape { parents })
            .boxed()
    }
}

/// Build the commits of `shape` for `fixture`, in creation order.
pub fn build_dag(fixture: &TestFixture, shape: &DagShape) -> Vec<CommitEntry> {
    let mut entries: Vec<CommitEntry> = Vec::with_capacity(shape.len());
    for (i, parents) in shape.parents.iter().enumerate() {
        let parent_ids: Vec<CommitId> = parents
            .iter()
            .map(|&p| if p == 0 { CommitId::ROOT } else { entries[p - 1].id })
            .collect();
        entries.push(fixture.commit(&parent_ids, format!("node {i}").as_bytes()));
    }
    entries
}

/// Ids of `entries` that no other entry names as a parent.
pub fn tips(entries: &[CommitEntry]) -> BTreeSet<CommitId> {
    let parents: BTreeSet<CommitId> = entries
        .iter()
        .flat_map(|e| e.commit.parents.iter().copied())
        .collect();
    entries
        .iter()
        .map(|e| e.id)
        .filter(|id| !parents.contains(id))
        .collect()
}
