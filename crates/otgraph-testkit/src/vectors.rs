//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical commit encoding and the resulting ids, so
//! every implementation derives byte-identical commits.

use otgraph_core::{CommitEntry, CommitId, EncryptedData, RawCommit, SimKeyHash};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub epoch: u64,
    /// Index of the parent vector, or `None` for the root.
    pub parent: Option<usize>,
    pub nonce: [u8; 12],
    pub ciphertext: &'static [u8],
    pub sim_key_hash: [u8; 32],
    pub timestamp: i64,
    /// Expected canonical encoding (hex).
    pub expected_bytes: &'static str,
    /// Expected commit id, binary form (hex).
    pub expected_id: &'static str,
}

/// Get all golden test vectors. Parents always precede their children.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "first commit on the root",
            epoch: 0,
            parent: None,
            nonce: [0; 12],
            ciphertext: b"hello",
            sim_key_hash: [0x11; 32],
            timestamp: 1_700_000_000_000,
            expected_bytes: "a50000018148000000000000000102a2004c000000000000000000000000014568656c6c6f0358201111111111111111111111111111111111111111111111111111111111111111041b0000018bcfe56800",
            expected_id: "0000000000000002dc754b400d1c8d6d311c86991d917e6db4b89b82eb7999f85e2ba3309aa7adaa",
        },
        GoldenVector {
            name: "second commit, next epoch",
            epoch: 1,
            parent: Some(0),
            nonce: [1; 12],
            ciphertext: b"world",
            sim_key_hash: [0x11; 32],
            timestamp: 1_700_000_001_000,
            expected_bytes: "a50001018158280000000000000002dc754b400d1c8d6d311c86991d917e6db4b89b82eb7999f85e2ba3309aa7adaa02a2004c0101010101010101010101010145776f726c640358201111111111111111111111111111111111111111111111111111111111111111041b0000018bcfe56be8",
            expected_id: "0000000000000003cd06fbd27640c9a4fabd47182cc57009f16d63ee7a9eeec6c93a2841c595167c",
        },
        GoldenVector {
            name: "empty payload at time zero",
            epoch: 0,
            parent: None,
            nonce: [0; 12],
            ciphertext: b"",
            sim_key_hash: [0; 32],
            timestamp: 0,
            expected_bytes: "a50000018148000000000000000102a2004c000000000000000000000000014003582000000000000000000000000000000000000000000000000000000000000000000400",
            expected_id: "000000000000000256661ebb77d96de4a59fa8f7f58923ef4b9fb6c50724dc3b27f9f4a2ebd9a7c7",
        },
    ]
}

/// Build the commits described by `vectors`, resolving parent indices.
pub fn commits_from_vectors(vectors: &[GoldenVector]) -> Vec<CommitEntry> {
    let mut entries: Vec<CommitEntry> = Vec::with_capacity(vectors.len());
    for vector in vectors {
        let parent = match vector.parent {
            Some(i) => entries[i].id,
            None => CommitId::ROOT,
        };
        let commit = RawCommit::new(
            vector.epoch,
            [parent].into(),
            EncryptedData::new(vector.nonce, vector.ciphertext.to_vec()),
            SimKeyHash(vector.sim_key_hash),
            vector.timestamp,
        );
        entries.push(commit.into_entry().expect("vector chains are shallow"));
    }
    entries
}

/// Check every vector. Returns the names of the vectors that differ.
pub fn verify_all_vectors() -> Result<(), Vec<&'static str>> {
    let vectors = all_vectors();
    let entries = commits_from_vectors(&vectors);
    let failed: Vec<&'static str> = vectors
        .iter()
        .zip(&entries)
        .filter(|(vector, entry)| {
            hex::encode(entry.commit.canonical_bytes()) != vector.expected_bytes
                || entry.id.to_hex() != vector.expected_id
        })
        .map(|(vector, _)| vector.name)
        .collect();

    if failed.is_empty() {
        Ok(())
    } else {
        Err(failed)
    }
}
