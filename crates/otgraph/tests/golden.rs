//! Golden vectors for commit encoding and ids.
//!
//! Every implementation must produce byte-identical canonical commits and
//! the same ids for them.

use otgraph::core::canonical::decode_commit;
use otgraph::core::CommitId;
use otgraph_testkit::{all_vectors, commits_from_vectors, verify_all_vectors};

#[test]
fn test_golden_vectors() {
    assert_eq!(verify_all_vectors(), Ok(()));
}

#[test]
fn test_golden_ids_parse() {
    for vector in all_vectors() {
        let id = CommitId::from_hex(vector.expected_id).unwrap();
        assert!(!id.is_root(), "{}", vector.name);
        assert_eq!(id.to_hex(), vector.expected_id);
    }
}

#[test]
fn test_golden_chain_links() {
    let vectors = all_vectors();
    let entries = commits_from_vectors(&vectors);
    for (vector, entry) in vectors.iter().zip(&entries) {
        let expected_parent = match vector.parent {
            Some(i) => entries[i].id,
            None => CommitId::ROOT,
        };
        assert_eq!(entry.commit.parents.first(), Some(&expected_parent));
        assert_eq!(entry.id.level(), expected_parent.level() + 1);

        let bytes = hex::decode(vector.expected_bytes).unwrap();
        assert_eq!(decode_commit(&bytes).unwrap(), entry.commit);
    }
}
