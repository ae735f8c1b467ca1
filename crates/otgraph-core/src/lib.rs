//! # otgraph Core
//!
//! Pure primitives for the otgraph commit graph: identities, commits, signed
//! records, and validation of untrusted commit streams.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`CommitId`] - Content identity `(level, sha256)` with newest-first ordering
//! - [`RepoId`] - Repository identity `(owner, name)`
//! - [`RawCommit`] - An immutable DAG node carrying an encrypted payload
//! - [`Signed`] / [`Verified`] - Signature envelope and its checked form
//! - [`StreamValidator`] - Online completeness check for incoming commit streams
//!
//! ## Canonicalization
//!
//! Every hashed or signed record is encoded using deterministic CBOR. See the
//! [`canonical`] module.

pub mod canonical;
pub mod commit;
pub mod crypto;
pub mod encrypted;
pub mod error;
pub mod signed;
pub mod types;
pub mod validation;

pub use commit::{CommitEntry, RawCommit, RawCommitHead, RawPullRequest, RawSnapshot};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair, Sha256Hash};
pub use encrypted::{EncryptedData, SimKeyHash};
pub use error::{CoreError, ValidationError};
pub use signed::{Signable, Signed, Verified};
pub use types::{CommitId, RepoId};
pub use validation::{verify_entry, StreamValidator};
