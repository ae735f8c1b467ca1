//! # otgraph Sync
//!
//! Commit graph replication between nodes.
//!
//! ## Overview
//!
//! A repository is a DAG of commits rooted at the implicit root. Nodes
//! exchange the part of the DAG the other side lacks as a lazy stream sorted
//! highest [`CommitId`](otgraph_core::CommitId) first, so the receiver can
//! validate it online and never buffers more than the open frontier plus the
//! commits it is about to store.
//!
//! ## Key Properties
//!
//! - **All or nothing**: nothing is written until the whole stream validated
//! - **Commits before heads**: heads never name a commit that is not stored
//! - **Idempotent**: re-sent commits and older heads are no-ops
//! - **Cancellable**: every remote call races a [`CancellationToken`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use otgraph_core::{Keypair, RepoId};
//! use otgraph_store::MemoryStore;
//! use otgraph_sync::{Peer, SyncConfig, Synchronizer};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example(peer: Peer) -> otgraph_sync::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let sync = Synchronizer::new(store, SyncConfig::default());
//!     let repo = RepoId::new(Keypair::generate().public_key(), "notes");
//!
//!     let report = sync.fetch(&repo, &peer, &CancellationToken::new()).await?;
//!     println!("received {} commits", report.received);
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! fetch:
//! Local                               Peer
//!   |-------- get_heads -------------->|
//!   |<------- signed heads ------------|
//!   |-------- download(frontier) ----->|
//!   |<------- commit stream -----------|   validate, save commits, save heads
//!
//! push:
//! Local                               Peer
//!   |-------- get_heads -------------->|
//!   |<------- signed heads ------------|   fetch first if peer is ahead
//!   |-------- upload(heads, stream) -->|   peer validates, saves
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod error;
pub mod ingest;
pub mod merger;
pub mod peer;
pub mod protocol;
pub mod synchronizer;
pub mod walk;

pub use error::{Result, SyncError};
pub use ingest::{cancellable, ingest_commits, verify_heads, Ingested};
pub use merger::merge_streams;
pub use peer::{Discovery, NodeId, Peer, StaticDiscovery};
pub use protocol::{limits, CommitStream, NodeProtocol};
pub use synchronizer::{FetchReport, PushReport, SyncConfig, SyncReport, Synchronizer};
pub use walk::{collect_walk, entry_ids, walk_commits};
